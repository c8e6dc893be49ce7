//! Per-entity position history, dead-reckoning and maneuver detection.
//!
//! A `Trajectory` is a FIFO ring buffer of [`Sample`]s. Once full, every
//! insertion evicts the oldest sample. Heading and speed are always derived
//! from the two newest samples; anything needing motion (heading, velocity,
//! prediction, maneuvers) is `None` until two usable samples exist.

use crate::config::ConfidenceModel;
use crate::geomath::{
    haversine_km, heading_delta, initial_bearing, normalize_heading, signed_heading_offset,
    variance, Position, Velocity, SECONDS_PER_HOUR,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::num::NonZeroUsize;

// ============================================================================
// SAMPLES
// ============================================================================

/// One recorded observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub position: Position,
    /// Unix milliseconds
    pub timestamp_ms: i64,
    /// Metres
    pub altitude: f64,
    /// km/h, as reported, or derived when the report carried none
    pub speed: f64,
    /// Degrees [0, 360), as reported, or derived when the report carried none
    pub heading: f64,
}

/// Optional per-sample fields supplied alongside a position.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleMetadata {
    /// Observation time; the caller's clock is used when absent
    pub timestamp_ms: Option<i64>,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
}

impl SampleMetadata {
    pub fn at(timestamp_ms: i64) -> Self {
        Self {
            timestamp_ms: Some(timestamp_ms),
            ..Default::default()
        }
    }
}

/// Dead-reckoning forecast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub position: Position,
    pub timestamp_ms: i64,
    pub confidence: f64,
}

/// An abrupt course change ending at `sample_index`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Maneuver {
    /// Index (oldest = 0) of the sample that completes the turn
    pub sample_index: usize,
    /// Shortest-arc heading change in degrees
    pub heading_delta: f64,
    pub timestamp_ms: i64,
    pub position: Position,
    /// `heading_delta / threshold`
    pub intensity: f64,
}

// ============================================================================
// EXPORT SHAPES (GeoJSON-style)
// ============================================================================

/// A trajectory as a GeoJSON `Feature` with a `LineString` geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryFeature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: LineGeometry,
    pub properties: TrajectoryProperties,
}

/// `LineString` geometry; coordinates are `[lon, lat]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrajectoryProperties {
    pub entity_id: String,
    pub point_count: usize,
    pub length_km: f64,
    pub timestamps: Vec<i64>,
    pub altitudes: Vec<f64>,
    pub speeds: Vec<f64>,
    pub headings: Vec<f64>,
}

/// Descriptive statistics over the retained window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySummary {
    pub point_count: usize,
    pub total_length_km: f64,
    pub duration_secs: f64,
    /// Mean of non-zero reported speeds
    pub avg_speed: f64,
    pub max_speed: f64,
    /// Mean of non-zero reported altitudes
    pub avg_altitude: f64,
    pub max_altitude: f64,
    pub start_ms: i64,
    pub end_ms: i64,
}

// ============================================================================
// TRAJECTORY
// ============================================================================

/// Bounded motion history of one entity.
#[derive(Debug, Clone)]
pub struct Trajectory {
    entity_id: String,
    capacity: NonZeroUsize,
    samples: VecDeque<Sample>,
    model: ConfidenceModel,

    /// Bearing of the newest non-degenerate segment
    heading: Option<f64>,
    /// km/h over the newest segment with positive elapsed time
    speed: Option<f64>,
}

impl Trajectory {
    /// Creates an empty trajectory with the default confidence model.
    pub fn new(entity_id: impl Into<String>, capacity: NonZeroUsize) -> Self {
        Self::with_model(entity_id, capacity, ConfidenceModel::default())
    }

    pub fn with_model(
        entity_id: impl Into<String>,
        capacity: NonZeroUsize,
        model: ConfidenceModel,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            capacity,
            samples: VecDeque::with_capacity(capacity.get()),
            model,
            heading: None,
            speed: None,
        }
    }

    // ========================================================================
    // INGEST
    // ========================================================================

    /// Appends a sample, evicting the oldest one when full.
    ///
    /// Samples are kept in arrival order. A sample stamped at or before its
    /// predecessor still updates the heading but leaves the speed as it was.
    pub fn add_point(&mut self, position: Position, metadata: SampleMetadata, now_ms: i64) -> &Sample {
        let timestamp_ms = metadata.timestamp_ms.unwrap_or(now_ms);

        if let Some(prev) = self.samples.back() {
            if prev.position != position {
                self.heading = Some(initial_bearing(prev.position, position));
            }
            let dt = elapsed_secs(prev.timestamp_ms, timestamp_ms);
            if dt > 0.0 {
                self.speed = Some(haversine_km(prev.position, position) / dt * SECONDS_PER_HOUR);
            }
        }

        let sample = Sample {
            position,
            timestamp_ms,
            altitude: metadata.altitude.unwrap_or(0.0),
            speed: metadata.speed.or(self.speed).unwrap_or(0.0).max(0.0),
            heading: metadata
                .heading
                .map(normalize_heading)
                .or(self.heading)
                .unwrap_or(0.0),
        };

        if self.samples.len() == self.capacity.get() {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        &self.samples[self.samples.len() - 1]
    }

    /// Drops every sample and the derived kinematics.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.heading = None;
        self.speed = None;
    }

    // ========================================================================
    // KINEMATICS
    // ========================================================================

    /// Course over ground in degrees [0, 360). `None` below two samples.
    pub fn heading(&self) -> Option<f64> {
        self.last_two()?;
        self.heading
    }

    /// Ground speed in km/h. `None` below two samples.
    pub fn speed(&self) -> Option<f64> {
        self.last_two()?;
        self.speed
    }

    /// Degrees-per-second vector implied by the two newest samples.
    pub fn velocity(&self) -> Option<Velocity> {
        let (prev, last) = self.last_two()?;
        Velocity::between(
            prev.position,
            last.position,
            elapsed_secs(prev.timestamp_ms, last.timestamp_ms),
        )
    }

    /// Linear dead-reckoning `horizon_secs` past the newest sample.
    ///
    /// `None` with fewer than two samples, when the two newest samples share
    /// a timestamp, for a negative / non-finite horizon, or when the
    /// forecast time does not fit in Unix milliseconds.
    pub fn predict(&self, horizon_secs: f64) -> Option<Prediction> {
        if !horizon_secs.is_finite() || horizon_secs < 0.0 {
            return None;
        }
        let velocity = self.velocity()?;
        let last = self.newest()?;
        let timestamp_ms = last.timestamp_ms.checked_add((horizon_secs * 1000.0).round() as i64)?;

        Some(Prediction {
            position: last.position.advanced(velocity, horizon_secs),
            timestamp_ms,
            confidence: self.confidence(),
        })
    }

    /// Prediction confidence in [0, 1].
    ///
    /// Penalises variance of segment speed (km/s) and segment heading over the
    /// retained window. Headings are unwrapped around the first segment's
    /// heading so that steady flight across north does not read as erratic.
    pub fn confidence(&self) -> f64 {
        if self.samples.len() < 3 {
            return self.model.sparse;
        }

        let mut speeds = Vec::with_capacity(self.samples.len());
        let mut headings = Vec::with_capacity(self.samples.len());
        for (prev, cur) in self.segments() {
            let dt = elapsed_secs(prev.timestamp_ms, cur.timestamp_ms);
            if dt > 0.0 {
                speeds.push(haversine_km(prev.position, cur.position) / dt);
            }
            if prev.position != cur.position {
                headings.push(initial_bearing(prev.position, cur.position));
            }
        }

        let unwrapped: Vec<f64> = match headings.first() {
            Some(&reference) => headings
                .iter()
                .map(|&h| signed_heading_offset(reference, h))
                .collect(),
            None => Vec::new(),
        };

        let raw = 1.0
            - variance(&speeds) * self.model.speed_variance_weight
            - variance(&unwrapped) * self.model.heading_variance_weight;
        raw.max(self.model.floor).min(1.0)
    }

    /// Consecutive heading changes of at least `threshold_deg`.
    ///
    /// Ties flag: a change of exactly `threshold_deg` is a maneuver.
    /// Zero-length segments have no bearing and are skipped.
    pub fn detect_maneuvers(&self, threshold_deg: f64) -> Vec<Maneuver> {
        let bearings: Vec<(usize, f64)> = self
            .segments()
            .enumerate()
            .filter(|(_, (prev, cur))| prev.position != cur.position)
            .map(|(i, (prev, cur))| (i + 1, initial_bearing(prev.position, cur.position)))
            .collect();

        bearings
            .windows(2)
            .filter_map(|pair| {
                let (_, before) = pair[0];
                let (index, after) = pair[1];
                let delta = heading_delta(before, after);
                if delta >= threshold_deg {
                    let sample = &self.samples[index];
                    Some(Maneuver {
                        sample_index: index,
                        heading_delta: delta,
                        timestamp_ms: sample.timestamp_ms,
                        position: sample.position,
                        intensity: delta / threshold_deg.max(f64::EPSILON),
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    /// Cumulative great-circle length of the retained window, in km.
    pub fn length(&self) -> f64 {
        self.segments()
            .map(|(prev, cur)| haversine_km(prev.position, cur.position))
            .sum()
    }

    /// Mean segment ground speed in km/h, ignoring zero-duration segments.
    pub fn average_speed(&self) -> Option<f64> {
        let speeds: Vec<f64> = self
            .segments()
            .filter_map(|(prev, cur)| {
                let dt = elapsed_secs(prev.timestamp_ms, cur.timestamp_ms);
                (dt > 0.0).then(|| haversine_km(prev.position, cur.position) / dt * SECONDS_PER_HOUR)
            })
            .collect();
        if speeds.is_empty() {
            None
        } else {
            Some(speeds.iter().sum::<f64>() / speeds.len() as f64)
        }
    }

    /// Copy of the samples with each interior position pulled towards the
    /// midpoint of its neighbours. `strength` is clamped to [0, 1].
    pub fn smoothed(&self, strength: f64) -> Vec<Sample> {
        let mut out: Vec<Sample> = self.samples.iter().copied().collect();
        if out.len() < 3 {
            return out;
        }
        let s = strength.clamp(0.0, 1.0);
        for i in 1..out.len() - 1 {
            let (prev, cur, next) = (self.samples[i - 1], self.samples[i], self.samples[i + 1]);
            out[i].position = Position::new(
                cur.position.lat * (1.0 - s) + (prev.position.lat + next.position.lat) * s / 2.0,
                cur.position.lon * (1.0 - s) + (prev.position.lon + next.position.lon) * s / 2.0,
            );
        }
        out
    }

    // ========================================================================
    // EXPORT
    // ========================================================================

    /// GeoJSON-style line feature of the retained window.
    pub fn export(&self) -> TrajectoryFeature {
        TrajectoryFeature {
            kind: "Feature".to_string(),
            geometry: LineGeometry {
                kind: "LineString".to_string(),
                coordinates: self.samples.iter().map(|s| s.position.to_lon_lat()).collect(),
            },
            properties: TrajectoryProperties {
                entity_id: self.entity_id.clone(),
                point_count: self.samples.len(),
                length_km: self.length(),
                timestamps: self.samples.iter().map(|s| s.timestamp_ms).collect(),
                altitudes: self.samples.iter().map(|s| s.altitude).collect(),
                speeds: self.samples.iter().map(|s| s.speed).collect(),
                headings: self.samples.iter().map(|s| s.heading).collect(),
            },
        }
    }

    /// Statistics over the retained window; `None` when empty.
    pub fn summary(&self) -> Option<TrajectorySummary> {
        let first = self.samples.front()?;
        let last = self.samples.back()?;

        let (avg_speed, max_speed) = mean_and_max(self.samples.iter().map(|s| s.speed));
        let (avg_altitude, max_altitude) = mean_and_max(self.samples.iter().map(|s| s.altitude));

        Some(TrajectorySummary {
            point_count: self.samples.len(),
            total_length_km: self.length(),
            duration_secs: elapsed_secs(first.timestamp_ms, last.timestamp_ms).max(0.0),
            avg_speed,
            max_speed,
            avg_altitude,
            max_altitude,
            start_ms: first.timestamp_ms,
            end_ms: last.timestamp_ms,
        })
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn newest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn oldest(&self) -> Option<&Sample> {
        self.samples.front()
    }

    fn last_two(&self) -> Option<(&Sample, &Sample)> {
        let n = self.samples.len();
        if n < 2 {
            return None;
        }
        Some((&self.samples[n - 2], &self.samples[n - 1]))
    }

    fn segments(&self) -> impl Iterator<Item = (&Sample, &Sample)> {
        self.samples.iter().zip(self.samples.iter().skip(1))
    }
}

fn elapsed_secs(from_ms: i64, to_ms: i64) -> f64 {
    to_ms.saturating_sub(from_ms) as f64 / 1000.0
}

/// Mean and max of the strictly positive values (zeros mean "not reported").
fn mean_and_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let positive: Vec<f64> = values.filter(|v| *v > 0.0).collect();
    if positive.is_empty() {
        return (0.0, 0.0);
    }
    let mean = positive.iter().sum::<f64>() / positive.len() as f64;
    let max = positive.iter().copied().fold(f64::MIN, f64::max);
    (mean, max)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const T0: i64 = 1_704_067_200_000;

    fn capacity(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    /// Trajectory with one sample per second at the given positions.
    fn track(points: &[(f64, f64)]) -> Trajectory {
        let mut t = Trajectory::new("t1", capacity(50));
        for (i, &(lat, lon)) in points.iter().enumerate() {
            let ts = T0 + i as i64 * 1_000;
            t.add_point(Position::new(lat, lon), SampleMetadata::at(ts), ts);
        }
        t
    }

    #[test]
    fn test_bounded_history_keeps_most_recent() {
        let n = 10;
        let mut t = Trajectory::new("t1", capacity(n));
        for i in 0..n + 5 {
            let ts = T0 + i as i64 * 1_000;
            t.add_point(Position::new(49.0 + i as f64 * 0.01, 31.5), SampleMetadata::at(ts), ts);
        }

        assert_eq!(t.len(), n);
        let stamps: Vec<i64> = t.samples().map(|s| s.timestamp_ms).collect();
        let expected: Vec<i64> = (5..n + 5).map(|i| T0 + i as i64 * 1_000).collect();
        assert_eq!(stamps, expected);
    }

    #[test]
    fn test_single_sample_has_no_motion() {
        let t = track(&[(49.0, 31.5)]);
        assert!(t.heading().is_none());
        assert!(t.speed().is_none());
        assert!(t.velocity().is_none());
        assert!(t.predict(60.0).is_none());
        assert!(t.detect_maneuvers(30.0).is_empty());
        assert_eq!(t.length(), 0.0);
    }

    #[test]
    fn test_due_north_kinematics_and_prediction() {
        let t = track(&[(49.0, 31.5), (49.1, 31.5)]);

        let speed = t.speed().unwrap();
        assert!(speed > 0.0);
        // 0.1° of latitude in one second, in km/h
        assert_abs_diff_eq!(speed, t.length() * 3600.0, epsilon = 1e-6);
        assert_abs_diff_eq!(t.heading().unwrap(), 0.0, epsilon = 1e-9);

        let p = t.predict(60.0).unwrap();
        assert!(p.position.lat > 49.1);
        assert_abs_diff_eq!(p.position.lon, 31.5, epsilon = 1e-9);
        assert_eq!(p.timestamp_ms, T0 + 1_000 + 60_000);
        assert_eq!(p.confidence, 0.3);
    }

    #[test]
    fn test_prediction_unavailable_for_zero_elapsed_time() {
        let mut t = Trajectory::new("t1", capacity(5));
        t.add_point(Position::new(49.0, 31.5), SampleMetadata::at(T0), T0);
        t.add_point(Position::new(49.1, 31.5), SampleMetadata::at(T0), T0);

        assert!(t.predict(60.0).is_none());
        // Heading is still known from geometry alone
        assert!(t.heading().is_some());
        assert!(t.speed().is_none());
    }

    #[test]
    fn test_prediction_rejects_bad_horizon() {
        let t = track(&[(49.0, 31.5), (49.1, 31.5)]);
        assert!(t.predict(-1.0).is_none());
        assert!(t.predict(f64::NAN).is_none());
        assert!(t.predict(0.0).is_some());
    }

    #[test]
    fn test_prediction_past_representable_time_is_none() {
        let t = track(&[(49.0, 31.5), (49.1, 31.5)]);
        assert!(t.predict(1e17).is_none());
        assert!(t.predict(f64::MAX).is_none());
    }

    #[test]
    fn test_single_retained_sample_has_no_kinematics() {
        let mut t = Trajectory::new("t1", capacity(1));
        t.add_point(Position::new(49.0, 31.5), SampleMetadata::at(T0), T0);
        t.add_point(Position::new(49.1, 31.5), SampleMetadata::at(T0 + 1_000), T0 + 1_000);

        assert_eq!(t.len(), 1);
        assert!(t.heading().is_none());
        assert!(t.speed().is_none());
        assert!(t.velocity().is_none());
        assert!(t.predict(60.0).is_none());
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let mut t = Trajectory::new("t1", capacity(5));
        t.add_point(Position::new(49.0, 31.5), SampleMetadata::at(i64::MIN), T0);
        t.add_point(Position::new(49.1, 31.5), SampleMetadata::at(i64::MAX), T0);
        assert!(t.speed().is_some());
        assert!(t.predict(60.0).is_none());
    }

    #[test]
    fn test_out_of_order_sample_keeps_previous_speed() {
        let mut t = track(&[(49.0, 31.5), (49.1, 31.5)]);
        let before = t.speed();
        t.add_point(Position::new(49.2, 31.5), SampleMetadata::at(T0), T0 + 5_000);
        assert_eq!(t.speed(), before);
    }

    #[test]
    fn test_missing_metadata_falls_back_to_clock_and_derived_values() {
        let mut t = Trajectory::new("t1", capacity(5));
        t.add_point(Position::new(49.0, 31.5), SampleMetadata::default(), T0);
        let sample = *t.add_point(Position::new(49.0, 31.6), SampleMetadata::default(), T0 + 2_000);

        assert_eq!(sample.timestamp_ms, T0 + 2_000);
        assert_eq!(sample.altitude, 0.0);
        assert!(sample.speed > 0.0);
        assert!((89.0..91.0).contains(&sample.heading));
    }

    #[test]
    fn test_confidence_straight_line_is_high() {
        let t = track(&[(49.0, 31.5), (49.01, 31.5), (49.02, 31.5), (49.03, 31.5), (49.04, 31.5)]);
        assert!(t.confidence() > 0.99, "confidence {}", t.confidence());
    }

    #[test]
    fn test_confidence_zigzag_is_lower() {
        let straight = track(&[(49.0, 31.5), (49.01, 31.5), (49.02, 31.5), (49.03, 31.5)]);
        let zigzag = track(&[(49.0, 31.5), (49.01, 31.51), (49.02, 31.5), (49.03, 31.51)]);
        assert!(zigzag.confidence() < straight.confidence());
        assert!(zigzag.confidence() >= 0.1);
    }

    #[test]
    fn test_confidence_steady_across_north_is_not_erratic() {
        // Weaving 2° either side of north
        let t = track(&[(49.0, 31.5), (49.01, 31.5004), (49.02, 31.5), (49.03, 31.5004)]);
        assert!(t.confidence() > 0.9, "confidence {}", t.confidence());
    }

    #[test]
    fn test_detect_right_angle_turn() {
        // North, north, then east
        let t = track(&[(49.0, 31.5), (49.01, 31.5), (49.02, 31.5), (49.02, 31.52)]);
        let maneuvers = t.detect_maneuvers(30.0);

        assert_eq!(maneuvers.len(), 1);
        assert_eq!(maneuvers[0].sample_index, 3);
        assert!((85.0..95.0).contains(&maneuvers[0].heading_delta));
        assert!(maneuvers[0].intensity > 2.5);
        assert_eq!(maneuvers[0].timestamp_ms, T0 + 3_000);
    }

    #[test]
    fn test_maneuver_threshold_tie_flags() {
        let t = track(&[(49.0, 31.5), (49.01, 31.5), (49.02, 31.51)]);
        let all = t.detect_maneuvers(0.0);
        assert_eq!(all.len(), 1);
        let delta = all[0].heading_delta;

        assert_eq!(t.detect_maneuvers(delta).len(), 1, "delta == threshold must flag");
        assert!(t.detect_maneuvers(delta + 1e-9).is_empty());
    }

    #[test]
    fn test_maneuver_skips_stationary_segments() {
        // Hovering in place between two northbound legs is not a turn
        let t = track(&[(49.0, 31.5), (49.01, 31.5), (49.01, 31.5), (49.02, 31.5)]);
        assert!(t.detect_maneuvers(1.0).is_empty());
    }

    #[test]
    fn test_length_is_bounded_by_window() {
        let mut t = Trajectory::new("t1", capacity(3));
        for i in 0..10 {
            let ts = T0 + i * 1_000;
            t.add_point(Position::new(49.0 + i as f64 * 0.1, 31.5), SampleMetadata::at(ts), ts);
        }
        let two_steps = crate::geomath::haversine_km(Position::new(49.7, 31.5), Position::new(49.9, 31.5));
        assert_abs_diff_eq!(t.length(), two_steps, epsilon = 1e-6);
    }

    #[test]
    fn test_export_uses_lon_lat_order() {
        let t = track(&[(49.0, 31.5), (49.1, 31.6)]);
        let feature = t.export();

        assert_eq!(feature.kind, "Feature");
        assert_eq!(feature.geometry.kind, "LineString");
        assert_eq!(feature.geometry.coordinates, vec![[31.5, 49.0], [31.6, 49.1]]);
        assert_eq!(feature.properties.entity_id, "t1");
        assert_eq!(feature.properties.point_count, 2);
        assert_eq!(feature.properties.timestamps, vec![T0, T0 + 1_000]);

        let json = serde_json::to_value(&feature).unwrap();
        assert_eq!(json["type"], "Feature");
        assert_eq!(json["properties"]["pointCount"], 2);
    }

    #[test]
    fn test_summary_ignores_unreported_values() {
        let mut t = Trajectory::new("t1", capacity(10));
        let meta = |ts: i64, alt: f64, speed: f64| SampleMetadata {
            timestamp_ms: Some(ts),
            altitude: Some(alt),
            speed: Some(speed),
            heading: None,
        };
        t.add_point(Position::new(49.0, 31.5), meta(T0, 0.0, 0.0), T0);
        t.add_point(Position::new(49.1, 31.5), meta(T0 + 10_000, 800.0, 180.0), T0);
        t.add_point(Position::new(49.2, 31.5), meta(T0 + 20_000, 1_200.0, 220.0), T0);

        let s = t.summary().unwrap();
        assert_eq!(s.point_count, 3);
        assert_abs_diff_eq!(s.duration_secs, 20.0);
        assert_abs_diff_eq!(s.avg_speed, 200.0);
        assert_abs_diff_eq!(s.max_speed, 220.0);
        assert_abs_diff_eq!(s.avg_altitude, 1_000.0);
        assert_abs_diff_eq!(s.max_altitude, 1_200.0);

        assert!(Trajectory::new("empty", capacity(1)).summary().is_none());
    }

    #[test]
    fn test_smoothing_pulls_interior_points() {
        let t = track(&[(49.0, 31.5), (49.1, 31.7), (49.2, 31.5)]);
        let smoothed = t.smoothed(1.0);
        assert_abs_diff_eq!(smoothed[1].position.lon, 31.5, epsilon = 1e-12);
        assert_eq!(smoothed[0].position, Position::new(49.0, 31.5));

        let untouched = t.smoothed(0.0);
        assert_eq!(untouched[1].position, Position::new(49.1, 31.7));
    }

    #[test]
    fn test_average_speed() {
        let t = track(&[(49.0, 31.5), (49.1, 31.5), (49.2, 31.5)]);
        let avg = t.average_speed().unwrap();
        assert_abs_diff_eq!(avg, t.length() / 2.0 * 3600.0, epsilon = 1e-6);
        assert!(track(&[(49.0, 31.5)]).average_speed().is_none());
    }

    #[test]
    fn test_clear_resets_kinematics() {
        let mut t = track(&[(49.0, 31.5), (49.1, 31.5)]);
        t.clear();
        assert!(t.is_empty());
        assert!(t.heading().is_none());
        assert!(t.speed().is_none());
    }
}
