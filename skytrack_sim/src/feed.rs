//! Simulated snapshot producer.
//!
//! The feed keeps the ground truth of every simulated target, moves it with
//! a constant-speed great-circle model, and publishes noisy snapshots of
//! everything still in the air. All randomness comes from one seeded
//! `ChaCha8Rng`, so the same seed always yields the same snapshot sequence.

use crate::config::SimConfig;
use crate::scenarios::Scenario;
use crate::SimError;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde_json::Value;
use skytrack_core::geomath::{destination, haversine_km, normalize_heading, SECONDS_PER_HOUR};
use skytrack_core::{Position, SnapshotRecord};
use tracing::debug;

/// Nominal performance of one kind of threat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThreatProfile {
    /// Label as a producer would send it
    pub label: &'static str,
    pub speed_kmh: f64,
    pub altitude_m: f64,
    pub icon: &'static str,
}

pub const SHAHED: ThreatProfile = ThreatProfile {
    label: "Shahed-136",
    speed_kmh: 180.0,
    altitude_m: 800.0,
    icon: "drone",
};
pub const CRUISE_MISSILE: ThreatProfile = ThreatProfile {
    label: "cruise_missile",
    speed_kmh: 900.0,
    altitude_m: 1_500.0,
    icon: "missile",
};
pub const RECON_UAV: ThreatProfile = ThreatProfile {
    label: "uav",
    speed_kmh: 90.0,
    altitude_m: 500.0,
    icon: "uav",
};
pub const TACTICAL_MISSILE: ThreatProfile = ThreatProfile {
    label: "tactical_missile",
    speed_kmh: 1_200.0,
    altitude_m: 3_000.0,
    icon: "ballistic",
};
pub const REGION_ALERT: ThreatProfile = ThreatProfile {
    label: "air_alert",
    speed_kmh: 0.0,
    altitude_m: 0.0,
    icon: "alert",
};

/// Oblast centres used for region names and region-level alerts.
pub const REGIONS: &[(&str, f64, f64)] = &[
    ("Vinnytsia Oblast", 49.23, 28.48),
    ("Volyn Oblast", 50.75, 25.34),
    ("Dnipropetrovsk Oblast", 48.45, 35.05),
    ("Donetsk Oblast", 48.02, 37.80),
    ("Zhytomyr Oblast", 50.25, 28.66),
    ("Ivano-Frankivsk Oblast", 48.92, 24.71),
    ("Kyiv Oblast", 50.45, 30.52),
    ("Kirovohrad Oblast", 48.51, 32.26),
    ("Luhansk Oblast", 48.57, 39.30),
    ("Lviv Oblast", 49.84, 24.03),
    ("Poltava Oblast", 49.59, 34.55),
    ("Rivne Oblast", 50.62, 26.25),
    ("Sumy Oblast", 50.91, 34.80),
    ("Ternopil Oblast", 49.55, 25.59),
    ("Kharkiv Oblast", 49.99, 36.23),
    ("Khmelnytskyi Oblast", 49.42, 26.99),
    ("Cherkasy Oblast", 49.44, 32.06),
    ("Chernivtsi Oblast", 48.29, 25.94),
    ("Chernihiv Oblast", 51.50, 31.30),
];

/// Oblast whose centre is nearest to `position`.
pub fn nearest_region(position: Position) -> &'static str {
    REGIONS
        .iter()
        .map(|&(name, lat, lon)| (name, haversine_km(position, Position::new(lat, lon))))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(name, _)| name)
        .unwrap_or("unspecified")
}

fn profiles_for(scenario: Scenario) -> &'static [ThreatProfile] {
    match scenario {
        Scenario::Mixed => &[SHAHED, CRUISE_MISSILE, RECON_UAV, TACTICAL_MISSILE],
        Scenario::DroneSwarm => &[SHAHED, RECON_UAV],
        Scenario::MissileSalvo => &[CRUISE_MISSILE, TACTICAL_MISSILE],
        Scenario::RegionAlerts => &[REGION_ALERT],
    }
}

// ============================================================================
// GROUND TRUTH
// ============================================================================

/// A ground truth target in the simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct SimTarget {
    pub id: String,
    pub profile: ThreatProfile,
    pub position: Position,
    /// Degrees, 0 = north
    pub heading: f64,
    pub speed_kmh: f64,
    pub altitude_m: f64,
    pub region: &'static str,
    pub confidence: f64,
    /// Reported destroyed in the next snapshot, then dropped from the feed
    pub destroyed: bool,
}

/// Feed counters, cumulative since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub spawned: u64,
    pub despawned: u64,
    pub destroyed: u64,
    pub left_area: u64,
    pub malformed: u64,
}

/// The simulated producer.
pub struct SnapshotFeed {
    seed: u64,
    rng: ChaCha8Rng,
    config: SimConfig,
    noise: Normal<f64>,
    targets: Vec<SimTarget>,
    next_id: u64,
    time_secs: f64,
    stats: FeedStats,
}

impl SnapshotFeed {
    pub fn new(config: &SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        let noise = Normal::new(0.0, config.position_noise_deg)
            .map_err(|e| SimError::InvalidConfig(format!("position noise: {e}")))?;
        Ok(Self {
            seed: config.seed,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config: config.clone(),
            noise,
            targets: Vec::new(),
            next_id: 0,
            time_secs: 0.0,
            stats: FeedStats::default(),
        })
    }

    /// Spawns one target of a profile allowed by the scenario.
    pub fn spawn_target(&mut self) -> &SimTarget {
        let profiles = profiles_for(self.config.scenario);
        let profile = *profiles.choose(&mut self.rng).unwrap_or(&SHAHED);

        let (position, region) = if self.config.scenario.is_kinematic() {
            let position = self.config.bounds.sample(&mut self.rng);
            (position, nearest_region(position))
        } else {
            let &(name, lat, lon) = REGIONS.choose(&mut self.rng).unwrap_or(&REGIONS[0]);
            (Position::new(lat, lon), name)
        };

        let target = SimTarget {
            id: format!("sim_{}", self.next_id),
            profile,
            position,
            heading: self.rng.gen_range(0.0..360.0),
            speed_kmh: (profile.speed_kmh + self.rng.gen_range(-25.0..=25.0)).max(0.0),
            altitude_m: (profile.altitude_m + self.rng.gen_range(-100.0..=100.0)).max(0.0),
            region,
            confidence: self.rng.gen_range(0.7..=1.0),
            destroyed: false,
        };
        self.next_id += 1;
        self.stats.spawned += 1;

        debug!(target = %target.id, kind = target.profile.label, region = target.region, "target spawned");
        self.targets.push(target);
        &self.targets[self.targets.len() - 1]
    }

    /// Advances ground truth by `dt_secs`.
    pub fn step(&mut self, dt_secs: f64) {
        if !dt_secs.is_finite() || dt_secs <= 0.0 {
            return;
        }
        self.time_secs += dt_secs;
        if !self.config.scenario.is_kinematic() {
            return;
        }

        for target in self.targets.iter_mut().filter(|t| !t.destroyed) {
            if self.rng.gen_bool(self.config.turn_probability) {
                target.heading = normalize_heading(target.heading + self.rng.gen_range(-90.0..=90.0));
            }
            let distance_km = target.speed_kmh * dt_secs / SECONDS_PER_HOUR;
            target.position = destination(target.position, target.heading, distance_km);
        }

        let bounds = self.config.bounds;
        let before = self.targets.len();
        self.targets.retain(|t| bounds.contains(t.position));
        self.stats.left_area += (before - self.targets.len()) as u64;
    }

    /// Produces the next full snapshot at `now_ms`.
    ///
    /// Spawning, despawning and destruction are decided here so that their
    /// rate does not depend on the step size.
    pub fn next_snapshot(&mut self, now_ms: i64) -> Vec<SnapshotRecord> {
        // Destroyed targets were reported once already
        self.targets.retain(|t| !t.destroyed);

        let despawn = self.config.despawn_probability;
        let before = self.targets.len();
        let rng = &mut self.rng;
        self.targets.retain(|_| !rng.gen_bool(despawn));
        self.stats.despawned += (before - self.targets.len()) as u64;

        if self.targets.len() < self.config.max_targets && self.rng.gen_bool(self.config.spawn_probability) {
            self.spawn_target();
        }

        for target in self.targets.iter_mut() {
            if self.rng.gen_bool(self.config.destroy_probability) {
                target.destroyed = true;
                self.stats.destroyed += 1;
            }
        }

        let mut records = Vec::with_capacity(self.targets.len() + 1);
        for index in 0..self.targets.len() {
            let target = self.targets[index].clone();
            records.push(self.record_for(&target, now_ms));
        }

        if self.rng.gen_bool(self.config.malformed_probability) {
            self.stats.malformed += 1;
            records.push(SnapshotRecord {
                id: Some(format!("corrupt_{}", self.stats.malformed)),
                // Latitude out of range, rejected at the registry boundary
                position: Some(Position::new(120.0, self.config.bounds.min_lon)),
                ..Default::default()
            });
        }
        records
    }

    fn record_for(&mut self, target: &SimTarget, now_ms: i64) -> SnapshotRecord {
        let noisy = if self.config.scenario.is_kinematic() {
            Position::new(
                target.position.lat + self.noise.sample(&mut self.rng),
                target.position.lon + self.noise.sample(&mut self.rng),
            )
            .normalized()
        } else {
            target.position
        };

        let mut record = SnapshotRecord::new(target.id.clone(), noisy)
            .with_classification(target.profile.label)
            .with_status(if target.destroyed { "destroyed" } else { "active" })
            .with_timestamp(now_ms);
        record.altitude = Some(target.altitude_m);
        record.region = Some(target.region.to_string());
        record.confidence = Some(target.confidence);
        if self.config.scenario.is_kinematic() {
            record.speed = Some(target.speed_kmh);
        }
        record.extra.insert("icon".into(), Value::from(target.profile.icon));
        record
            .extra
            .insert("name".into(), Value::from(format!("{} over {}", target.profile.label, target.region)));
        record.extra.insert("isSimulated".into(), Value::Bool(true));
        record
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Seconds of simulated flight so far.
    pub fn time(&self) -> f64 {
        self.time_secs
    }

    pub fn targets(&self) -> &[SimTarget] {
        &self.targets
    }

    pub fn stats(&self) -> FeedStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skytrack_core::EntityUpdate;

    fn feed(scenario: Scenario) -> SnapshotFeed {
        let config = SimConfig {
            scenario,
            malformed_probability: 0.0,
            despawn_probability: 0.0,
            destroy_probability: 0.0,
            ..Default::default()
        };
        SnapshotFeed::new(&config).unwrap()
    }

    #[test]
    fn test_same_seed_same_snapshots() {
        let mut a = SnapshotFeed::new(&SimConfig::default()).unwrap();
        let mut b = SnapshotFeed::new(&SimConfig::default()).unwrap();
        for i in 0..20 {
            a.step(5.0);
            b.step(5.0);
            let now = 1_704_067_200_000 + i * 5_000;
            assert_eq!(a.next_snapshot(now), b.next_snapshot(now));
        }
    }

    #[test]
    fn test_target_moves_at_profile_speed() {
        let mut f = feed(Scenario::MissileSalvo);
        let target = f.spawn_target().clone();
        f.config.turn_probability = 0.0;
        f.step(10.0);

        if let Some(moved) = f.targets().iter().find(|t| t.id == target.id) {
            let expected = target.speed_kmh * 10.0 / SECONDS_PER_HOUR;
            assert!((haversine_km(target.position, moved.position) - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_records_are_well_formed() {
        let mut f = feed(Scenario::Mixed);
        for _ in 0..5 {
            f.spawn_target();
        }
        let records = f.next_snapshot(0);
        assert!(records.len() >= 5);
        for record in records {
            assert!(record.extra.contains_key("icon"));
            assert!(EntityUpdate::try_from(record).is_ok());
        }
    }

    #[test]
    fn test_region_alerts_are_stationary() {
        let mut f = feed(Scenario::RegionAlerts);
        let alert = f.spawn_target().clone();
        f.step(60.0);
        assert_eq!(f.targets()[0].position, alert.position);
        assert_eq!(alert.speed_kmh, 0.0);
    }

    #[test]
    fn test_destroyed_target_reported_once() {
        let config = SimConfig {
            destroy_probability: 1.0,
            spawn_probability: 0.0,
            malformed_probability: 0.0,
            despawn_probability: 0.0,
            ..Default::default()
        };
        let mut f = SnapshotFeed::new(&config).unwrap();
        f.spawn_target();

        let first = f.next_snapshot(0);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].status.as_deref(), Some("destroyed"));
        assert!(f.next_snapshot(5_000).is_empty());
        assert_eq!(f.stats().destroyed, 1);
    }

    #[test]
    fn test_nearest_region() {
        assert_eq!(nearest_region(Position::new(50.4, 30.6)), "Kyiv Oblast");
        assert_eq!(nearest_region(Position::new(49.8, 24.1)), "Lviv Oblast");
    }
}
