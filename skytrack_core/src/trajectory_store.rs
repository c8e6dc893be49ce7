//! TrajectoryStore - owns every `Trajectory`, keyed by entity id.

use crate::config::{ConfidenceModel, TrackingConfig};
use crate::geomath::Position;
use crate::trajectory::{SampleMetadata, Trajectory, TrajectoryFeature};
use crate::TrackingError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::Duration;
use tracing::{debug, info};

/// Aggregate figures over all stored trajectories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatistics {
    pub count: usize,
    pub total_points: usize,
    pub total_length_km: f64,
    /// Trajectories with at least one sample
    pub non_empty: usize,
}

/// Every trajectory as one GeoJSON-style `FeatureCollection`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<TrajectoryFeature>,
    pub properties: CollectionProperties,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionProperties {
    pub export_time_ms: i64,
    pub trajectory_count: usize,
    pub total_points: usize,
}

/// Trajectory owner with lazy creation and staleness cleanup.
///
/// Iteration follows creation order.
#[derive(Debug, Clone)]
pub struct TrajectoryStore {
    trajectories: IndexMap<String, Trajectory>,
    capacity: NonZeroUsize,
    model: ConfidenceModel,
}

impl TrajectoryStore {
    /// Fails on an invalid configuration (zero capacity, bad weights).
    pub fn new(config: &TrackingConfig) -> Result<Self, TrackingError> {
        config.validate()?;
        Ok(Self {
            trajectories: IndexMap::new(),
            capacity: config.capacity()?,
            model: config.confidence_model(),
        })
    }

    /// Appends a sample to `id`'s trajectory, creating it on first use.
    pub fn record(
        &mut self,
        id: &str,
        position: Position,
        metadata: SampleMetadata,
        now_ms: i64,
    ) -> &Trajectory {
        let (capacity, model) = (self.capacity, self.model);
        let trajectory = self.trajectories.entry(id.to_string()).or_insert_with(|| {
            debug!(entity = %id, "trajectory created");
            Trajectory::with_model(id, capacity, model)
        });
        trajectory.add_point(position, metadata, now_ms);
        trajectory
    }

    pub fn get(&self, id: &str) -> Option<&Trajectory> {
        self.trajectories.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.trajectories.contains_key(id)
    }

    /// Returns whether a trajectory existed.
    pub fn remove(&mut self, id: &str) -> bool {
        self.trajectories.shift_remove(id).is_some()
    }

    pub fn clear(&mut self) {
        self.trajectories.clear();
    }

    /// Removes trajectories whose newest sample is strictly older than
    /// `max_age`, plus every empty trajectory. Returns the removed ids.
    pub fn sweep_stale(&mut self, max_age: Duration, now_ms: i64) -> Vec<String> {
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let mut swept = Vec::new();

        self.trajectories.retain(|id, trajectory| {
            let keep = match trajectory.newest() {
                Some(sample) => now_ms.saturating_sub(sample.timestamp_ms) <= max_age_ms,
                None => false,
            };
            if !keep {
                swept.push(id.clone());
            }
            keep
        });

        if !swept.is_empty() {
            info!(swept = swept.len(), remaining = self.trajectories.len(), "stale trajectories swept");
        }
        swept
    }

    pub fn statistics(&self) -> StoreStatistics {
        self.trajectories.values().fold(
            StoreStatistics {
                count: self.trajectories.len(),
                ..Default::default()
            },
            |mut stats, trajectory| {
                stats.total_points += trajectory.len();
                stats.total_length_km += trajectory.length();
                if !trajectory.is_empty() {
                    stats.non_empty += 1;
                }
                stats
            },
        )
    }

    pub fn export_all(&self, now_ms: i64) -> FeatureCollection {
        let features: Vec<TrajectoryFeature> = self.trajectories.values().map(Trajectory::export).collect();
        FeatureCollection {
            kind: "FeatureCollection".to_string(),
            properties: CollectionProperties {
                export_time_ms: now_ms,
                trajectory_count: features.len(),
                total_points: features.iter().map(|f| f.properties.point_count).sum(),
            },
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Trajectory)> {
        self.trajectories.iter().map(|(id, t)| (id.as_str(), t))
    }
}
