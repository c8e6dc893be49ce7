//! Tracking configuration.

use crate::TrackingError;
use h3o::Resolution;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::Duration;

/// Configuration for the EntityRegistry and its TrajectoryStore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Samples retained per trajectory (default: 50)
    pub trajectory_capacity: usize,

    /// H3 resolution for the spatial index (default: 5, ~9km edge)
    pub h3_resolution: u8,

    /// Age after which a trajectory is swept (default: 300s)
    pub stale_after_secs: u64,

    /// Heading change that counts as a maneuver (default: 30°)
    pub maneuver_threshold_deg: f64,

    /// Confidence assigned to new entities that do not report one (default: 0.8)
    pub default_confidence: f64,

    /// Prediction confidence with fewer than 3 samples (default: 0.3)
    pub sparse_confidence: f64,

    /// Floor for computed prediction confidence (default: 0.1)
    pub min_confidence: f64,

    /// Penalty per unit of speed variance, speeds in km/s (default: 0.5)
    pub speed_variance_weight: f64,

    /// Penalty per unit of heading variance, degrees² (default: 0.01)
    pub heading_variance_weight: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            trajectory_capacity: 50,
            h3_resolution: 5,
            stale_after_secs: 300,
            maneuver_threshold_deg: 30.0,
            default_confidence: 0.8,
            sparse_confidence: 0.3,
            min_confidence: 0.1,
            speed_variance_weight: 0.5,
            heading_variance_weight: 0.01,
        }
    }
}

impl TrackingConfig {
    /// Checks every field, failing fast on programmer errors.
    pub fn validate(&self) -> Result<(), TrackingError> {
        self.capacity()?;
        self.resolution()?;

        let unit = |name: &str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(TrackingError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )))
            }
        };
        unit("default_confidence", self.default_confidence)?;
        unit("sparse_confidence", self.sparse_confidence)?;
        unit("min_confidence", self.min_confidence)?;

        for (name, value) in [
            ("maneuver_threshold_deg", self.maneuver_threshold_deg),
            ("speed_variance_weight", self.speed_variance_weight),
            ("heading_variance_weight", self.heading_variance_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(TrackingError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Trajectory capacity as a non-zero count.
    pub fn capacity(&self) -> Result<NonZeroUsize, TrackingError> {
        NonZeroUsize::new(self.trajectory_capacity).ok_or_else(|| {
            TrackingError::InvalidConfig("trajectory_capacity must be at least 1".to_string())
        })
    }

    /// H3 resolution for the spatial index.
    pub fn resolution(&self) -> Result<Resolution, TrackingError> {
        Resolution::try_from(self.h3_resolution).map_err(|e| {
            TrackingError::InvalidConfig(format!("h3_resolution {}: {e}", self.h3_resolution))
        })
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    /// Weights used by `Trajectory::confidence`.
    pub fn confidence_model(&self) -> ConfidenceModel {
        ConfidenceModel {
            sparse: self.sparse_confidence,
            floor: self.min_confidence,
            speed_variance_weight: self.speed_variance_weight,
            heading_variance_weight: self.heading_variance_weight,
        }
    }
}

/// Parameters of the variance-based prediction confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceModel {
    /// Returned when fewer than 3 samples exist
    pub sparse: f64,
    /// Lower bound of the computed value
    pub floor: f64,
    pub speed_variance_weight: f64,
    pub heading_variance_weight: f64,
}

impl Default for ConfidenceModel {
    fn default() -> Self {
        TrackingConfig::default().confidence_model()
    }
}
