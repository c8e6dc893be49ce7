//! Simulation configuration.

use crate::scenarios::Scenario;
use crate::SimError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use skytrack_core::{Position, TrackingConfig};
use std::path::Path;
use std::time::Duration;

/// Geographic area the feed spawns targets in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min_lat: 48.0,
            max_lat: 53.0,
            min_lon: 23.0,
            max_lon: 39.0,
        }
    }
}

impl BoundingBox {
    pub fn contains(&self, position: Position) -> bool {
        (self.min_lat..=self.max_lat).contains(&position.lat)
            && (self.min_lon..=self.max_lon).contains(&position.lon)
    }

    /// Uniformly random point inside the box.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Position {
        Position::new(
            rng.gen_range(self.min_lat..=self.max_lat),
            rng.gen_range(self.min_lon..=self.max_lon),
        )
    }

    fn is_valid(&self) -> bool {
        Position::new(self.min_lat, self.min_lon).is_valid()
            && Position::new(self.max_lat, self.max_lon).is_valid()
            && self.min_lat < self.max_lat
            && self.min_lon < self.max_lon
    }
}

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    pub scenario: Scenario,

    /// Simulated (headless) or wall-clock (live) run length
    pub duration_secs: f64,

    /// Period between snapshots
    pub snapshot_interval_secs: f64,

    /// Period between dead-reckoning ticks
    pub tick_interval_secs: f64,

    /// Period between stale-trajectory sweeps
    pub sweep_interval_secs: f64,

    pub bounds: BoundingBox,

    /// Chance per snapshot that a new target appears
    pub spawn_probability: f64,

    /// Upper bound on simultaneously live targets
    pub max_targets: usize,

    /// Chance per snapshot that a target silently drops out of the feed
    pub despawn_probability: f64,

    /// Chance per snapshot that a target is reported destroyed
    pub destroy_probability: f64,

    /// Chance per snapshot that one corrupt record is mixed in
    pub malformed_probability: f64,

    /// Chance per step that a target changes course
    pub turn_probability: f64,

    /// Standard deviation of reported position noise, in degrees
    pub position_noise_deg: f64,

    pub tracking: TrackingConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            scenario: Scenario::Mixed,
            duration_secs: 300.0,
            snapshot_interval_secs: 5.0,
            tick_interval_secs: 1.0,
            sweep_interval_secs: 60.0,
            bounds: BoundingBox::default(),
            spawn_probability: 0.7,
            max_targets: 12,
            despawn_probability: 0.02,
            destroy_probability: 0.02,
            malformed_probability: 0.05,
            turn_probability: 0.02,
            position_noise_deg: 0.0005,
            tracking: TrackingConfig::default(),
        }
    }
}

impl SimConfig {
    /// Reads a JSON config file; missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path)?;
        let config: SimConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        for (name, value) in [
            ("duration_secs", self.duration_secs),
            ("snapshot_interval_secs", self.snapshot_interval_secs),
            ("tick_interval_secs", self.tick_interval_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(SimError::InvalidConfig(format!("{name} must be positive, got {value}")));
            }
        }
        for (name, value) in [
            ("spawn_probability", self.spawn_probability),
            ("despawn_probability", self.despawn_probability),
            ("destroy_probability", self.destroy_probability),
            ("malformed_probability", self.malformed_probability),
            ("turn_probability", self.turn_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SimError::InvalidConfig(format!("{name} must be within [0, 1], got {value}")));
            }
        }
        if !self.position_noise_deg.is_finite() || self.position_noise_deg < 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "position_noise_deg must be non-negative, got {}",
                self.position_noise_deg
            )));
        }
        if !self.bounds.is_valid() {
            return Err(SimError::InvalidConfig(format!("invalid bounds {:?}", self.bounds)));
        }
        self.tracking.validate()?;
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs_f64(self.snapshot_interval_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(self.tick_interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs_f64(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_default_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config: SimConfig = serde_json::from_str(
            r#"{ "seed": 7, "scenario": "drone_swarm", "tracking": { "trajectory_capacity": 20 } }"#,
        )
        .unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.scenario, Scenario::DroneSwarm);
        assert_eq!(config.tracking.trajectory_capacity, 20);
        assert_eq!(config.snapshot_interval_secs, 5.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = SimConfig {
            tick_interval_secs: 0.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SimError::InvalidConfig(_))));

        let config = SimConfig {
            spawn_probability: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.tracking.trajectory_capacity = 0;
        assert!(matches!(config.validate(), Err(SimError::Tracking(_))));
    }

    #[test]
    fn test_bounding_box_sample_inside() {
        let bounds = BoundingBox::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..100 {
            assert!(bounds.contains(bounds.sample(&mut rng)));
        }
    }
}
