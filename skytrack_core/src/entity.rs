//! The canonical record for one tracked object.

use crate::geomath::{compass_point, Position, Velocity};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Opaque collaborator-specific fields (icon, color, source tag, ...).
pub type Metadata = Map<String, Value>;

// ============================================================================
// CLASSIFICATION / STATUS
// ============================================================================

/// What kind of object (or alert) an entity represents.
///
/// Parsing is lenient: producers use a zoo of labels (`shahed`, `uav`,
/// `cruise_missile`, `Ballistic Missile`, ...). Anything unrecognised is
/// `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", from = "String")]
pub enum Classification {
    Drone,
    CruiseMissile,
    Ballistic,
    Helicopter,
    Aircraft,
    RegionAlert,
    Unknown,
}

impl Classification {
    /// Parses a producer label.
    pub fn from_label(label: &str) -> Self {
        let key: String = label
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();

        match key.as_str() {
            "drone" | "uav" | "shahed" | "shahed_136" | "geran" | "geran_2" | "lancet" => Self::Drone,
            "cruise_missile" | "cruise" | "kalibr" | "kh_101" => Self::CruiseMissile,
            "ballistic" | "ballistic_missile" | "iskander" | "tactical_missile" => Self::Ballistic,
            "helicopter" => Self::Helicopter,
            "aircraft" | "plane" | "jet" => Self::Aircraft,
            "region_alert" | "alert" | "air_alert" | "air_raid" => Self::RegionAlert,
            _ => Self::Unknown,
        }
    }

    /// Kebab-case label, as serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drone => "drone",
            Self::CruiseMissile => "cruise-missile",
            Self::Ballistic => "ballistic",
            Self::Helicopter => "helicopter",
            Self::Aircraft => "aircraft",
            Self::RegionAlert => "region-alert",
            Self::Unknown => "unknown",
        }
    }
}

impl Default for Classification {
    fn default() -> Self {
        Self::Unknown
    }
}

impl From<String> for Classification {
    fn from(label: String) -> Self {
        Self::from_label(&label)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether reconciliation may evict the entity.
///
/// Only `Active` entities are evicted when a snapshot omits them; `Inactive`
/// ones ("destroyed", "passed") are kept as historical markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum EntityStatus {
    Active,
    Inactive,
}

impl EntityStatus {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "inactive" | "destroyed" | "passed" | "intercepted" | "cleared" => Self::Inactive,
            _ => Self::Active,
        }
    }
}

impl Default for EntityStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl From<String> for EntityStatus {
    fn from(label: String) -> Self {
        Self::from_label(&label)
    }
}

// ============================================================================
// TRACKED ENTITY
// ============================================================================

/// One tracked object as the registry currently believes it to be.
///
/// Motion history lives in the `TrajectoryStore`, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntity {
    pub id: String,
    pub classification: Classification,
    pub position: Position,
    /// km/h, never negative
    pub speed: f64,
    /// Metres; 0 for region-level alerts
    pub altitude: f64,
    /// Degrees [0, 360), 0 = north, clockwise
    pub heading: f64,
    pub status: EntityStatus,
    /// [0, 1]
    pub confidence: f64,
    /// Unix milliseconds of the last observation
    pub last_seen: i64,
    pub region: String,
    /// Producer-supplied motion vector; overrides the trajectory-derived one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<Velocity>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Metadata,
}

impl TrackedEntity {
    pub fn is_active(&self) -> bool {
        self.status == EntityStatus::Active
    }

    /// Age of the last observation relative to `now_ms`, in seconds.
    pub fn age_secs(&self, now_ms: i64) -> f64 {
        (now_ms.saturating_sub(self.last_seen) as f64 / 1000.0).max(0.0)
    }

    pub fn speed_category(&self) -> SpeedCategory {
        match self.speed {
            s if s < 100.0 => SpeedCategory::Slow,
            s if s < 500.0 => SpeedCategory::Medium,
            s if s < 1000.0 => SpeedCategory::Fast,
            _ => SpeedCategory::VeryFast,
        }
    }

    pub fn altitude_category(&self) -> AltitudeCategory {
        match self.altitude {
            a if a < 100.0 => AltitudeCategory::VeryLow,
            a if a < 1000.0 => AltitudeCategory::Low,
            a if a < 5000.0 => AltitudeCategory::Medium,
            _ => AltitudeCategory::High,
        }
    }

    /// 8-point compass label of the heading ("N", "NE", ...).
    pub fn compass_point(&self) -> &'static str {
        compass_point(self.heading)
    }
}

/// Speed band, km/h: < 100, < 500, < 1000, above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpeedCategory {
    Slow,
    Medium,
    Fast,
    VeryFast,
}

/// Altitude band, metres: < 100, < 1000, < 5000, above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AltitudeCategory {
    VeryLow,
    Low,
    Medium,
    High,
}
