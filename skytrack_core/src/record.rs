//! Inbound snapshot records and validated partial updates.
//!
//! `SnapshotRecord` is the loosely typed shape a transport collaborator hands
//! over (field aliases, unknown fields kept as metadata). It is converted into
//! an `EntityUpdate` at the boundary; only validated updates reach the
//! registry's mutation paths.

use crate::entity::{Classification, EntityStatus, Metadata};
use crate::geomath::{normalize_heading, Position, Velocity};
use crate::TrackingError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Latest accepted record timestamp: 9999-12-31T23:59:59.999Z in Unix ms.
pub const MAX_TIMESTAMP_MS: i64 = 253_402_300_799_999;

// ============================================================================
// SNAPSHOT RECORD (wire shape)
// ============================================================================

/// One entity as described by a snapshot producer.
///
/// Unknown fields land in `extra` and are carried into the entity's
/// metadata untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, alias = "type", skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,

    /// `[lat, lon]`
    #[serde(default, alias = "coordinates", skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,

    #[serde(default, alias = "direction", skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Unix milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,

    #[serde(default, alias = "vector", skip_serializing_if = "Option::is_none")]
    pub velocity: Option<Velocity>,

    #[serde(flatten)]
    pub extra: Metadata,
}

impl SnapshotRecord {
    /// Minimal well-formed record.
    pub fn new(id: impl Into<String>, position: Position) -> Self {
        Self {
            id: Some(id.into()),
            position: Some(position),
            ..Default::default()
        }
    }

    pub fn with_classification(mut self, label: impl Into<String>) -> Self {
        self.classification = Some(label.into());
        self
    }

    pub fn with_status(mut self, label: impl Into<String>) -> Self {
        self.status = Some(label.into());
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp = Some(timestamp_ms);
        self
    }

    /// Usable id, if the record carries one.
    pub fn usable_id(&self) -> Option<&str> {
        self.id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }
}

impl TryFrom<SnapshotRecord> for EntityUpdate {
    type Error = TrackingError;

    /// Snapshot records must carry an id and a position; the rest is optional.
    fn try_from(record: SnapshotRecord) -> Result<Self, Self::Error> {
        let id = record
            .usable_id()
            .ok_or_else(|| TrackingError::malformed("missing id"))?
            .to_string();
        if record.position.is_none() {
            return Err(TrackingError::malformed(format!("{id}: missing position")));
        }

        let update = EntityUpdate {
            id,
            classification: record.classification.as_deref().map(Classification::from_label),
            position: record.position,
            speed: record.speed,
            altitude: record.altitude,
            heading: record.heading,
            status: record.status.as_deref().map(EntityStatus::from_label),
            confidence: record.confidence,
            region: record.region,
            timestamp_ms: record.timestamp,
            velocity: record.velocity,
            metadata: record.extra,
        };
        update.validate()?;
        Ok(update.normalized())
    }
}

// ============================================================================
// ENTITY UPDATE (validated partial update)
// ============================================================================

/// Partial update of one entity.
///
/// Every `Some` field overwrites the stored value; `None` leaves it alone.
/// Metadata keys are merged one by one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityUpdate {
    pub id: String,
    pub classification: Option<Classification>,
    pub position: Option<Position>,
    pub speed: Option<f64>,
    pub altitude: Option<f64>,
    pub heading: Option<f64>,
    pub status: Option<EntityStatus>,
    pub confidence: Option<f64>,
    pub region: Option<String>,
    pub timestamp_ms: Option<i64>,
    pub velocity: Option<Velocity>,
    pub metadata: Metadata,
}

impl EntityUpdate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Update for a first sighting whose producer assigned no id.
    pub fn with_generated_id() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn classification(mut self, classification: Classification) -> Self {
        self.classification = Some(classification);
        self
    }

    pub fn status(mut self, status: EntityStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = Some(timestamp_ms);
        self
    }

    pub fn velocity(mut self, velocity: Velocity) -> Self {
        self.velocity = Some(velocity);
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Rejects blank ids, invalid coordinates, non-finite scalars and
    /// timestamps outside `0..=MAX_TIMESTAMP_MS`.
    pub fn validate(&self) -> Result<(), TrackingError> {
        if self.id.trim().is_empty() {
            return Err(TrackingError::malformed("missing id"));
        }
        if let Some(position) = self.position {
            if !position.is_valid() {
                return Err(TrackingError::malformed(format!(
                    "{}: invalid coordinates [{}, {}]",
                    self.id, position.lat, position.lon
                )));
            }
        }
        for (name, value) in [
            ("speed", self.speed),
            ("altitude", self.altitude),
            ("heading", self.heading),
            ("confidence", self.confidence),
        ] {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(TrackingError::malformed(format!("{}: non-finite {name}", self.id)));
                }
            }
        }
        if let Some(velocity) = self.velocity {
            if !velocity.is_finite() {
                return Err(TrackingError::malformed(format!("{}: non-finite velocity", self.id)));
            }
        }
        if let Some(ts) = self.timestamp_ms {
            if !(0..=MAX_TIMESTAMP_MS).contains(&ts) {
                return Err(TrackingError::malformed(format!("{}: timestamp {ts} out of range", self.id)));
            }
        }
        Ok(())
    }

    /// Applies the entity invariants: heading in [0, 360), confidence in
    /// [0, 1], speed non-negative, id trimmed.
    pub fn normalized(mut self) -> Self {
        self.id = self.id.trim().to_string();
        self.heading = self.heading.map(normalize_heading);
        self.confidence = self.confidence.map(|c| c.clamp(0.0, 1.0));
        self.speed = self.speed.map(|s| s.max(0.0));
        self
    }
}
