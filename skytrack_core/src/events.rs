//! Change notifications and reconciliation reports.

use crate::entity::TrackedEntity;
use crate::TrackingError;
use serde::{Deserialize, Serialize};

/// Emitted synchronously to subscribers after a mutation is fully applied.
///
/// Timestamps are Unix milliseconds from the registry's clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChangeEvent {
    Added {
        entity: TrackedEntity,
        timestamp: i64,
    },
    Updated {
        entity: TrackedEntity,
        timestamp: i64,
    },
    Removed {
        entity: TrackedEntity,
        timestamp: i64,
    },
    /// One per `reconcile` call, after the whole batch
    Reconciled {
        added: Vec<TrackedEntity>,
        updated: Vec<TrackedEntity>,
        removed: Vec<TrackedEntity>,
        timestamp: i64,
    },
}

/// Discriminant of a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
    Reconciled,
}

impl ChangeEvent {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Added { .. } => ChangeKind::Added,
            Self::Updated { .. } => ChangeKind::Updated,
            Self::Removed { .. } => ChangeKind::Removed,
            Self::Reconciled { .. } => ChangeKind::Reconciled,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Added { timestamp, .. }
            | Self::Updated { timestamp, .. }
            | Self::Removed { timestamp, .. }
            | Self::Reconciled { timestamp, .. } => *timestamp,
        }
    }

    /// Every entity the event carries.
    pub fn entities(&self) -> Vec<&TrackedEntity> {
        match self {
            Self::Added { entity, .. } | Self::Updated { entity, .. } | Self::Removed { entity, .. } => {
                vec![entity]
            }
            Self::Reconciled {
                added,
                updated,
                removed,
                ..
            } => added.iter().chain(updated).chain(removed).collect(),
        }
    }
}

/// Handle returned by `EntityRegistry::subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

/// A snapshot record that was not applied.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRecord {
    /// Position of the record in the snapshot
    pub index: usize,
    /// Id, when the record carried a usable one
    pub id: Option<String>,
    pub error: TrackingError,
}

/// Outcome of one `reconcile` call, ids in processing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    pub rejected: Vec<RejectedRecord>,
}

impl ReconcileReport {
    /// True when the snapshot changed nothing and rejected nothing.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty() && self.rejected.is_empty()
    }

    /// Number of records applied (added or updated).
    pub fn applied(&self) -> usize {
        self.added.len() + self.updated.len()
    }
}
