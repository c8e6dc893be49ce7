//! SkyTrack Core - aerial entity reconciliation and trajectory tracking
//!
//! Turns a stream of externally supplied snapshots into a live, deduplicated
//! set of tracked entities, and keeps a bounded motion history per entity:
//!
//! 1. **Reconciliation**: `EntityRegistry::reconcile` applies a full snapshot
//!    with add / update / evict semantics. Only active entities are evicted.
//! 2. **Trajectories**: heading, speed, dead-reckoning prediction with a
//!    variance-based confidence, and maneuver detection.
//!
//! Everything is synchronous and single-threaded. Time comes from a
//! `skytrack_env::Clock`, so tests run on a `ManualClock`.

pub mod config;
pub mod entity;
pub mod error;
pub mod events;
pub mod geomath;
pub mod record;
pub mod registry;
pub mod trajectory;
pub mod trajectory_store;

// Re-export key types for convenience
pub use config::{ConfidenceModel, TrackingConfig};
pub use entity::{AltitudeCategory, Classification, EntityStatus, Metadata, SpeedCategory, TrackedEntity};
pub use error::TrackingError;
pub use events::{ChangeEvent, ChangeKind, ReconcileReport, RejectedRecord, SubscriptionId};
pub use geomath::{Position, Velocity};
pub use record::{EntityUpdate, SnapshotRecord};
pub use registry::{EntityFilter, EntityRegistry, RegistryStatistics, SpatialIndexStats};
pub use trajectory::{Maneuver, Prediction, Sample, SampleMetadata, Trajectory, TrajectoryFeature, TrajectorySummary};
pub use trajectory_store::{FeatureCollection, StoreStatistics, TrajectoryStore};
