//! SkyTrack snapshot simulation harness
//!
//! Drives an `EntityRegistry` with a seeded producer of full snapshots, the
//! way a live alert feed would, and checks the registry's invariants along
//! the way.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                      SimRunner                        │
//! │                                                       │
//! │  ┌──────────────┐  snapshot   ┌──────────────────┐    │
//! │  │ SnapshotFeed │────────────►│  EntityRegistry  │    │
//! │  │ (seeded RNG) │             │  + trajectories  │    │
//! │  └──────▲───────┘             └────────┬─────────┘    │
//! │         │ step(dt)        tick / sweep │ events       │
//! │  ┌──────┴──────────────────────────────▼─────────┐    │
//! │  │  ManualClock (headless) or PeriodicTask (live) │    │
//! │  └────────────────────────────────────────────────┘    │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use skytrack_sim::{Scenario, SimConfig, SimRunner};
//!
//! let config = SimConfig {
//!     seed: 7,
//!     scenario: Scenario::DroneSwarm,
//!     ..Default::default()
//! };
//! let export = SimRunner::new(config)?.run()?;
//! assert!(export.summary.passed);
//! # Ok::<(), skytrack_sim::SimError>(())
//! ```

pub mod config;
mod error;
pub mod exporter;
pub mod feed;
pub mod runner;
pub mod scenarios;

pub use config::{BoundingBox, SimConfig};
pub use error::SimError;
pub use exporter::{RunExport, SnapshotFrame};
pub use feed::{FeedStats, SimTarget, SnapshotFeed, ThreatProfile};
pub use runner::{EventCounts, RunSummary, SimRunner};
pub use scenarios::Scenario;
