//! SkyTrack Environment Abstraction Layer
//!
//! This crate isolates everything the tracking core must not own itself:
//! - Time (`now_ms()`), so staleness and timestamps are reproducible in tests
//! - Periodic triggers (`PeriodicTask`), the stoppable timers that drive
//!   `tick` and `sweep_stale` between snapshot arrivals
//!
//! The core stays synchronous and single-threaded. Periodic tasks run on a
//! tokio current-thread `LocalSet`, so their callbacks may borrow
//! non-`Send` state such as an `Rc<RefCell<EntityRegistry>>`.
//!
//! # Example
//!
//! ```ignore
//! use skytrack_env::{PeriodicTask, SystemClock};
//!
//! let local = tokio::task::LocalSet::new();
//! local.run_until(async {
//!     let sweeper = PeriodicTask::spawn("sweep", Duration::from_secs(60), move || {
//!         registry.borrow_mut().sweep_stale(Duration::from_secs(300));
//!     })?;
//!     // ...
//!     sweeper.stop();
//! }).await;
//! ```

mod clock;
mod error;
mod manual;
mod periodic;
mod system;

pub use clock::{Clock, SharedClock};
pub use error::EnvError;
pub use manual::ManualClock;
pub use periodic::PeriodicTask;
pub use system::SystemClock;
