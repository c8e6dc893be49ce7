//! Virtual clock for deterministic simulation and tests.

use crate::Clock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A clock that only moves when told to.
///
/// Clones share the same underlying time, so a runner can hand one clone to
/// the registry and keep another to advance it.
#[derive(Debug, Clone)]
pub struct ManualClock {
    /// Current virtual time in Unix milliseconds
    now_ms: Arc<AtomicI64>,
}

impl ManualClock {
    /// 2024-01-01 00:00:00 UTC, the default simulation epoch.
    pub const DEFAULT_EPOCH_MS: i64 = 1_704_067_200_000;

    /// Creates a clock starting at the given Unix millisecond timestamp.
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    /// Creates a clock starting at [`Self::DEFAULT_EPOCH_MS`].
    pub fn at_epoch() -> Self {
        Self::new(Self::DEFAULT_EPOCH_MS)
    }

    /// Advances virtual time by the given duration.
    pub fn advance(&self, duration: Duration) {
        self.now_ms
            .fetch_add(duration.as_millis() as i64, Ordering::SeqCst);
    }

    /// Sets the virtual time to a specific value.
    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at_epoch()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
