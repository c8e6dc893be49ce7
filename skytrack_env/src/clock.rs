//! Core time-source trait for SkyTrack.

use std::sync::Arc;
use std::time::Duration;

/// The wall-clock interface used by the tracking core.
///
/// Every timestamp the core stamps on a sample, entity or event comes from
/// here, never from `SystemTime::now()` directly.
///
/// # Implementations
///
/// - **Production**: `SystemClock` - wraps `SystemTime`
/// - **Simulation / tests**: `ManualClock` - a virtual clock advanced by hand
pub trait Clock: Send + Sync + 'static {
    /// Returns the current time in Unix milliseconds.
    fn now_ms(&self) -> i64;

    /// Milliseconds elapsed since `earlier_ms`, saturating at zero.
    fn elapsed_since(&self, earlier_ms: i64) -> Duration {
        let delta = self.now_ms().saturating_sub(earlier_ms);
        Duration::from_millis(delta.max(0) as u64)
    }
}

/// Reference-counted clock handle shared between the registry and its
/// collaborators.
pub type SharedClock = Arc<dyn Clock>;
