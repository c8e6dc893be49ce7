//! Production implementation of `Clock` backed by the system clock.

use crate::Clock;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Production clock reading `SystemTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Creates a new SystemClock.
    pub fn new() -> Self {
        Self
    }

    /// Creates an Arc-wrapped clock for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        // A clock set before 1970 is treated as the epoch itself.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_after_2024() {
        let clock = SystemClock::new();
        // 2024-01-01 00:00:00 UTC
        assert!(clock.now_ms() > 1_704_067_200_000);
    }

    #[test]
    fn test_system_clock_monotonic_enough() {
        let clock = SystemClock::new();
        let t1 = clock.now_ms();
        let t2 = clock.now_ms();
        assert!(t2 >= t1);
    }
}
