//! Stoppable periodic triggers.
//!
//! A `PeriodicTask` is the abstract "periodic external trigger" that calls
//! `tick` or `sweep_stale` on the registry. It runs as a local task on the
//! current tokio `LocalSet`, so the callback never races with other
//! mutations: everything still happens on one thread, one trigger at a time.

use crate::EnvError;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Handle to a callback invoked once per period.
///
/// The first invocation happens one full period after `spawn`. Stopping is
/// idempotent, and once `stop` returns the callback never runs again.
/// Dropping the handle stops the task.
pub struct PeriodicTask {
    name: String,
    period: Duration,
    stopped: Rc<Cell<bool>>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawns `callback` on the current `LocalSet`.
    ///
    /// # Errors
    /// Returns `EnvError::InvalidPeriod` for a zero period.
    ///
    /// # Panics
    /// Panics if called outside a `LocalSet` (tokio `spawn_local` contract).
    pub fn spawn<F>(name: &str, period: Duration, mut callback: F) -> Result<Self, EnvError>
    where
        F: FnMut() + 'static,
    {
        if period.is_zero() {
            return Err(EnvError::InvalidPeriod(period));
        }

        let stopped = Rc::new(Cell::new(false));
        let flag = Rc::clone(&stopped);
        let task_name = name.to_string();

        let handle = tokio::task::spawn_local(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                // Checked after every wake-up so a stop issued while we were
                // parked can never be followed by one more call.
                if flag.get() {
                    break;
                }
                callback();
            }

            debug!(task = %task_name, "periodic task exited");
        });

        debug!(task = %name, period_ms = period.as_millis() as u64, "periodic task started");

        Ok(Self {
            name: name.to_string(),
            period,
            stopped,
            handle,
        })
    }

    /// Stops the task. Safe to call any number of times.
    pub fn stop(&self) {
        if self.stopped.replace(true) {
            return;
        }
        self.handle.abort();
        debug!(task = %self.name, "periodic task stopped");
    }

    /// Returns true once `stop` has been called (or the handle dropped).
    pub fn is_stopped(&self) -> bool {
        self.stopped.get()
    }

    /// The task's logical name (for logging).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured period.
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("name", &self.name)
            .field("period", &self.period)
            .field("stopped", &self.stopped.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::LocalSet;

    fn counter() -> (Rc<Cell<u32>>, impl FnMut() + 'static) {
        let count = Rc::new(Cell::new(0));
        let inner = Rc::clone(&count);
        (count, move || inner.set(inner.get() + 1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_task_fires_each_period() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let (count, callback) = counter();
                let task = PeriodicTask::spawn("count", Duration::from_secs(1), callback).unwrap();

                tokio::time::sleep(Duration::from_millis(3_500)).await;
                assert_eq!(count.get(), 3);

                task.stop();
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_final() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let (count, callback) = counter();
                let task = PeriodicTask::spawn("stop", Duration::from_secs(1), callback).unwrap();

                tokio::time::sleep(Duration::from_millis(1_500)).await;
                assert_eq!(count.get(), 1);

                task.stop();
                task.stop();
                assert!(task.is_stopped());

                tokio::time::sleep(Duration::from_secs(10)).await;
                assert_eq!(count.get(), 1, "callback ran after stop");
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_task() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let (count, callback) = counter();
                let task = PeriodicTask::spawn("drop", Duration::from_secs(1), callback).unwrap();
                drop(task);

                tokio::time::sleep(Duration::from_secs(5)).await;
                assert_eq!(count.get(), 0);
            })
            .await;
    }

    #[test]
    fn test_zero_period_rejected() {
        let result = PeriodicTask::spawn("zero", Duration::ZERO, || {});
        assert!(matches!(result, Err(EnvError::InvalidPeriod(_))));
    }
}
