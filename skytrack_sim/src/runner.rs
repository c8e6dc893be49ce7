//! Simulation runner - feeds snapshots through an `EntityRegistry`.
//!
//! Two drivers share one `Session`:
//! - `SimRunner::run` is headless and deterministic: a `ManualClock` is
//!   advanced in fixed steps and the periodic work is called inline.
//! - `SimRunner::run_live` runs on the current tokio `LocalSet` with three
//!   `PeriodicTask`s (snapshot, tick, sweep) against a real clock.

use crate::config::SimConfig;
use crate::exporter::{RunExport, SnapshotFrame};
use crate::feed::{FeedStats, SnapshotFeed};
use crate::scenarios::Scenario;
use crate::SimError;
use serde::{Deserialize, Serialize};
use skytrack_core::{ChangeEvent, EntityRegistry, RegistryStatistics};
use skytrack_env::{ManualClock, PeriodicTask, SharedClock};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Horizon used when sampling prediction quality at the end of a run.
const PREDICTION_HORIZON_SECS: f64 = 60.0;

/// Change events received by the runner's subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    pub added: u64,
    pub updated: u64,
    pub removed: u64,
    pub reconciled: u64,
}

impl EventCounts {
    fn record(&mut self, event: &ChangeEvent) {
        match event {
            ChangeEvent::Added { .. } => self.added += 1,
            ChangeEvent::Updated { .. } => self.updated += 1,
            ChangeEvent::Removed { .. } => self.removed += 1,
            ChangeEvent::Reconciled { .. } => self.reconciled += 1,
        }
    }
}

/// Results from one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub scenario: Scenario,
    pub seed: u64,

    /// Whether every end-of-run invariant held
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<String>,

    /// Seconds of simulated flight
    pub simulated_secs: f64,

    pub snapshots: u64,
    pub ticks: u64,
    pub sweeps: u64,

    /// Totals over every reconcile report
    pub added: u64,
    pub updated: u64,
    pub removed: u64,
    pub rejected: u64,

    /// Trajectories dropped by sweeps
    pub swept: u64,
    /// Inactive markers removed after going stale
    pub pruned: u64,

    pub events: EventCounts,

    pub maneuvers: usize,
    pub predictions: usize,
    pub mean_prediction_confidence: f64,

    pub feed_spawned: u64,
    pub feed_destroyed: u64,
    pub feed_malformed: u64,

    pub registry: RegistryStatistics,
}

// ============================================================================
// SESSION (shared by both drivers)
// ============================================================================

#[derive(Debug, Default)]
struct Counters {
    snapshots: u64,
    ticks: u64,
    sweeps: u64,
    added: u64,
    updated: u64,
    removed: u64,
    rejected: u64,
    swept: u64,
    pruned: u64,
}

struct Session {
    config: SimConfig,
    registry: EntityRegistry,
    feed: SnapshotFeed,
    events: Rc<RefCell<EventCounts>>,
    counters: Counters,
    frames: Vec<SnapshotFrame>,
    started_ms: i64,
}

impl Session {
    fn new(config: &SimConfig, clock: SharedClock) -> Result<Self, SimError> {
        let mut registry = EntityRegistry::new(config.tracking.clone(), clock)?;
        let events = Rc::new(RefCell::new(EventCounts::default()));
        let sink = Rc::clone(&events);
        registry.subscribe(move |event| sink.borrow_mut().record(event));

        Ok(Self {
            started_ms: registry.now_ms(),
            feed: SnapshotFeed::new(config)?,
            config: config.clone(),
            registry,
            events,
            counters: Counters::default(),
            frames: Vec::new(),
        })
    }

    fn snapshot(&mut self) {
        let now = self.registry.now_ms();
        let records = self.feed.next_snapshot(now);
        let report = self.registry.reconcile(records);

        self.counters.snapshots += 1;
        self.counters.added += report.added.len() as u64;
        self.counters.updated += report.updated.len() as u64;
        self.counters.removed += report.removed.len() as u64;
        self.counters.rejected += report.rejected.len() as u64;

        let stats = self.registry.statistics();
        self.frames.push(SnapshotFrame {
            time_sec: (now - self.started_ms) as f64 / 1000.0,
            entities: stats.entity_count,
            active: stats.active_count,
            added: report.added.len(),
            updated: report.updated.len(),
            removed: report.removed.len(),
            rejected: report.rejected.len(),
            total_points: stats.trajectories.total_points,
        });
    }

    fn tick(&mut self, dt_secs: f64) {
        self.feed.step(dt_secs);
        let moved = self.registry.tick(dt_secs);
        self.counters.ticks += 1;
        if self.counters.ticks % 60 == 0 {
            debug!(
                t = format!("{:.0}s", self.feed.time()),
                entities = self.registry.len(),
                moved,
                "tick"
            );
        }
    }

    /// Sweeps stale trajectories, then removes inactive markers that have
    /// not been seen for the same period.
    fn sweep(&mut self) {
        let stale_after = self.config.tracking.stale_after();
        let swept = self.registry.sweep_stale(stale_after);

        let now = self.registry.now_ms();
        let expired: Vec<String> = self
            .registry
            .query(|e| !e.is_active() && e.age_secs(now) > stale_after.as_secs_f64())
            .into_iter()
            .map(|e| e.id.clone())
            .collect();
        for id in &expired {
            self.registry.remove(id);
        }

        self.counters.sweeps += 1;
        self.counters.swept += swept.len() as u64;
        self.counters.pruned += expired.len() as u64;
    }

    /// Invariants that must hold whatever the feed did.
    fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let capacity = self.config.tracking.trajectory_capacity;

        for entity in self.registry.entities() {
            if !entity.position.is_valid() {
                violations.push(format!("{}: invalid position {:?}", entity.id, entity.position));
            }
            if !(0.0..360.0).contains(&entity.heading) {
                violations.push(format!("{}: heading {} out of range", entity.id, entity.heading));
            }
            if !(0.0..=1.0).contains(&entity.confidence) {
                violations.push(format!("{}: confidence {} out of range", entity.id, entity.confidence));
            }
            if entity.speed < 0.0 {
                violations.push(format!("{}: negative speed", entity.id));
            }
        }
        for (id, trajectory) in self.registry.trajectories().iter() {
            if trajectory.len() > capacity {
                violations.push(format!("{id}: {} samples exceed capacity {capacity}", trajectory.len()));
            }
            if !self.registry.contains(id) {
                violations.push(format!("{id}: trajectory without entity"));
            }
        }
        if self.registry.spatial_stats().total_entries != self.registry.len() {
            violations.push("spatial index out of sync with entities".to_string());
        }
        let events = *self.events.borrow();
        if events.reconciled != self.counters.snapshots {
            violations.push(format!(
                "{} snapshots but {} reconciled events",
                self.counters.snapshots, events.reconciled
            ));
        }
        violations
    }

    fn outcome(&self) -> RunExport {
        let mut maneuvers = 0;
        let mut confidences = Vec::new();
        for entity in self.registry.entities().filter(|e| e.is_active()) {
            maneuvers += self.registry.maneuvers(&entity.id).len();
            if let Some(prediction) = self.registry.predict(&entity.id, PREDICTION_HORIZON_SECS) {
                confidences.push(prediction.confidence);
            }
        }
        let mean_prediction_confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };

        let violations = self.violations();
        let FeedStats {
            spawned,
            destroyed,
            malformed,
            ..
        } = self.feed.stats();
        let c = &self.counters;

        let summary = RunSummary {
            scenario: self.config.scenario,
            seed: self.config.seed,
            passed: violations.is_empty(),
            violations,
            simulated_secs: self.feed.time(),
            snapshots: c.snapshots,
            ticks: c.ticks,
            sweeps: c.sweeps,
            added: c.added,
            updated: c.updated,
            removed: c.removed,
            rejected: c.rejected,
            swept: c.swept,
            pruned: c.pruned,
            events: *self.events.borrow(),
            maneuvers,
            predictions: confidences.len(),
            mean_prediction_confidence,
            feed_spawned: spawned,
            feed_destroyed: destroyed,
            feed_malformed: malformed,
            registry: self.registry.statistics(),
        };

        RunExport {
            scenario: self.config.scenario.name().to_string(),
            seed: self.config.seed,
            duration_sec: self.feed.time(),
            frames: self.frames.clone(),
            summary,
            trajectories: self.registry.export_trajectories(),
        }
    }
}

// ============================================================================
// RUNNER
// ============================================================================

/// Runs a configured simulation.
pub struct SimRunner {
    config: SimConfig,
}

impl SimRunner {
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.config.duration_secs = secs;
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Headless run on virtual time. Same config, same export.
    pub fn run(&self) -> Result<RunExport, SimError> {
        self.config.validate()?;
        info!(
            "Starting headless run: {} (seed={}, {}s)",
            self.config.scenario, self.config.seed, self.config.duration_secs
        );

        let clock = ManualClock::at_epoch();
        let mut session = Session::new(&self.config, Arc::new(clock.clone()))?;

        let tick_ms = millis(self.config.tick_interval());
        let snapshot_ms = millis(self.config.snapshot_interval());
        let sweep_ms = millis(self.config.sweep_interval());
        let total_ms = millis(self.config.duration());
        let dt_secs = tick_ms as f64 / 1000.0;

        session.snapshot();
        let (mut next_snapshot, mut next_sweep) = (snapshot_ms, sweep_ms);
        let mut elapsed = 0;
        while elapsed < total_ms {
            elapsed += tick_ms;
            clock.advance(Duration::from_millis(tick_ms));
            session.tick(dt_secs);

            while next_snapshot <= elapsed {
                session.snapshot();
                next_snapshot += snapshot_ms;
            }
            while next_sweep <= elapsed {
                session.sweep();
                next_sweep += sweep_ms;
            }
        }

        let export = session.outcome();
        report(&export);
        Ok(export)
    }

    /// Live run on the current `LocalSet`, until the configured duration
    /// elapses or Ctrl-C arrives.
    ///
    /// # Panics
    /// Panics if called outside a `LocalSet`.
    pub async fn run_live(&self, clock: SharedClock) -> Result<RunExport, SimError> {
        self.config.validate()?;
        info!(
            "Starting live run: {} (seed={}, {}s)",
            self.config.scenario, self.config.seed, self.config.duration_secs
        );

        let session = Rc::new(RefCell::new(Session::new(&self.config, clock)?));
        session.borrow_mut().snapshot();

        let dt_secs = self.config.tick_interval_secs;
        let tasks = [
            spawn_periodic(&session, "snapshot", self.config.snapshot_interval(), |s| s.snapshot())?,
            spawn_periodic(&session, "tick", self.config.tick_interval(), move |s| s.tick(dt_secs))?,
            spawn_periodic(&session, "sweep", self.config.sweep_interval(), |s| s.sweep())?,
        ];

        tokio::select! {
            _ = tokio::time::sleep(self.config.duration()) => info!("Run duration elapsed"),
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => info!("Interrupted, stopping"),
                Err(e) => warn!("Ctrl-C handler unavailable: {e}"),
            },
        }

        for task in &tasks {
            task.stop();
        }

        let export = session.borrow().outcome();
        report(&export);
        Ok(export)
    }
}

fn spawn_periodic<F>(
    session: &Rc<RefCell<Session>>,
    name: &str,
    period: Duration,
    mut action: F,
) -> Result<PeriodicTask, SimError>
where
    F: FnMut(&mut Session) + 'static,
{
    let session = Rc::clone(session);
    Ok(PeriodicTask::spawn(name, period, move || action(&mut session.borrow_mut()))?)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn report(export: &RunExport) {
    let s = &export.summary;
    info!(
        snapshots = s.snapshots,
        added = s.added,
        removed = s.removed,
        rejected = s.rejected,
        entities = s.registry.entity_count,
        points = s.registry.trajectories.total_points,
        maneuvers = s.maneuvers,
        "run finished"
    );
    for violation in &s.violations {
        warn!("invariant violated: {violation}");
    }
}
