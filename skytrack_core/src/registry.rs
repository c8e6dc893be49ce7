//! EntityRegistry - the live, reconciled set of tracked entities.
//!
//! The registry is the only writer of entity state. Trajectory samples are a
//! side effect of its mutations, and every public mutation notifies
//! subscribers once it has been fully applied.
//!
//! Besides the id map, the registry keeps an H3 spatial index (cell -> ids)
//! so collaborators can ask for entities near a point without scanning.

use crate::config::TrackingConfig;
use crate::entity::{Classification, EntityStatus, TrackedEntity};
use crate::events::{ChangeEvent, ReconcileReport, RejectedRecord, SubscriptionId};
use crate::geomath::Position;
use crate::record::{EntityUpdate, SnapshotRecord};
use crate::trajectory::{Maneuver, Prediction, SampleMetadata, Trajectory};
use crate::trajectory_store::{FeatureCollection, StoreStatistics, TrajectoryStore};
use crate::TrackingError;
use h3o::{CellIndex, LatLng, Resolution};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use skytrack_env::SharedClock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Region assigned to entities whose producer did not name one.
pub const UNSPECIFIED_REGION: &str = "unspecified";

type Subscriber = Box<dyn FnMut(&ChangeEvent)>;

// ============================================================================
// FILTERS / STATISTICS
// ============================================================================

/// Common predicate for [`EntityRegistry::filter`]. `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityFilter {
    pub classification: Option<Classification>,
    pub region: Option<String>,
    pub status: Option<EntityStatus>,
}

impl EntityFilter {
    pub fn classification(mut self, classification: Classification) -> Self {
        self.classification = Some(classification);
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn status(mut self, status: EntityStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, entity: &TrackedEntity) -> bool {
        self.classification.map_or(true, |c| entity.classification == c)
            && self.region.as_deref().map_or(true, |r| entity.region == r)
            && self.status.map_or(true, |s| entity.status == s)
    }
}

/// Occupancy of the H3 spatial index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialIndexStats {
    pub total_cells: usize,
    pub total_entries: usize,
    pub avg_per_cell: f64,
}

/// Registry-wide counts for dashboards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStatistics {
    pub entity_count: usize,
    pub active_count: usize,
    pub inactive_count: usize,
    pub by_classification: BTreeMap<Classification, usize>,
    pub spatial: SpatialIndexStats,
    pub trajectories: StoreStatistics,
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Reconciles snapshots into a deduplicated entity set.
///
/// Not `Send`: subscribers are plain `FnMut` closures and everything runs on
/// one thread. Share it as `Rc<RefCell<_>>` between local tasks.
pub struct EntityRegistry {
    /// All entities, in first-seen order
    entities: IndexMap<String, TrackedEntity>,

    /// Position history, one trajectory per entity with a recorded position
    store: TrajectoryStore,

    /// H3 cell -> ids of the entities inside it
    spatial_index: HashMap<CellIndex, HashSet<String>>,

    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,

    config: TrackingConfig,
    resolution: Resolution,
    clock: SharedClock,
}

impl EntityRegistry {
    /// Creates an empty registry.
    ///
    /// # Errors
    /// `InvalidConfig` when the configuration fails validation.
    pub fn new(config: TrackingConfig, clock: SharedClock) -> Result<Self, TrackingError> {
        let store = TrajectoryStore::new(&config)?;
        let resolution = config.resolution()?;
        Ok(Self {
            entities: IndexMap::new(),
            store,
            spatial_index: HashMap::new(),
            subscribers: Vec::new(),
            next_subscription: 0,
            config,
            resolution,
            clock,
        })
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    /// Inserts or merges one entity and emits `Added` / `Updated`.
    ///
    /// # Errors
    /// `MalformedRecord` for an invalid update, or for a new id without a
    /// position.
    pub fn upsert(&mut self, update: EntityUpdate) -> Result<TrackedEntity, TrackingError> {
        let (entity, created) = self.apply(update)?;
        let timestamp = self.clock.now_ms();
        let event = if created {
            ChangeEvent::Added {
                entity: entity.clone(),
                timestamp,
            }
        } else {
            ChangeEvent::Updated {
                entity: entity.clone(),
                timestamp,
            }
        };
        self.emit(&event);
        Ok(entity)
    }

    /// Validates a raw snapshot record, then upserts it.
    pub fn upsert_record(&mut self, record: SnapshotRecord) -> Result<TrackedEntity, TrackingError> {
        self.upsert(EntityUpdate::try_from(record)?)
    }

    /// Removes an entity with its trajectory. Emits `Removed` if it existed.
    pub fn remove(&mut self, id: &str) -> bool {
        match self.detach(id) {
            Some(entity) => {
                debug!(entity = %id, "entity removed");
                let event = ChangeEvent::Removed {
                    entity,
                    timestamp: self.clock.now_ms(),
                };
                self.emit(&event);
                true
            }
            None => false,
        }
    }

    /// Changes the status of an existing entity and emits `Updated`.
    ///
    /// # Errors
    /// `UnknownEntity` when `id` is not registered.
    pub fn set_status(&mut self, id: &str, status: EntityStatus) -> Result<TrackedEntity, TrackingError> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| TrackingError::UnknownEntity(id.to_string()))?;
        entity.status = status;
        let entity = entity.clone();

        debug!(entity = %id, ?status, "status changed");
        let event = ChangeEvent::Updated {
            entity: entity.clone(),
            timestamp: self.clock.now_ms(),
        };
        self.emit(&event);
        Ok(entity)
    }

    /// Applies a full authoritative snapshot.
    ///
    /// Records are applied in order; malformed ones are reported and skipped.
    /// Afterwards every active entity the snapshot did not mention is evicted
    /// (a rejected record with a usable id still counts as a mention).
    /// Inactive entities are never evicted here. Exactly one `Reconciled`
    /// event is emitted, after the whole batch.
    pub fn reconcile<I>(&mut self, snapshot: I) -> ReconcileReport
    where
        I: IntoIterator<Item = SnapshotRecord>,
    {
        let mut report = ReconcileReport::default();
        let mut seen: HashSet<String> = HashSet::new();
        // id -> (created in this batch, latest state)
        let mut touched: IndexMap<String, (bool, TrackedEntity)> = IndexMap::new();

        for (index, record) in snapshot.into_iter().enumerate() {
            let id = record.usable_id().map(str::to_string);
            if let Some(id) = &id {
                seen.insert(id.clone());
            }

            match EntityUpdate::try_from(record).and_then(|update| self.apply(update)) {
                Ok((entity, created)) => {
                    debug!(index, entity = %entity.id, created, "snapshot record applied");
                    match touched.get_mut(&entity.id) {
                        Some((_, latest)) => *latest = entity,
                        None => {
                            touched.insert(entity.id.clone(), (created, entity));
                        }
                    }
                }
                Err(error) => {
                    warn!(index, id = ?id, %error, "snapshot record rejected");
                    report.rejected.push(RejectedRecord { index, id, error });
                }
            }
        }

        let absent: Vec<String> = self
            .entities
            .values()
            .filter(|e| e.is_active() && !seen.contains(&e.id))
            .map(|e| e.id.clone())
            .collect();
        let mut removed = Vec::with_capacity(absent.len());
        for id in absent {
            if let Some(entity) = self.detach(&id) {
                debug!(entity = %id, "evicted: absent from snapshot");
                report.removed.push(id);
                removed.push(entity);
            }
        }

        let (mut added, mut updated) = (Vec::new(), Vec::new());
        for (id, (created, entity)) in touched {
            if created {
                report.added.push(id);
                added.push(entity);
            } else {
                report.updated.push(id);
                updated.push(entity);
            }
        }

        info!(
            added = report.added.len(),
            updated = report.updated.len(),
            removed = report.removed.len(),
            rejected = report.rejected.len(),
            total = self.entities.len(),
            "snapshot reconciled"
        );

        let event = ChangeEvent::Reconciled {
            added,
            updated,
            removed,
            timestamp: self.clock.now_ms(),
        };
        self.emit(&event);
        report
    }

    /// Dead-reckons every active entity forward by `dt_seconds`.
    ///
    /// Uses the entity's explicit velocity when present, otherwise the one
    /// implied by its two newest trajectory samples. Records no samples and
    /// emits nothing. Non-finite or non-positive `dt_seconds` is ignored.
    /// Returns the number of entities that moved.
    pub fn tick(&mut self, dt_seconds: f64) -> usize {
        if !dt_seconds.is_finite() || dt_seconds <= 0.0 {
            return 0;
        }

        let moves: Vec<(String, Position, Position)> = self
            .entities
            .values()
            .filter(|e| e.is_active())
            .filter_map(|e| {
                let velocity = e
                    .velocity
                    .or_else(|| self.store.get(&e.id).and_then(Trajectory::velocity))?;
                let next = e.position.advanced(velocity, dt_seconds);
                (next != e.position && next.is_valid()).then(|| (e.id.clone(), e.position, next))
            })
            .collect();

        for (id, from, to) in &moves {
            self.reindex(id, *from, *to);
            if let Some(entity) = self.entities.get_mut(id) {
                entity.position = *to;
            }
        }
        moves.len()
    }

    /// Drops trajectories whose newest sample is older than `max_age`.
    /// Entities stay registered; their next position starts a new history.
    pub fn sweep_stale(&mut self, max_age: Duration) -> Vec<String> {
        let now = self.clock.now_ms();
        self.store.sweep_stale(max_age, now)
    }

    /// Subscribes a callback; events arrive in subscription order.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&ChangeEvent) + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Returns whether the subscription existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn get(&self, id: &str) -> Option<&TrackedEntity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// All entities in first-seen order.
    pub fn entities(&self) -> impl Iterator<Item = &TrackedEntity> {
        self.entities.values()
    }

    /// Entities matching `predicate`, in first-seen order.
    pub fn query<P>(&self, mut predicate: P) -> Vec<&TrackedEntity>
    where
        P: FnMut(&TrackedEntity) -> bool,
    {
        self.entities.values().filter(|e| predicate(e)).collect()
    }

    pub fn filter(&self, filter: &EntityFilter) -> Vec<&TrackedEntity> {
        self.query(|e| filter.matches(e))
    }

    /// Entities in the H3 k-ring around `position` (k = 0 is the cell
    /// itself), in first-seen order.
    ///
    /// # Errors
    /// `MalformedRecord` for an invalid query position.
    pub fn query_near(&self, position: Position, k_rings: u32) -> Result<Vec<&TrackedEntity>, TrackingError> {
        let center = self.position_to_cell(position)?;
        let mut nearby: HashSet<&str> = HashSet::new();
        for cell in center.grid_disk_safe(k_rings) {
            if let Some(ids) = self.spatial_index.get(&cell) {
                nearby.extend(ids.iter().map(String::as_str));
            }
        }
        Ok(self
            .entities
            .values()
            .filter(|e| nearby.contains(e.id.as_str()))
            .collect())
    }

    pub fn trajectory(&self, id: &str) -> Option<&Trajectory> {
        self.store.get(id)
    }

    pub fn trajectories(&self) -> &TrajectoryStore {
        &self.store
    }

    /// Dead-reckoning forecast for one entity, if it has enough history.
    pub fn predict(&self, id: &str, horizon_secs: f64) -> Option<Prediction> {
        self.store.get(id)?.predict(horizon_secs)
    }

    /// Maneuvers at the configured heading-change threshold.
    pub fn maneuvers(&self, id: &str) -> Vec<Maneuver> {
        self.store
            .get(id)
            .map(|t| t.detect_maneuvers(self.config.maneuver_threshold_deg))
            .unwrap_or_default()
    }

    /// Every trajectory, stamped with the registry clock.
    pub fn export_trajectories(&self) -> FeatureCollection {
        self.store.export_all(self.clock.now_ms())
    }

    pub fn statistics(&self) -> RegistryStatistics {
        let mut by_classification = BTreeMap::new();
        let mut active_count = 0;
        for entity in self.entities.values() {
            *by_classification.entry(entity.classification).or_insert(0) += 1;
            if entity.is_active() {
                active_count += 1;
            }
        }
        RegistryStatistics {
            entity_count: self.entities.len(),
            active_count,
            inactive_count: self.entities.len() - active_count,
            by_classification,
            spatial: self.spatial_stats(),
            trajectories: self.store.statistics(),
        }
    }

    pub fn spatial_stats(&self) -> SpatialIndexStats {
        let total_cells = self.spatial_index.len();
        let total_entries: usize = self.spatial_index.values().map(HashSet::len).sum();
        SpatialIndexStats {
            total_cells,
            total_entries,
            avg_per_cell: if total_cells > 0 {
                total_entries as f64 / total_cells as f64
            } else {
                0.0
            },
        }
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    /// Validates and merges an update without notifying anyone.
    /// Returns the resulting entity and whether it was created.
    fn apply(&mut self, update: EntityUpdate) -> Result<(TrackedEntity, bool), TrackingError> {
        update.validate()?;
        let update = update.normalized();
        let now = self.clock.now_ms();

        let Some(mut entity) = self.entities.get(&update.id).cloned() else {
            let entity = self.create(update, now)?;
            return Ok((entity, true));
        };

        let previous = entity.position;
        if let Some(classification) = update.classification {
            entity.classification = classification;
        }
        if let Some(position) = update.position {
            entity.position = position;
        }
        if let Some(speed) = update.speed {
            entity.speed = speed;
        }
        if let Some(altitude) = update.altitude {
            entity.altitude = altitude;
        }
        if let Some(heading) = update.heading {
            entity.heading = heading;
        }
        if let Some(status) = update.status {
            entity.status = status;
        }
        if let Some(confidence) = update.confidence {
            entity.confidence = confidence;
        }
        if let Some(region) = &update.region {
            entity.region = region.clone();
        }
        if let Some(velocity) = update.velocity {
            entity.velocity = Some(velocity);
        }
        for (key, value) in &update.metadata {
            entity.metadata.insert(key.clone(), value.clone());
        }
        entity.last_seen = entity.last_seen.max(update.timestamp_ms.unwrap_or(now));

        if entity.position != previous {
            self.record_motion(&mut entity, &update, now);
            self.reindex(&entity.id, previous, entity.position);
        }

        self.entities.insert(entity.id.clone(), entity.clone());
        Ok((entity, false))
    }

    fn create(&mut self, update: EntityUpdate, now: i64) -> Result<TrackedEntity, TrackingError> {
        let position = update.position.ok_or_else(|| {
            TrackingError::malformed(format!("{}: new entity without position", update.id))
        })?;
        let cell = self.position_to_cell(position)?;

        let mut entity = TrackedEntity {
            id: update.id.clone(),
            classification: update.classification.unwrap_or_default(),
            position,
            speed: update.speed.unwrap_or(0.0),
            altitude: update.altitude.unwrap_or(0.0),
            heading: update.heading.unwrap_or(0.0),
            status: update.status.unwrap_or_default(),
            confidence: update.confidence.unwrap_or(self.config.default_confidence),
            last_seen: update.timestamp_ms.unwrap_or(now),
            region: update.region.clone().unwrap_or_else(|| UNSPECIFIED_REGION.to_string()),
            velocity: update.velocity,
            metadata: update.metadata.clone(),
        };
        self.record_motion(&mut entity, &update, now);

        self.spatial_index_insert(cell, &entity.id);
        self.entities.insert(entity.id.clone(), entity.clone());
        debug!(entity = %entity.id, classification = %entity.classification, "entity created");
        Ok(entity)
    }

    /// Records the entity's position and fills heading / speed from the
    /// trajectory unless the update reported them.
    fn record_motion(&mut self, entity: &mut TrackedEntity, update: &EntityUpdate, now: i64) {
        let metadata = SampleMetadata {
            timestamp_ms: update.timestamp_ms,
            altitude: Some(entity.altitude),
            speed: update.speed,
            heading: update.heading,
        };
        let trajectory = self.store.record(&entity.id, entity.position, metadata, now);

        if update.heading.is_none() {
            if let Some(heading) = trajectory.heading() {
                entity.heading = heading;
            }
        }
        if update.speed.is_none() {
            if let Some(speed) = trajectory.speed() {
                entity.speed = speed;
            }
        }
    }

    /// Removes entity, trajectory and index entry without notifying.
    fn detach(&mut self, id: &str) -> Option<TrackedEntity> {
        let entity = self.entities.shift_remove(id)?;
        self.store.remove(id);
        if let Ok(cell) = self.position_to_cell(entity.position) {
            self.spatial_index_remove(cell, id);
        }
        Some(entity)
    }

    fn emit(&mut self, event: &ChangeEvent) {
        for (id, subscriber) in self.subscribers.iter_mut() {
            if catch_unwind(AssertUnwindSafe(|| subscriber(event))).is_err() {
                warn!(subscription = id.0, kind = ?event.kind(), "subscriber panicked; skipped");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Spatial index
    // ------------------------------------------------------------------------

    fn position_to_cell(&self, position: Position) -> Result<CellIndex, TrackingError> {
        let latlng = LatLng::new(position.lat, position.lon)
            .map_err(|e| TrackingError::malformed(format!("invalid coordinates: {e}")))?;
        Ok(latlng.to_cell(self.resolution))
    }

    fn spatial_index_insert(&mut self, cell: CellIndex, id: &str) {
        self.spatial_index.entry(cell).or_default().insert(id.to_string());
    }

    fn spatial_index_remove(&mut self, cell: CellIndex, id: &str) {
        if let Some(ids) = self.spatial_index.get_mut(&cell) {
            ids.remove(id);
            if ids.is_empty() {
                self.spatial_index.remove(&cell);
            }
        }
    }

    fn reindex(&mut self, id: &str, from: Position, to: Position) {
        let (Ok(old_cell), Ok(new_cell)) = (self.position_to_cell(from), self.position_to_cell(to)) else {
            return;
        };
        if old_cell != new_cell {
            self.spatial_index_remove(old_cell, id);
            self.spatial_index_insert(new_cell, id);
        }
    }
}

impl std::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("entities", &self.entities.len())
            .field("trajectories", &self.store.len())
            .field("subscribers", &self.subscribers.len())
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChangeKind;
    use crate::geomath::Velocity;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;
    use skytrack_env::{Clock, ManualClock};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    fn registry() -> (EntityRegistry, ManualClock) {
        let clock = ManualClock::at_epoch();
        let registry = EntityRegistry::new(TrackingConfig::default(), Arc::new(clock.clone())).unwrap();
        (registry, clock)
    }

    fn record(id: &str, lat: f64, lon: f64) -> SnapshotRecord {
        SnapshotRecord::new(id, Position::new(lat, lon))
    }

    fn recorder(registry: &mut EntityRegistry) -> Rc<RefCell<Vec<ChangeEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        registry.subscribe(move |e| sink.borrow_mut().push(e.clone()));
        events
    }

    #[test]
    fn test_upsert_creates_with_defaults() {
        let (mut reg, clock) = registry();
        let entity = reg
            .upsert(EntityUpdate::new("t1").position(Position::new(49.0, 31.5)))
            .unwrap();

        assert_eq!(entity.classification, Classification::Unknown);
        assert_eq!(entity.status, EntityStatus::Active);
        assert_eq!(entity.confidence, 0.8);
        assert_eq!(entity.region, UNSPECIFIED_REGION);
        assert_eq!(entity.last_seen, clock.now_ms());
        assert_eq!(reg.trajectory("t1").unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_new_entity_requires_position() {
        let (mut reg, _) = registry();
        let result = reg.upsert(EntityUpdate::new("ghost").speed(100.0));
        assert!(matches!(result, Err(TrackingError::MalformedRecord { .. })));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_partial_update_preserves_unspecified_fields() {
        let (mut reg, _) = registry();
        reg.upsert(
            EntityUpdate::new("t1")
                .position(Position::new(49.0, 31.5))
                .classification(Classification::Drone)
                .altitude(800.0)
                .region("Kyiv Oblast")
                .meta("icon", "drone"),
        )
        .unwrap();

        let entity = reg.upsert(EntityUpdate::new("t1").confidence(0.95).meta("color", "red")).unwrap();

        assert_eq!(entity.classification, Classification::Drone);
        assert_eq!(entity.altitude, 800.0);
        assert_eq!(entity.region, "Kyiv Oblast");
        assert_eq!(entity.confidence, 0.95);
        assert_eq!(entity.metadata.get("icon").unwrap(), "drone");
        assert_eq!(entity.metadata.get("color").unwrap(), "red");
        // Position unchanged, so no new sample
        assert_eq!(reg.trajectory("t1").unwrap().len(), 1);
    }

    #[test]
    fn test_position_change_derives_kinematics() {
        let (mut reg, clock) = registry();
        reg.upsert(EntityUpdate::new("t1").position(Position::new(49.0, 31.5))).unwrap();
        clock.advance(Duration::from_secs(1));
        let entity = reg.upsert(EntityUpdate::new("t1").position(Position::new(49.1, 31.5))).unwrap();

        assert!(entity.speed > 0.0);
        assert_abs_diff_eq!(entity.heading, 0.0, epsilon = 1e-9);

        let prediction = reg.predict("t1", 60.0).unwrap();
        assert!(prediction.position.lat > 49.1);
        assert_abs_diff_eq!(prediction.position.lon, 31.5, epsilon = 1e-9);
        assert_eq!(prediction.confidence, 0.3);
    }

    #[test]
    fn test_explicit_heading_and_speed_win_over_derived() {
        let (mut reg, clock) = registry();
        reg.upsert(EntityUpdate::new("t1").position(Position::new(49.0, 31.5))).unwrap();
        clock.advance(Duration::from_secs(1));
        let entity = reg
            .upsert(
                EntityUpdate::new("t1")
                    .position(Position::new(49.1, 31.5))
                    .heading(45.0)
                    .speed(180.0),
            )
            .unwrap();
        assert_eq!(entity.heading, 45.0);
        assert_eq!(entity.speed, 180.0);
    }

    #[test]
    fn test_remove_emits_only_when_present() {
        let (mut reg, _) = registry();
        reg.upsert_record(record("t1", 49.0, 31.5)).unwrap();
        let events = recorder(&mut reg);

        assert!(reg.remove("t1"));
        assert!(!reg.remove("t1"));
        assert!(reg.trajectory("t1").is_none());
        assert_eq!(reg.spatial_stats().total_entries, 0);

        let kinds: Vec<ChangeKind> = events.borrow().iter().map(ChangeEvent::kind).collect();
        assert_eq!(kinds, vec![ChangeKind::Removed]);
    }

    #[test]
    fn test_set_status_unknown_entity() {
        let (mut reg, _) = registry();
        assert_eq!(
            reg.set_status("nope", EntityStatus::Inactive),
            Err(TrackingError::UnknownEntity("nope".to_string()))
        );
    }

    #[test]
    fn test_reconcile_add_update_remove() {
        let (mut reg, clock) = registry();
        reg.reconcile(vec![record("1", 49.0, 31.0), record("2", 49.5, 32.0), record("3", 50.0, 33.0)]);
        clock.advance(Duration::from_secs(5));

        let report = reg.reconcile(vec![
            record("2", 49.6, 32.0),
            record("3", 50.0, 33.1),
            record("4", 48.5, 35.0),
        ]);

        assert_eq!(report.added, vec!["4".to_string()]);
        assert_eq!(report.updated, vec!["2".to_string(), "3".to_string()]);
        assert_eq!(report.removed, vec!["1".to_string()]);
        assert!(report.rejected.is_empty());

        let ids: Vec<&str> = reg.entities().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3", "4"]);
        assert_eq!(reg.get("2").unwrap().position, Position::new(49.6, 32.0));
        assert_eq!(reg.trajectory("2").unwrap().len(), 2);
        assert!(reg.trajectory("1").is_none());
    }

    #[test]
    fn test_reconcile_keeps_inactive_entities() {
        let (mut reg, _) = registry();
        reg.reconcile(vec![record("a", 49.0, 31.0), record("b", 49.5, 32.0)]);
        reg.set_status("a", EntityStatus::Inactive).unwrap();

        let report = reg.reconcile(Vec::new());
        assert_eq!(report.removed, vec!["b".to_string()]);
        assert!(reg.contains("a"));
    }

    #[test]
    fn test_reconcile_partial_failure() {
        let (mut reg, _) = registry();
        reg.reconcile(vec![record("keep", 49.0, 31.0)]);

        let report = reg.reconcile(vec![
            record("good", 49.5, 32.0),
            SnapshotRecord {
                position: Some(Position::new(49.0, 31.0)),
                ..Default::default()
            },
            record("keep", f64::NAN, 31.0),
        ]);

        assert_eq!(report.added, vec!["good".to_string()]);
        assert_eq!(report.rejected.len(), 2);
        assert_eq!(report.rejected[0].index, 1);
        assert_eq!(report.rejected[0].id, None);
        assert_eq!(report.rejected[1].id.as_deref(), Some("keep"));
        // A rejected record with an id still counts as present
        assert!(report.removed.is_empty());
        assert_eq!(reg.get("keep").unwrap().position, Position::new(49.0, 31.0));
    }

    #[test]
    fn test_reconcile_rejects_out_of_range_timestamps() {
        let (mut reg, clock) = registry();

        let report = reg.reconcile(vec![record("a", 49.0, 31.0).with_timestamp(i64::MIN)]);
        assert_eq!(report.rejected.len(), 1);
        assert!(reg.is_empty());

        let report = reg.reconcile(vec![
            record("a", 49.0, 31.0).with_timestamp(clock.now_ms()),
            record("b", 49.5, 32.0).with_timestamp(i64::MAX),
        ]);
        assert_eq!(report.added, vec!["a".to_string()]);
        assert_eq!(report.rejected[0].id.as_deref(), Some("b"));

        let report = reg.reconcile(vec![record("a", 49.1, 31.0).with_timestamp(i64::MAX)]);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(reg.trajectory("a").unwrap().len(), 1);
    }

    #[test]
    fn test_out_of_order_record_keeps_last_seen() {
        let (mut reg, clock) = registry();
        let now = clock.now_ms();
        reg.upsert(
            EntityUpdate::new("t1")
                .position(Position::new(49.0, 31.5))
                .timestamp(now),
        )
        .unwrap();

        let entity = reg
            .upsert(
                EntityUpdate::new("t1")
                    .position(Position::new(49.1, 31.5))
                    .timestamp(now - 60_000),
            )
            .unwrap();
        assert_eq!(entity.last_seen, now);
        assert_eq!(entity.position, Position::new(49.1, 31.5));
    }

    #[test]
    fn test_reconcile_duplicate_ids_reported_once() {
        let (mut reg, _) = registry();
        let events = recorder(&mut reg);
        let report = reg.reconcile(vec![record("d", 49.0, 31.0), record("d", 49.1, 31.0)]);

        assert_eq!(report.added, vec!["d".to_string()]);
        assert!(report.updated.is_empty());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.trajectory("d").unwrap().len(), 2);

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ChangeEvent::Reconciled { added, .. } => {
                assert_eq!(added[0].position, Position::new(49.1, 31.0));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_reconcile_emits_single_event_after_batch() {
        let (mut reg, _) = registry();
        reg.reconcile(vec![record("old", 49.0, 31.0)]);
        let events = recorder(&mut reg);

        reg.reconcile(vec![record("a", 49.0, 31.0), record("b", 49.5, 32.0)]);

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ChangeEvent::Reconciled {
                added,
                updated,
                removed,
                ..
            } => {
                assert_eq!(added.len(), 2);
                assert!(updated.is_empty());
                assert_eq!(removed[0].id, "old");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_tick_uses_trajectory_velocity() {
        let (mut reg, clock) = registry();
        reg.upsert(EntityUpdate::new("t1").position(Position::new(49.0, 31.5))).unwrap();
        clock.advance(Duration::from_secs(1));
        reg.upsert(EntityUpdate::new("t1").position(Position::new(49.01, 31.5))).unwrap();
        let events = recorder(&mut reg);

        assert_eq!(reg.tick(2.0), 1);
        assert_abs_diff_eq!(reg.get("t1").unwrap().position.lat, 49.03, epsilon = 1e-9);
        // No samples recorded, no events
        assert_eq!(reg.trajectory("t1").unwrap().len(), 2);
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn test_tick_prefers_explicit_velocity_and_skips_inactive() {
        let (mut reg, _) = registry();
        reg.upsert(
            EntityUpdate::new("v")
                .position(Position::new(49.0, 31.5))
                .velocity(Velocity::new(0.0, 0.01)),
        )
        .unwrap();
        reg.upsert(
            EntityUpdate::new("idle")
                .position(Position::new(50.0, 31.5))
                .velocity(Velocity::new(0.01, 0.0))
                .status(EntityStatus::Inactive),
        )
        .unwrap();
        reg.upsert(EntityUpdate::new("still").position(Position::new(48.0, 31.5))).unwrap();

        assert_eq!(reg.tick(10.0), 1);
        assert_abs_diff_eq!(reg.get("v").unwrap().position.lon, 31.6, epsilon = 1e-9);
        assert_eq!(reg.get("idle").unwrap().position, Position::new(50.0, 31.5));
        assert_eq!(reg.get("idle").unwrap().status, EntityStatus::Inactive);

        assert_eq!(reg.tick(-1.0), 0);
        assert_eq!(reg.tick(f64::NAN), 0);
    }

    #[test]
    fn test_query_preserves_insertion_order() {
        let (mut reg, _) = registry();
        for (id, label) in [("c", "drone"), ("a", "cruise_missile"), ("b", "shahed")] {
            reg.upsert_record(record(id, 49.0, 31.0).with_classification(label)).unwrap();
        }

        let drones = reg.filter(&EntityFilter::default().classification(Classification::Drone));
        let ids: Vec<&str> = drones.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);

        let all = reg.query(|_| true);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, "c");
    }

    #[test]
    fn test_query_near_uses_spatial_index() {
        let (mut reg, _) = registry();
        reg.upsert_record(record("kyiv", 50.45, 30.52)).unwrap();
        reg.upsert_record(record("lviv", 49.84, 24.03)).unwrap();

        let near = reg.query_near(Position::new(50.45, 30.52), 1).unwrap();
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].id, "kyiv");

        assert!(reg.query_near(Position::new(f64::NAN, 0.0), 1).is_err());
    }

    #[test]
    fn test_moving_entity_is_reindexed() {
        let (mut reg, _) = registry();
        reg.upsert_record(record("t1", 50.45, 30.52)).unwrap();
        reg.upsert_record(record("t1", 49.84, 24.03)).unwrap();

        assert!(reg.query_near(Position::new(50.45, 30.52), 1).unwrap().is_empty());
        assert_eq!(reg.query_near(Position::new(49.84, 24.03), 0).unwrap().len(), 1);
        assert_eq!(reg.spatial_stats().total_entries, 1);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let (mut reg, _) = registry();
        reg.subscribe(|_| panic!("subscriber failure"));
        let events = recorder(&mut reg);

        let entity = reg.upsert_record(record("t1", 49.0, 31.5)).unwrap();
        assert_eq!(entity.id, "t1");
        assert_eq!(events.borrow().len(), 1);
        assert!(reg.contains("t1"));
    }

    #[test]
    fn test_unsubscribe() {
        let (mut reg, _) = registry();
        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        let id = reg.subscribe(move |_| *sink.borrow_mut() += 1);

        reg.upsert_record(record("t1", 49.0, 31.5)).unwrap();
        assert!(reg.unsubscribe(id));
        assert!(!reg.unsubscribe(id));
        reg.upsert_record(record("t2", 49.0, 31.5)).unwrap();

        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_sweep_stale_uses_clock() {
        let (mut reg, clock) = registry();
        reg.upsert_record(record("t1", 49.0, 31.5)).unwrap();
        clock.advance(Duration::from_secs(301));

        assert_eq!(reg.sweep_stale(Duration::from_secs(300)), vec!["t1".to_string()]);
        assert!(reg.sweep_stale(Duration::from_secs(300)).is_empty());
        assert!(reg.contains("t1"));
        assert!(reg.trajectory("t1").is_none());
    }

    #[test]
    fn test_statistics() {
        let (mut reg, _) = registry();
        reg.upsert_record(record("a", 49.0, 31.0).with_classification("uav")).unwrap();
        reg.upsert_record(record("b", 49.0, 31.0).with_classification("uav").with_status("destroyed"))
            .unwrap();
        reg.upsert_record(record("c", 49.0, 31.0).with_classification("kalibr")).unwrap();

        let stats = reg.statistics();
        assert_eq!(stats.entity_count, 3);
        assert_eq!(stats.active_count, 2);
        assert_eq!(stats.inactive_count, 1);
        assert_eq!(stats.by_classification[&Classification::Drone], 2);
        assert_eq!(stats.by_classification[&Classification::CruiseMissile], 1);
        assert_eq!(stats.trajectories.count, 3);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["byClassification"]["drone"], 2);
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let config = TrackingConfig {
            h3_resolution: 42,
            ..Default::default()
        };
        let clock = Arc::new(ManualClock::at_epoch());
        assert!(matches!(
            EntityRegistry::new(config, clock),
            Err(TrackingError::InvalidConfig(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_ids_stay_unique(
            batches in prop::collection::vec(prop::collection::vec(0u8..8, 0..10), 1..8),
        ) {
            let (mut reg, clock) = registry();
            for batch in batches {
                let snapshot: Vec<SnapshotRecord> = batch
                    .iter()
                    .map(|n| record(&format!("id-{n}"), 49.0 + *n as f64 * 0.1, 31.5))
                    .collect();
                let expected: HashSet<String> = batch.iter().map(|n| format!("id-{n}")).collect();

                reg.reconcile(snapshot);
                clock.advance(Duration::from_secs(1));

                let ids: Vec<&str> = reg.entities().map(|e| e.id.as_str()).collect();
                let unique: HashSet<&str> = ids.iter().copied().collect();
                prop_assert_eq!(ids.len(), unique.len());
                prop_assert_eq!(unique.len(), expected.len());
                prop_assert_eq!(reg.spatial_stats().total_entries, reg.len());
            }
        }
    }
}
