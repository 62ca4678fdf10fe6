//! The in-memory event log and the driver that runs projections over it.

use crate::checkpoint::{Checkpoint, InMemoryCheckpointStore};
use crate::config::{MemoryStoreConfig, StopSignal};
use crate::recorded::{RecordedEvent, Timestamp};
use crate::report::{PartitionReport, RunReport};
use async_trait::async_trait;
use std::any::Any;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use streamfold::{
    ApplyOutcome, Event, EventStore, IdGenerator, Projection, ProjectionError, ProjectionId,
    ProjectionResult, ProjectionStatus, RandomIds, StreamId, StreamTarget, StreamType,
};
use tracing::{debug, error, info, instrument, warn};

/// The partitions of one fan-out template, keyed by stream.
type Partitions<S, P> = BTreeMap<StreamId, Projection<S, RecordedEvent<P>>>;

type Slots = HashMap<ProjectionId, Box<dyn PartitionSet>>;

/// Type-erased access to a template's partitions.
///
/// Partitions are generic over the projection state, which the store itself
/// is not; status bookkeeping goes through this trait and state access
/// downcasts.
trait PartitionSet: Send {
    fn status(&self, stream_id: StreamId) -> Option<ProjectionStatus>;

    fn restore(&mut self, stream_id: StreamId) -> bool;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<S, P> PartitionSet for Partitions<S, P>
where
    S: Send + 'static,
    P: 'static,
{
    fn status(&self, stream_id: StreamId) -> Option<ProjectionStatus> {
        self.get(&stream_id).map(Projection::status)
    }

    fn restore(&mut self, stream_id: StreamId) -> bool {
        match self.get_mut(&stream_id) {
            Some(partition) if partition.status() == ProjectionStatus::Broken => {
                partition.set_status(ProjectionStatus::Ready);
                true
            }
            _ => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Partitions checked out of the store for the length of a run.
///
/// Dropping the lease puts the partitions back, so they survive a failed or
/// abandoned run.
struct PartitionLease<'a, S, P>
where
    S: Send + 'static,
    P: 'static,
{
    slots: &'a Mutex<Slots>,
    template_id: ProjectionId,
    partitions: Partitions<S, P>,
}

impl<S, P> Drop for PartitionLease<'_, S, P>
where
    S: Send + 'static,
    P: 'static,
{
    fn drop(&mut self) {
        let partitions = std::mem::take(&mut self.partitions);
        let _ = lock(self.slots).insert(self.template_id, Box::new(partitions));
    }
}

fn lock(slots: &Mutex<Slots>) -> MutexGuard<'_, Slots> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counters for one projection's pass over the log.
#[derive(Debug, Default, Clone, Copy)]
struct Progress {
    applied: u64,
    skipped: u64,
    cursor: u64,
    cancelled: bool,
}

/// An append-only, process-local event log that drives projections.
///
/// Every appended event gets the next global sequence number. Running a
/// projection against the store reads the events after the projection's
/// checkpoint cursor, offers the ones its target matches in sequence order
/// and decides the projection's status:
///
/// - an applied event makes it `Ok`
/// - `stall_threshold` unhandled events in a row make it `Stalled`
/// - a failed apply makes it `Broken`, and a broken projection is not run again
///
/// Fan-out projections get one partition per stream, created on first sight
/// of the stream and kept by the store between runs. A failing partition does
/// not stop the others; the run drives them all and then returns the first
/// error.
///
/// Clones share the log, the checkpoints and the partitions.
pub struct InMemoryEventStore<P> {
    log: Arc<RwLock<Vec<RecordedEvent<P>>>>,
    partitions: Arc<Mutex<Slots>>,
    checkpoints: InMemoryCheckpointStore,
    ids: Arc<dyn IdGenerator + Send + Sync>,
    config: MemoryStoreConfig,
    stop: StopSignal,
}

impl<P> InMemoryEventStore<P> {
    /// Creates an empty store with the default configuration.
    pub fn new() -> Self {
        Self {
            log: Arc::new(RwLock::new(Vec::new())),
            partitions: Arc::new(Mutex::new(HashMap::new())),
            checkpoints: InMemoryCheckpointStore::new(),
            ids: Arc::new(RandomIds),
            config: MemoryStoreConfig::default(),
            stop: StopSignal::new(),
        }
    }

    /// Replaces the run configuration.
    #[must_use]
    pub const fn with_config(mut self, config: MemoryStoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `stop` to cancel runs.
    #[must_use]
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Keeps checkpoints in `checkpoints` instead of a private store.
    #[must_use]
    pub fn with_checkpoints(mut self, checkpoints: InMemoryCheckpointStore) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    /// Uses `ids` for the identities of fan-out partitions.
    #[must_use]
    pub fn with_id_generator(mut self, ids: impl IdGenerator + Send + Sync + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    /// The run configuration.
    pub const fn config(&self) -> &MemoryStoreConfig {
        &self.config
    }

    /// The signal that cancels runs.
    pub const fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// The checkpoints of every projection run against this store.
    pub const fn checkpoints(&self) -> &InMemoryCheckpointStore {
        &self.checkpoints
    }

    /// Number of events in the log.
    pub fn len(&self) -> usize {
        self.log().len()
    }

    /// Whether nothing was appended yet.
    pub fn is_empty(&self) -> bool {
        self.log().is_empty()
    }

    /// Status of the partition a fan-out template keeps for `stream_id`.
    ///
    /// `None` while the template has no such partition, or while it is
    /// checked out by a run.
    pub fn partition_status(
        &self,
        template_id: ProjectionId,
        stream_id: StreamId,
    ) -> Option<ProjectionStatus> {
        lock(&self.partitions).get(&template_id)?.status(stream_id)
    }

    /// Returns a broken partition to `Ready` so the next run retries the
    /// event it failed on. Returns whether a broken partition was found.
    pub fn restore_partition(&self, template_id: ProjectionId, stream_id: StreamId) -> bool {
        lock(&self.partitions)
            .get_mut(&template_id)
            .is_some_and(|set| set.restore(stream_id))
    }

    fn log(&self) -> RwLockReadGuard<'_, Vec<RecordedEvent<P>>> {
        self.log.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P: Clone> InMemoryEventStore<P> {
    /// Appends `payload` to the stream `stream_id` of type `stream_type`.
    pub fn append(
        &self,
        stream_type: StreamType,
        stream_id: StreamId,
        payload: P,
    ) -> RecordedEvent<P> {
        let mut log = self.log.write().unwrap_or_else(PoisonError::into_inner);
        let recorded = RecordedEvent {
            sequence: log.len() as u64,
            stream_type,
            stream_id,
            recorded_at: Timestamp::now(),
            payload,
        };
        log.push(recorded.clone());
        drop(log);
        recorded
    }

    /// Up to `limit` events starting at global sequence `cursor`, inclusive.
    pub fn read_from(&self, cursor: u64, limit: usize) -> Vec<RecordedEvent<P>> {
        let start = usize::try_from(cursor).unwrap_or(usize::MAX);
        self.log().iter().skip(start).take(limit).cloned().collect()
    }

    /// Every event `target` matches, in global order.
    pub fn events_for(&self, target: &StreamTarget) -> Vec<RecordedEvent<P>> {
        self.log()
            .iter()
            .filter(|event| target.matches(&event.stream_type, event.stream_id))
            .cloned()
            .collect()
    }

    /// The distinct streams of `stream_type`, in order of first appearance.
    pub fn stream_ids(&self, stream_type: &StreamType) -> Vec<StreamId> {
        self.discover(stream_type, 0).0
    }

    /// Streams of `stream_type` with events at or after `cursor`, and the
    /// cursor after the last event looked at.
    fn discover(&self, stream_type: &StreamType, cursor: u64) -> (Vec<StreamId>, u64) {
        let log = self.log();
        let start = usize::try_from(cursor).unwrap_or(usize::MAX);
        let mut seen = HashSet::new();
        let stream_ids = log
            .iter()
            .skip(start)
            .filter(|event| &event.stream_type == stream_type)
            .filter_map(|event| seen.insert(event.stream_id).then_some(event.stream_id))
            .collect();
        let next = cursor.max(log.len() as u64);
        drop(log);
        (stream_ids, next)
    }

    /// State of the partition a fan-out template keeps for `stream_id`.
    ///
    /// `S` must be the template's state type. `None` while the template has
    /// no such partition, or while it is checked out by a run.
    pub fn partition_state<S>(&self, template_id: ProjectionId, stream_id: StreamId) -> Option<S>
    where
        S: Clone + Send + 'static,
        P: 'static,
    {
        lock(&self.partitions)
            .get(&template_id)?
            .as_any()
            .downcast_ref::<Partitions<S, P>>()?
            .get(&stream_id)
            .map(|partition| partition.state().clone())
    }
}

impl<P> InMemoryEventStore<P>
where
    P: Event + Clone + Send + Sync + 'static,
{
    #[instrument(skip(self, projection), fields(projection_id = %projection.id()))]
    async fn run_single<S: Send>(
        &self,
        projection: &mut Projection<S, RecordedEvent<P>>,
    ) -> ProjectionResult<RunReport> {
        debug!(stream_target = ?projection.target(), "Starting run");
        let target = projection.target().clone();
        let progress = self
            .drive(projection, |event| target.matches(&event.stream_type, event.stream_id))
            .await?;
        info!(
            applied = progress.applied,
            skipped = progress.skipped,
            cursor = progress.cursor,
            cancelled = progress.cancelled,
            "Run finished"
        );

        Ok(RunReport {
            projection_id: projection.id(),
            applied: progress.applied,
            skipped: progress.skipped,
            cursor: progress.cursor,
            status: projection.status(),
            cancelled: progress.cancelled,
            partitions: Vec::new(),
        })
    }

    #[instrument(skip(self, template), fields(template_id = %template.id()))]
    async fn run_partitioned<S>(
        &self,
        template: &mut Projection<S, RecordedEvent<P>>,
    ) -> ProjectionResult<RunReport>
    where
        S: Clone + Send + 'static,
    {
        let template_id = template.id();
        let stream_type = template.stream_type().cloned().ok_or_else(|| {
            ProjectionError::Internal(format!(
                "fan-out projection {template_id} has no stream type"
            ))
        })?;
        let mut lease = self.lease::<S>(template_id)?;

        let mut discovery = self.checkpoints.load(template_id).unwrap_or_default();
        let (stream_ids, cursor) = self.discover(&stream_type, discovery.cursor);
        for stream_id in stream_ids {
            if let Entry::Vacant(slot) = lease.partitions.entry(stream_id) {
                let partition = template.partition_for(stream_id, &*self.ids)?;
                debug!(%stream_id, partition_id = %partition.id(), "Created partition");
                let _ = slot.insert(partition);
            }
        }
        discovery.cursor = cursor;
        self.checkpoints.save(template_id, discovery);

        let mut report = RunReport {
            projection_id: template_id,
            applied: 0,
            skipped: 0,
            cursor,
            status: template.status(),
            cancelled: false,
            partitions: Vec::with_capacity(lease.partitions.len()),
        };

        let mut failure = None;
        for (stream_id, partition) in &mut lease.partitions {
            if report.cancelled {
                break;
            }
            if partition.status() == ProjectionStatus::Broken {
                warn!(%stream_id, partition_id = %partition.id(), "Skipping broken partition");
                let idle = partition_report(*stream_id, partition, Progress::default());
                report.partitions.push(idle);
                continue;
            }

            let driven = self
                .drive(partition, |event| {
                    event.stream_type == stream_type && event.stream_id == *stream_id
                })
                .await;
            match driven {
                Ok(progress) => {
                    report.applied += progress.applied;
                    report.skipped += progress.skipped;
                    report.cancelled = progress.cancelled;
                    report.partitions.push(partition_report(*stream_id, partition, progress));
                }
                // The other partitions still run; the first failure is returned.
                Err(err) => {
                    let _ = failure.get_or_insert(err);
                }
            }
        }

        if report.applied > 0 {
            template.set_status(ProjectionStatus::Ok);
        }
        if let Some(err) = failure {
            return Err(err);
        }
        report.status = template.status();
        info!(
            partitions = report.partitions.len(),
            applied = report.applied,
            skipped = report.skipped,
            cancelled = report.cancelled,
            "Run finished"
        );
        Ok(report)
    }

    /// Feeds one projection every event `accepts` after its checkpoint.
    async fn drive<S, F>(
        &self,
        projection: &mut Projection<S, RecordedEvent<P>>,
        accepts: F,
    ) -> ProjectionResult<Progress>
    where
        S: Send,
        F: Fn(&RecordedEvent<P>) -> bool + Send,
    {
        let id = projection.id();
        let mut checkpoint = self.checkpoints.load(id).unwrap_or_default();
        let mut progress = Progress::default();

        'run: loop {
            let batch = self.read_from(checkpoint.cursor, self.config.batch_size);
            if batch.is_empty() {
                break;
            }

            for event in &batch {
                if self.stop.is_stopped() {
                    info!(projection_id = %id, cursor = checkpoint.cursor, "Run cancelled");
                    progress.cancelled = true;
                    break 'run;
                }
                if accepts(event) {
                    if let Err(err) = self.step(projection, event, &mut checkpoint, &mut progress) {
                        self.checkpoints.save(id, checkpoint);
                        return Err(err);
                    }
                }
                checkpoint.cursor = event.sequence + 1;
            }

            self.checkpoints.save(id, checkpoint);
            tokio::task::yield_now().await;
        }

        self.checkpoints.save(id, checkpoint);
        progress.cursor = checkpoint.cursor;
        Ok(progress)
    }

    /// Applies one event and moves the projection's status accordingly.
    fn step<S>(
        &self,
        projection: &mut Projection<S, RecordedEvent<P>>,
        event: &RecordedEvent<P>,
        checkpoint: &mut Checkpoint,
        progress: &mut Progress,
    ) -> ProjectionResult<()> {
        match projection.apply(event) {
            Ok(ApplyOutcome::Applied { position }) => {
                progress.applied += 1;
                checkpoint.position = position;
                checkpoint.skip_streak = 0;
                if projection.status() != ProjectionStatus::Ok {
                    debug!(
                        projection_id = %projection.id(),
                        from = %projection.status(),
                        "Projection is ok"
                    );
                    projection.set_status(ProjectionStatus::Ok);
                }
            }
            Ok(ApplyOutcome::Skipped { event_type }) => {
                progress.skipped += 1;
                checkpoint.skip_streak += 1;
                let threshold = self.config.stall_threshold;
                if threshold > 0
                    && checkpoint.skip_streak >= threshold
                    && projection.status() != ProjectionStatus::Stalled
                {
                    warn!(
                        projection_id = %projection.id(),
                        skip_streak = checkpoint.skip_streak,
                        %event_type,
                        "Projection stalled"
                    );
                    projection.set_status(ProjectionStatus::Stalled);
                }
            }
            Err(err) => {
                error!(
                    projection_id = %projection.id(),
                    sequence = event.sequence,
                    error = %err,
                    "Projection broken"
                );
                projection.set_status(ProjectionStatus::Broken);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Checks out the partitions of `template_id`, creating an empty set on
    /// first use.
    fn lease<S>(&self, template_id: ProjectionId) -> ProjectionResult<PartitionLease<'_, S, P>>
    where
        S: Send + 'static,
    {
        let existing = lock(&self.partitions).remove(&template_id);
        let partitions = match existing {
            None => Partitions::new(),
            Some(set) if set.as_any().is::<Partitions<S, P>>() => set
                .into_any()
                .downcast::<Partitions<S, P>>()
                .map(|partitions| *partitions)
                .unwrap_or_default(),
            Some(set) => {
                let _ = lock(&self.partitions).insert(template_id, set);
                return Err(ProjectionError::Internal(format!(
                    "partitions of {template_id} were built for a different state type"
                )));
            }
        };

        Ok(PartitionLease {
            slots: &self.partitions,
            template_id,
            partitions,
        })
    }
}

const fn partition_report<S, E>(
    stream_id: StreamId,
    partition: &Projection<S, E>,
    progress: Progress,
) -> PartitionReport {
    PartitionReport {
        stream_id,
        projection_id: partition.id(),
        applied: progress.applied,
        skipped: progress.skipped,
        position: partition.position(),
        status: partition.status(),
    }
}

#[async_trait]
impl<S, P> EventStore<S, RecordedEvent<P>> for InMemoryEventStore<P>
where
    S: Clone + Send + 'static,
    P: Event + Clone + Send + Sync + 'static,
{
    type Output = ProjectionResult<RunReport>;

    async fn exec(&self, projection: &mut Projection<S, RecordedEvent<P>>) -> Self::Output {
        if projection.status() == ProjectionStatus::Broken {
            error!(projection_id = %projection.id(), "Refusing to run a broken projection");
            return Err(ProjectionError::Broken(projection.id()));
        }

        if projection.is_fan_out() {
            self.run_partitioned(projection).await
        } else {
            self.run_single(projection).await
        }
    }
}

impl<P> Clone for InMemoryEventStore<P> {
    fn clone(&self) -> Self {
        Self {
            log: Arc::clone(&self.log),
            partitions: Arc::clone(&self.partitions),
            checkpoints: self.checkpoints.clone(),
            ids: Arc::clone(&self.ids),
            config: self.config.clone(),
            stop: self.stop.clone(),
        }
    }
}

impl<P> Default for InMemoryEventStore<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for InMemoryEventStore<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryEventStore")
            .field("events", &self.len())
            .field("config", &self.config)
            .field("stopped", &self.stop.is_stopped())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamfold::{EventType, JsonEvent, SequentialIds};

    fn stream_type(name: &str) -> StreamType {
        StreamType::try_new(name).unwrap()
    }

    fn event(name: &str) -> JsonEvent {
        JsonEvent::new(EventType::try_new(name).unwrap(), serde_json::Value::Null)
    }

    #[test]
    fn sequences_count_up_from_zero() {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::random();

        let first = store.append(stream_type("account"), stream_id, event("Opened"));
        let second = store.append(stream_type("account"), stream_id, event("Deposited"));

        assert_eq!((first.sequence, second.sequence), (0, 1));
        assert_eq!(store.len(), 2);
        assert!(!store.is_empty());
    }

    #[test]
    fn read_from_returns_a_bounded_window() {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::random();
        for name in ["a", "b", "c", "d"] {
            let _ = store.append(stream_type("letters"), stream_id, event(name));
        }

        let window = store.read_from(1, 2);

        let types: Vec<&str> = window.iter().map(Event::event_type).collect();
        assert_eq!(types, vec!["b", "c"]);
        assert!(store.read_from(10, 5).is_empty());
    }

    #[test]
    fn stream_ids_are_listed_once_in_order_of_appearance() {
        let store = InMemoryEventStore::new();
        let (a, b) = (StreamId::random(), StreamId::random());
        let _ = store.append(stream_type("order"), a, event("Placed"));
        let _ = store.append(stream_type("invoice"), StreamId::random(), event("Issued"));
        let _ = store.append(stream_type("order"), b, event("Placed"));
        let _ = store.append(stream_type("order"), a, event("Shipped"));

        assert_eq!(store.stream_ids(&stream_type("order")), vec![a, b]);
        assert_eq!(store.events_for(&StreamTarget::StreamInstance(a)).len(), 2);
    }

    #[test]
    fn leases_reject_a_different_state_type() {
        let store: InMemoryEventStore<JsonEvent> =
            InMemoryEventStore::new().with_id_generator(SequentialIds::starting_at(1));
        let template_id = store.ids.generate();

        drop(store.lease::<u64>(template_id).unwrap());

        assert!(matches!(
            store.lease::<String>(template_id),
            Err(ProjectionError::Internal(_))
        ));
        assert!(store.lease::<u64>(template_id).is_ok());
    }

    #[test]
    fn restore_only_touches_broken_partitions() {
        let store: InMemoryEventStore<JsonEvent> = InMemoryEventStore::new();
        let template_id = store.ids.generate();
        let stream_id = StreamId::random();
        let template =
            Projection::<u64, RecordedEvent<JsonEvent>>::from_each_key_of(stream_type("order"));

        {
            let mut lease = store.lease::<u64>(template_id).unwrap();
            let mut partition = template.partition_for(stream_id, &RandomIds).unwrap();
            partition.set_status(ProjectionStatus::Broken);
            let _ = lease.partitions.insert(stream_id, partition);
        }

        assert_eq!(
            store.partition_status(template_id, stream_id),
            Some(ProjectionStatus::Broken)
        );
        assert!(store.restore_partition(template_id, stream_id));
        assert!(!store.restore_partition(template_id, stream_id));
        assert_eq!(
            store.partition_status(template_id, stream_id),
            Some(ProjectionStatus::Ready)
        );
        assert_eq!(store.partition_state::<u64>(template_id, stream_id), Some(0));
    }
}
