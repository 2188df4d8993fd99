//! DelayScheduler: holds each captured event back for its sampled delay.
//!
//! This is the heart of the daemon.  Every payload event goes through
//! [`DelayScheduler::submit`], which:
//!
//! 1. reads the latest [`DelayConfig`](latency_core::DelayConfig) snapshot
//!    (lock-free, never blocks on reconfiguration),
//! 2. samples a delay from the click or movement range,
//! 3. computes the fire time and pushes the event onto a min-heap.
//!
//! A single drain task ([`DrainWorker`]) sleeps until the earliest fire time,
//! then hands each due event to the [`VirtualDevice`] followed by exactly one
//! synchronization marker, and appends a [`LogRecord`] to the [`EventLog`].
//!
//! # Ordering rule
//!
//! Events of the same kind never overtake each other.  If a later motion
//! event samples a shorter delay than the one before it, its fire time is
//! raised to the previous motion event's fire time:
//!
//! ```text
//! arrival   sampled   raw fire   effective fire
//! A  0ms     100ms     100ms      100ms
//! B  5ms      10ms      15ms      100ms   (raised; emitted right after A)
//! ```
//!
//! Equal fire times are broken by submission order.  Different kinds are
//! independent of each other.
//!
//! # Backpressure
//!
//! At most `queue_capacity` events wait at once.  When the queue is full the
//! newest event is dropped and counted; `submit` never blocks the capture
//! thread beyond the enqueue critical section.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use latency_core::domain::sampler::sample_for;
use latency_core::{ConfigStore, EventKind, LogRecord, RawEvent, ScheduledEvent};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

use super::event_log::EventLog;

/// Default upper bound on outstanding scheduled events.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// Error type for virtual device writes.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("device write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("virtual device has been released")]
    Closed,
    #[error("device rejected event: {0}")]
    Rejected(String),
}

/// Error type for the dispatch path.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The queue already holds `capacity` events; the new event was dropped.
    #[error("delay queue full ({capacity} outstanding events), event dropped")]
    QueueFull { capacity: usize },
    /// The scheduler no longer accepts submissions.
    #[error("scheduler is shutting down")]
    ShuttingDown,
    /// The virtual device failed to accept a payload or sync write.
    #[error("emit failed: {0}")]
    Emit(#[from] EmitError),
}

/// The output side: a virtual input device.
///
/// Implementations must make writes visible downstream in call order.  The
/// production implementation writes raw `input_event` records; tests use
/// [`RecordingDevice`](crate::infrastructure::virtual_device::mock::RecordingDevice).
#[cfg_attr(test, mockall::automock)]
pub trait VirtualDevice: Send + Sync {
    /// Writes one payload event.
    fn write_payload(&self, kind: EventKind, code: u16, value: i32) -> Result<(), EmitError>;

    /// Writes the synchronization marker that closes the batch.
    fn write_sync(&self) -> Result<(), EmitError>;

    /// Releases the device.  Called once at shutdown.
    fn release(&self) -> Result<(), EmitError> {
        Ok(())
    }
}

/// Monotonic engine clock.
///
/// Arrival and fire times are stored as offsets from `epoch`.  Backed by
/// [`tokio::time::Instant`] so tests can pause and advance time.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch: Instant,
}

impl Clock {
    /// Starts a clock whose epoch is now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    /// Time elapsed since the epoch.
    pub fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// The instant that lies `offset` after the epoch.
    pub fn instant_at(&self, offset: Duration) -> Instant {
        self.epoch + offset
    }
}

/// Tunables for [`DelayScheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub queue_capacity: usize,
    /// Fixed RNG seed for reproducible runs; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            seed: None,
        }
    }
}

/// Snapshot of the scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Payload events offered to `submit`.
    pub submitted: u64,
    /// Events accepted into the queue.
    pub scheduled: u64,
    /// Events rejected because the queue was full.
    pub dropped: u64,
    /// Structural records from the capture layer that were not delayed.
    pub skipped: u64,
    /// Events written to the device successfully.
    pub emitted: u64,
    /// Events whose payload or sync write failed.
    pub failed: u64,
    /// Events still queued at shutdown that were never emitted.
    pub discarded: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    scheduled: AtomicU64,
    dropped: AtomicU64,
    skipped: AtomicU64,
    emitted: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            scheduled: self.scheduled.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// State guarded by the queue mutex.  Every critical section is O(log n).
struct QueueState {
    heap: BinaryHeap<Reverse<ScheduledEvent>>,
    /// Fire time of the last scheduled event per kind, indexed by `EventKind::index`.
    last_fire: [Duration; 3],
    next_sequence: u64,
    rng: StdRng,
}

/// The dispatch core.  Shared as `Arc<DelayScheduler>` between the capture
/// pump (submit) and the drain task (pop + fire).
pub struct DelayScheduler {
    config: Arc<ConfigStore>,
    clock: Clock,
    capacity: usize,
    state: Mutex<QueueState>,
    wake: Notify,
    accepting: AtomicBool,
    counters: Counters,
}

impl DelayScheduler {
    /// Creates a scheduler reading delays from `config`.
    pub fn new(config: Arc<ConfigStore>, clock: Clock, settings: SchedulerSettings) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let capacity = settings.queue_capacity.max(1);
        Self {
            config,
            clock,
            capacity,
            state: Mutex::new(QueueState {
                heap: BinaryHeap::with_capacity(capacity.min(DEFAULT_QUEUE_CAPACITY)),
                last_fire: [Duration::ZERO; 3],
                next_sequence: 0,
                rng,
            }),
            wake: Notify::new(),
            accepting: AtomicBool::new(true),
            counters: Counters::default(),
        }
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Schedules `event` for emission at `arrival_time + delay`.
    ///
    /// Returns the scheduled entry, including the effective fire time.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::QueueFull`] when `queue_capacity` events are already
    ///   waiting.  The event is dropped and counted.
    /// - [`DispatchError::ShuttingDown`] after [`close`](Self::close).
    pub fn submit(&self, event: RawEvent) -> Result<ScheduledEvent, DispatchError> {
        Counters::bump(&self.counters.submitted, 1);
        if !self.accepting.load(Ordering::Acquire) {
            return Err(DispatchError::ShuttingDown);
        }

        let config = self.config.current();
        let scheduled = {
            let mut state = self.lock_state();
            if state.heap.len() >= self.capacity {
                drop(state);
                Counters::bump(&self.counters.dropped, 1);
                debug!(kind = %event.kind, code = event.code, "delay queue full, dropping event");
                return Err(DispatchError::QueueFull {
                    capacity: self.capacity,
                });
            }

            let sampled_delay = sample_for(&config, event.kind, &mut state.rng);
            let slot = event.kind.index();
            let fire_time = (event.arrival_time + sampled_delay).max(state.last_fire[slot]);
            state.last_fire[slot] = fire_time;

            let sequence = state.next_sequence;
            state.next_sequence += 1;

            let scheduled = ScheduledEvent {
                raw: event,
                sampled_delay,
                fire_time,
                sequence,
            };
            state.heap.push(Reverse(scheduled));
            scheduled
        };

        Counters::bump(&self.counters.scheduled, 1);
        trace!(
            kind = %event.kind,
            code = event.code,
            value = event.value,
            delay_ms = scheduled.delay().as_millis() as u64,
            "event scheduled"
        );
        self.wake.notify_one();
        Ok(scheduled)
    }

    /// Counts a structural record that the capture layer passed through undelayed.
    pub fn record_skipped(&self) {
        Counters::bump(&self.counters.skipped, 1);
    }

    /// Stops accepting submissions and wakes the drain task.
    pub fn close(&self) {
        self.accepting.store(false, Ordering::Release);
        self.wake.notify_one();
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Number of events waiting in the queue.
    pub fn pending(&self) -> usize {
        self.lock_state().heap.len()
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Hands one event to `device`: the payload, then exactly one sync marker.
    ///
    /// The sync marker is only written after a successful payload write.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Emit`] if either write fails.
    pub fn fire(&self, device: &dyn VirtualDevice, event: &ScheduledEvent) -> Result<(), DispatchError> {
        let raw = &event.raw;
        let result = device
            .write_payload(raw.kind, raw.code, raw.value)
            .and_then(|()| device.write_sync());
        match result {
            Ok(()) => {
                Counters::bump(&self.counters.emitted, 1);
                Ok(())
            }
            Err(e) => {
                Counters::bump(&self.counters.failed, 1);
                Err(DispatchError::Emit(e))
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pops the earliest event if its fire time is at or before `limit`.
    fn pop_due(&self, limit: Duration) -> Option<ScheduledEvent> {
        let mut state = self.lock_state();
        match state.heap.peek() {
            Some(Reverse(next)) if next.fire_time <= limit => state.heap.pop().map(|Reverse(e)| e),
            _ => None,
        }
    }

    fn next_fire_time(&self) -> Option<Duration> {
        self.lock_state().heap.peek().map(|Reverse(e)| e.fire_time)
    }

    /// Empties the queue, counting every remaining event as discarded.
    fn discard_all(&self) -> usize {
        let discarded = {
            let mut state = self.lock_state();
            let n = state.heap.len();
            state.heap.clear();
            n
        };
        Counters::bump(&self.counters.discarded, discarded as u64);
        discarded
    }
}

// ── Drain task ────────────────────────────────────────────────────────────────

/// Owns the emission side: a single tokio task that waits for fire times.
///
/// One drain task keeps payload/sync pairs from interleaving and keeps the
/// per-kind order established at submission.
pub struct DrainWorker {
    /// `Some(cutoff)` once shutdown is requested: emit events due at or before
    /// `cutoff`, discard the rest.
    shutdown: watch::Sender<Option<Duration>>,
    task: JoinHandle<EventLog>,
    clock: Clock,
}

impl DrainWorker {
    /// Spawns the drain task on the current tokio runtime.
    pub fn spawn(scheduler: Arc<DelayScheduler>, device: Arc<dyn VirtualDevice>, log: EventLog) -> Self {
        let clock = scheduler.clock();
        let (shutdown, shutdown_rx) = watch::channel(None);
        let task = tokio::spawn(drain_loop(scheduler, device, log, shutdown_rx));
        Self {
            shutdown,
            task,
            clock,
        }
    }

    /// Stops the drain task and returns the event log it accumulated.
    ///
    /// Events due within `grace` from now are still emitted at their fire
    /// time; everything later is discarded.  A zero `grace` discards all
    /// pending events immediately.
    ///
    /// # Errors
    ///
    /// Returns the [`tokio::task::JoinError`] if the drain task panicked.
    pub async fn finish(self, grace: Duration) -> Result<EventLog, tokio::task::JoinError> {
        let cutoff = self.clock.now() + grace;
        // The receiver only disappears if the task already ended.
        let _ = self.shutdown.send(Some(cutoff));
        self.task.await
    }
}

async fn drain_loop(
    scheduler: Arc<DelayScheduler>,
    device: Arc<dyn VirtualDevice>,
    mut log: EventLog,
    mut shutdown: watch::Receiver<Option<Duration>>,
) -> EventLog {
    let clock = scheduler.clock();
    let mut cutoff: Option<Duration> = None;
    let mut shutdown_open = true;

    loop {
        let now = clock.now();
        let limit = cutoff.map_or(now, |c| c.min(now));
        while let Some(event) = scheduler.pop_due(limit) {
            let failed = match scheduler.fire(device.as_ref(), &event) {
                Ok(()) => false,
                Err(e) => {
                    warn!(kind = %event.raw.kind, code = event.raw.code, "dispatch failed: {e}");
                    true
                }
            };
            log.append(LogRecord::from_scheduled(&event, failed));
        }

        let next = scheduler.next_fire_time();
        if let Some(cutoff) = cutoff {
            match next {
                Some(fire_time) if fire_time <= cutoff => {}
                _ => {
                    let discarded = scheduler.discard_all();
                    if discarded > 0 {
                        debug!("discarded {discarded} pending events at shutdown");
                    }
                    break;
                }
            }
        }

        let sleep = async {
            match next {
                Some(fire_time) => time::sleep_until(clock.instant_at(fire_time)).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = sleep => {}
            _ = scheduler.wake.notified() => {}
            changed = shutdown.changed(), if shutdown_open => {
                match changed {
                    Ok(()) => cutoff = *shutdown.borrow_and_update(),
                    Err(_) => {
                        // Owner vanished without a request: stop now.
                        shutdown_open = false;
                        cutoff = Some(clock.now());
                    }
                }
            }
        }
    }

    log
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::virtual_device::mock::{DeviceWrite, RecordingDevice};
    use latency_core::{DelayConfig, DelayRange, Distribution};

    fn config(click: DelayRange, movement: DelayRange) -> DelayConfig {
        DelayConfig::with_defaults(click, movement, Distribution::Uniform)
    }

    fn scheduler_with(cfg: DelayConfig, capacity: usize) -> (Arc<DelayScheduler>, Arc<ConfigStore>) {
        let store = Arc::new(ConfigStore::new(cfg));
        let scheduler = Arc::new(DelayScheduler::new(
            Arc::clone(&store),
            Clock::start(),
            SchedulerSettings {
                queue_capacity: capacity,
                seed: Some(42),
            },
        ));
        (scheduler, store)
    }

    fn motion(arrival_ms: u64, value: i32) -> RawEvent {
        RawEvent::new(EventKind::Motion, 0, value, Duration::from_millis(arrival_ms))
    }

    // ── Submission ────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_submit_computes_fire_time_from_arrival_and_delay() {
        let (scheduler, _) = scheduler_with(config(DelayRange::constant(100), DelayRange::constant(0)), 16);

        let scheduled = scheduler
            .submit(RawEvent::new(EventKind::Key, 30, 1, Duration::from_millis(20)))
            .unwrap();

        assert_eq!(scheduled.sampled_delay, Duration::from_millis(100));
        assert_eq!(scheduled.fire_time, Duration::from_millis(120));
        assert_eq!(scheduler.pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_same_kind_event_is_raised_to_previous_fire_time() {
        // Arrange – A samples 100ms, then config changes so B samples 10ms.
        let (scheduler, store) = scheduler_with(config(DelayRange::constant(0), DelayRange::constant(100)), 16);
        let a = scheduler.submit(motion(0, 1)).unwrap();
        store.publish(config(DelayRange::constant(0), DelayRange::constant(10)));

        // Act
        let b = scheduler.submit(motion(5, 2)).unwrap();

        // Assert
        assert_eq!(a.fire_time, Duration::from_millis(100));
        assert_eq!(b.sampled_delay, Duration::from_millis(10));
        assert_eq!(b.fire_time, Duration::from_millis(100));
        assert!(b > a, "equal fire times are ordered by submission");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ordering_is_not_enforced_across_kinds() {
        let (scheduler, _) = scheduler_with(config(DelayRange::constant(10), DelayRange::constant(100)), 16);

        let m = scheduler.submit(motion(0, 1)).unwrap();
        let k = scheduler
            .submit(RawEvent::new(EventKind::Key, 30, 1, Duration::from_millis(1)))
            .unwrap();

        assert_eq!(m.fire_time, Duration::from_millis(100));
        assert_eq!(k.fire_time, Duration::from_millis(11), "key is not held behind motion");
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_beyond_capacity_drops_exactly_the_overflow() {
        // Arrange
        const N: usize = 8;
        let (scheduler, _) = scheduler_with(config(DelayRange::constant(0), DelayRange::constant(1_000)), N);

        // Act
        let results: Vec<_> = (0..N + 5).map(|i| scheduler.submit(motion(i as u64, 1))).collect();

        // Assert
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let full = results
            .iter()
            .filter(|r| matches!(r, Err(DispatchError::QueueFull { capacity: N })))
            .count();
        assert_eq!(ok, N);
        assert_eq!(full, 5);
        assert!(results[N..].iter().all(|r| r.is_err()), "the newest events are the ones dropped");

        let stats = scheduler.stats();
        assert_eq!(stats.submitted, (N + 5) as u64);
        assert_eq!(stats.scheduled, N as u64);
        assert_eq!(stats.dropped, 5);
        assert_eq!(scheduler.pending(), N);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_after_close_is_rejected() {
        let (scheduler, _) = scheduler_with(DelayConfig::default(), 4);
        scheduler.close();

        let result = scheduler.submit(motion(0, 1));

        assert!(matches!(result, Err(DispatchError::ShuttingDown)));
        assert!(!scheduler.is_accepting());
        assert_eq!(scheduler.pending(), 0);
    }

    // ── Firing ────────────────────────────────────────────────────────────────

    #[test]
    fn test_fire_failure_does_not_write_sync() {
        // Arrange
        let mut device = MockVirtualDevice::new();
        device
            .expect_write_payload()
            .times(1)
            .returning(|_, _, _| Err(EmitError::Rejected("no such code".into())));
        device.expect_write_sync().times(0);

        let store = Arc::new(ConfigStore::default());
        let scheduler = DelayScheduler::new(store, Clock::start(), SchedulerSettings::default());
        let event = scheduler.submit(motion(0, 1)).unwrap();

        // Act
        let result = scheduler.fire(&device, &event);

        // Assert
        assert!(matches!(result, Err(DispatchError::Emit(EmitError::Rejected(_)))));
        assert_eq!(scheduler.stats().failed, 1);
    }

    // ── Drain task ────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_key_event_fires_at_100ms_followed_by_sync_and_log_record() {
        // Arrange
        let (scheduler, _) = scheduler_with(config(DelayRange::constant(100), DelayRange::constant(0)), 16);
        let device = Arc::new(RecordingDevice::new());
        let worker = DrainWorker::spawn(Arc::clone(&scheduler), device.clone(), EventLog::new());
        let epoch = scheduler.clock().epoch();

        // Act
        scheduler
            .submit(RawEvent::new(EventKind::Key, 30, 1, Duration::ZERO))
            .unwrap();
        time::sleep(Duration::from_millis(99)).await;
        assert!(device.writes().is_empty(), "nothing may fire before 100ms");
        time::sleep(Duration::from_millis(51)).await;
        let log = worker.finish(Duration::ZERO).await.unwrap();

        // Assert
        let writes = device.timed_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(
            writes[0].0,
            DeviceWrite::Payload {
                kind: EventKind::Key,
                code: 30,
                value: 1
            }
        );
        assert_eq!(writes[0].1.duration_since(epoch), Duration::from_millis(100));
        assert_eq!(writes[1].0, DeviceWrite::Sync);
        assert_eq!(writes[1].1, writes[0].1, "sync follows immediately");

        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0],
            LogRecord {
                timestamp_ms: 0,
                delay_ms: 100,
                kind: EventKind::Key,
                code: 30,
                value: 1,
                failed: false,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_kind_events_emit_in_arrival_order_despite_shorter_delay() {
        // Arrange
        let (scheduler, store) = scheduler_with(config(DelayRange::constant(0), DelayRange::constant(100)), 16);
        let device = Arc::new(RecordingDevice::new());
        let worker = DrainWorker::spawn(Arc::clone(&scheduler), device.clone(), EventLog::new());

        // Act
        scheduler.submit(motion(0, 1)).unwrap();
        store.publish(config(DelayRange::constant(0), DelayRange::constant(10)));
        scheduler.submit(motion(5, 2)).unwrap();
        time::sleep(Duration::from_millis(200)).await;
        let log = worker.finish(Duration::ZERO).await.unwrap();

        // Assert
        let values: Vec<i32> = device.payloads().iter().map(|p| p.2).collect();
        assert_eq!(values, vec![1, 2]);
        assert_eq!(log.records()[1].delay_ms, 95);
    }

    #[tokio::test(start_paused = true)]
    async fn test_random_stream_keeps_per_kind_order_and_pairs_every_payload_with_sync() {
        // Arrange – overlapping uniform ranges make raw fire times cross often.
        let (scheduler, _) = scheduler_with(config(DelayRange::new(0, 50), DelayRange::new(0, 50)), 1_024);
        let device = Arc::new(RecordingDevice::new());
        let worker = DrainWorker::spawn(Arc::clone(&scheduler), device.clone(), EventLog::new());

        // Act
        for i in 0..300u64 {
            let kind = EventKind::ALL[(i % 3) as usize];
            scheduler
                .submit(RawEvent::new(kind, 0, i as i32, Duration::from_millis(i / 4)))
                .unwrap();
        }
        time::sleep(Duration::from_secs(1)).await;
        let log = worker.finish(Duration::ZERO).await.unwrap();

        // Assert – strict payload, sync, payload, sync, ... alternation
        let writes = device.writes();
        assert_eq!(writes.len(), 600);
        for pair in writes.chunks(2) {
            assert!(matches!(pair[0], DeviceWrite::Payload { .. }));
            assert_eq!(pair[1], DeviceWrite::Sync);
        }

        // Assert – within each kind, values (submission order) never go backwards
        for kind in EventKind::ALL {
            let values: Vec<i32> = device
                .payloads()
                .iter()
                .filter(|p| p.0 == kind)
                .map(|p| p.2)
                .collect();
            assert_eq!(values.len(), 100);
            assert!(values.windows(2).all(|w| w[0] < w[1]), "{kind} events reordered");
        }
        assert_eq!(log.len(), 300);
        assert_eq!(scheduler.stats().emitted, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emit_failure_is_logged_and_draining_continues() {
        // Arrange – first payload write fails, the second succeeds.
        let (scheduler, _) = scheduler_with(config(DelayRange::constant(10), DelayRange::constant(10)), 16);
        let device = Arc::new(RecordingDevice::new());
        device.fail_next_payloads(1);
        let worker = DrainWorker::spawn(Arc::clone(&scheduler), device.clone(), EventLog::new());

        // Act
        scheduler.submit(RawEvent::new(EventKind::Key, 30, 1, Duration::ZERO)).unwrap();
        scheduler.submit(RawEvent::new(EventKind::Key, 30, 0, Duration::from_millis(1))).unwrap();
        time::sleep(Duration::from_millis(50)).await;
        let log = worker.finish(Duration::ZERO).await.unwrap();

        // Assert
        assert_eq!(device.writes(), vec![
            DeviceWrite::Payload { kind: EventKind::Key, code: 30, value: 0 },
            DeviceWrite::Sync,
        ]);
        let records = log.records();
        assert_eq!(records.len(), 2);
        assert!(records[0].failed);
        assert!(!records[1].failed);

        let stats = scheduler.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.emitted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_with_grace_emits_due_events_and_discards_the_rest() {
        // Arrange
        let (scheduler, store) = scheduler_with(config(DelayRange::constant(100), DelayRange::constant(0)), 16);
        let device = Arc::new(RecordingDevice::new());
        let worker = DrainWorker::spawn(Arc::clone(&scheduler), device.clone(), EventLog::new());
        scheduler.submit(RawEvent::new(EventKind::Key, 30, 1, Duration::ZERO)).unwrap();
        store.publish(config(DelayRange::constant(5_000), DelayRange::constant(0)));
        scheduler.submit(RawEvent::new(EventKind::Button, 0x110, 1, Duration::ZERO)).unwrap();

        // Act
        scheduler.close();
        let log = worker.finish(Duration::from_secs(1)).await.unwrap();

        // Assert
        assert_eq!(device.payloads(), vec![(EventKind::Key, 30, 1)]);
        assert_eq!(log.len(), 1);
        let stats = scheduler.stats();
        assert_eq!(stats.emitted, 1);
        assert_eq!(stats.discarded, 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_without_grace_discards_everything_pending() {
        let (scheduler, _) = scheduler_with(config(DelayRange::constant(100), DelayRange::constant(100)), 16);
        let device = Arc::new(RecordingDevice::new());
        let worker = DrainWorker::spawn(Arc::clone(&scheduler), device.clone(), EventLog::new());
        for i in 0..4 {
            scheduler.submit(motion(i, 1)).unwrap();
        }

        let log = worker.finish(Duration::ZERO).await.unwrap();

        assert!(device.writes().is_empty());
        assert!(log.is_empty());
        assert_eq!(scheduler.stats().discarded, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_wakes_for_an_earlier_event_submitted_while_sleeping() {
        // Arrange – a 1s event is waiting when a 10ms event arrives.
        let (scheduler, store) = scheduler_with(config(DelayRange::constant(1_000), DelayRange::constant(0)), 16);
        let device = Arc::new(RecordingDevice::new());
        let worker = DrainWorker::spawn(Arc::clone(&scheduler), device.clone(), EventLog::new());
        scheduler.submit(RawEvent::new(EventKind::Key, 30, 1, Duration::ZERO)).unwrap();
        time::sleep(Duration::from_millis(5)).await;

        // Act
        store.publish(config(DelayRange::constant(0), DelayRange::constant(10)));
        scheduler.submit(motion(5, 7)).unwrap();
        time::sleep(Duration::from_millis(20)).await;

        // Assert
        assert_eq!(device.payloads(), vec![(EventKind::Motion, 0, 7)]);
        worker.finish(Duration::ZERO).await.unwrap();
    }
}
