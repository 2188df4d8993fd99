//! DelayEngine: wires capture, scheduling, reconfiguration and shutdown.
//!
//! # Lifecycle
//!
//! ```text
//! start()
//!  ├─ ConfigStore            (initial config, normalized)
//!  ├─ DelayScheduler         (bounded queue, per-kind ordering)
//!  ├─ DrainWorker            (tokio task: sleep → payload → sync → log)
//!  └─ capture pump           (std thread: recv record → stamp → submit)
//!
//! running: reconfigure(line) at any time, from any thread
//!
//! shutdown(deadline)
//!  ├─ stop accepting, stop capture
//!  ├─ drain or discard pending events
//!  ├─ release the virtual device
//!  └─ flush the event log
//! ```
//!
//! Capture loss is not fatal by itself: the pump signals it and the caller
//! decides (usually by calling [`DelayEngine::shutdown`]).

use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use latency_core::{ConfigStore, DelayConfig, InputRecord, LogRecord, RawEvent, ReconfigError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::event_log::EventLog;
use super::reconfigure::ReconfigurationChannel;
use super::schedule_events::{
    Clock, DelayScheduler, DispatchError, DispatchStats, DrainWorker, SchedulerSettings, VirtualDevice,
    DEFAULT_QUEUE_CAPACITY,
};
use crate::infrastructure::input_capture::{CaptureError, InputSource};

/// What happens to events still queued when shutdown begins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPolicy {
    /// Emit events whose fire time falls within the shutdown deadline.
    #[default]
    Drain,
    /// Drop every pending event immediately.
    Discard,
}

/// Engine tunables that are not part of the delay configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub queue_capacity: usize,
    pub shutdown_policy: ShutdownPolicy,
    /// Where to append the event log at shutdown.  `None` keeps it in memory only.
    pub log_path: Option<PathBuf>,
    /// Fixed RNG seed for reproducible delays.
    pub seed: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            shutdown_policy: ShutdownPolicy::Drain,
            log_path: None,
            seed: None,
        }
    }
}

/// Outcome of [`DelayEngine::shutdown`].
#[derive(Debug)]
pub struct ShutdownReport {
    /// Every logged event in emission order.
    pub records: Vec<LogRecord>,
    pub stats: DispatchStats,
    /// Set when the log was written to disk.
    pub log_path: Option<PathBuf>,
}

/// Error type for engine lifecycle operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("input capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("input capture disconnected")]
    CaptureDisconnected,
    #[error("failed to spawn capture pump: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("drain task failed: {0}")]
    DrainTask(String),
    #[error("failed to write event log to {path}: {source}")]
    LogFlush {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The running delay-injection pipeline.
pub struct DelayEngine {
    scheduler: Arc<DelayScheduler>,
    reconfig: ReconfigurationChannel,
    device: Arc<dyn VirtualDevice>,
    capture: Box<dyn InputSource>,
    drain: DrainWorker,
    pump: Option<JoinHandle<()>>,
    disconnected: Option<oneshot::Receiver<()>>,
    settings: EngineSettings,
}

impl DelayEngine {
    /// Starts capturing from `capture` and emitting to `device`.
    ///
    /// Must be called from within a tokio runtime; the drain task is spawned
    /// on it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Capture`] if the source cannot start and
    /// [`EngineError::Spawn`] if the pump thread cannot be created.
    pub fn start(
        settings: EngineSettings,
        config: DelayConfig,
        capture: Box<dyn InputSource>,
        device: Arc<dyn VirtualDevice>,
    ) -> Result<Self, EngineError> {
        let store = Arc::new(ConfigStore::new(config));
        let scheduler = Arc::new(DelayScheduler::new(
            Arc::clone(&store),
            Clock::start(),
            SchedulerSettings {
                queue_capacity: settings.queue_capacity,
                seed: settings.seed,
            },
        ));

        let records = capture.start()?;
        let drain = DrainWorker::spawn(Arc::clone(&scheduler), Arc::clone(&device), EventLog::new());

        let (disconnect_tx, disconnect_rx) = oneshot::channel();
        let pump = spawn_capture_pump(records, Arc::clone(&scheduler), Handle::current(), disconnect_tx)
            .map_err(EngineError::Spawn)?;

        info!("delay engine started: {}", store.current());
        Ok(Self {
            scheduler,
            reconfig: ReconfigurationChannel::new(store),
            device,
            capture,
            drain,
            pump: Some(pump),
            disconnected: Some(disconnect_rx),
            settings,
        })
    }

    /// Applies one reconfiguration message.  See [`ReconfigurationChannel::apply`].
    pub fn reconfigure(&self, message: &str) -> Result<DelayConfig, ReconfigError> {
        self.reconfig.apply(message)
    }

    /// A handle that transports can use to deliver reconfiguration messages.
    pub fn reconfiguration_channel(&self) -> ReconfigurationChannel {
        self.reconfig.clone()
    }

    pub fn current_config(&self) -> DelayConfig {
        self.reconfig.current()
    }

    pub fn stats(&self) -> DispatchStats {
        self.scheduler.stats()
    }

    pub fn pending(&self) -> usize {
        self.scheduler.pending()
    }

    /// Resolves once the capture source has gone away.
    ///
    /// Always returns [`EngineError::CaptureDisconnected`].  Safe to use in
    /// `select!`: dropping the future does not lose the signal.
    pub async fn wait_for_disconnect(&mut self) -> EngineError {
        if let Some(rx) = self.disconnected.as_mut() {
            // A dropped sender means the pump is gone too.
            let _ = rx.await;
            self.disconnected = None;
        }
        EngineError::CaptureDisconnected
    }

    /// Stops the engine.
    ///
    /// Under [`ShutdownPolicy::Drain`], events due within `deadline` are still
    /// emitted at their fire time and later ones are discarded.  Under
    /// [`ShutdownPolicy::Discard`] nothing more is emitted.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DrainTask`] if the drain task panicked and
    /// [`EngineError::LogFlush`] if the log could not be written.
    pub async fn shutdown(mut self, deadline: Duration) -> Result<ShutdownReport, EngineError> {
        self.scheduler.close();
        self.capture.stop();

        let grace = match self.settings.shutdown_policy {
            ShutdownPolicy::Drain => deadline,
            ShutdownPolicy::Discard => Duration::ZERO,
        };
        let mut log = self
            .drain
            .finish(grace)
            .await
            .map_err(|e| EngineError::DrainTask(e.to_string()))?;

        if let Some(pump) = self.pump.take() {
            if pump.is_finished() {
                let _ = pump.join();
            } else {
                // Blocked in a device read; it exits on the next record.
                debug!("capture pump still blocked, detaching");
            }
        }

        if let Err(e) = self.device.release() {
            warn!("failed to release virtual device: {e}");
        }

        let stats = self.scheduler.stats();
        let records = match &self.settings.log_path {
            Some(path) => log.flush_to_path(path).map_err(|source| EngineError::LogFlush {
                path: path.clone(),
                source,
            })?,
            None => log.take(),
        };

        info!(
            emitted = stats.emitted,
            failed = stats.failed,
            dropped = stats.dropped,
            discarded = stats.discarded,
            "delay engine stopped"
        );
        Ok(ShutdownReport {
            records,
            stats,
            log_path: self.settings.log_path.clone(),
        })
    }
}

/// Spawns the thread that moves captured records into the scheduler.
fn spawn_capture_pump(
    records: std_mpsc::Receiver<InputRecord>,
    scheduler: Arc<DelayScheduler>,
    runtime: Handle,
    disconnected: oneshot::Sender<()>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("latency-pump".to_string())
        .spawn(move || {
            // The engine clock reads the runtime's (possibly paused) time.
            let _guard = runtime.enter();
            let clock = scheduler.clock();

            while let Ok(record) = records.recv() {
                let arrival = clock.now();
                let Some(event) = RawEvent::from_record(&record, arrival) else {
                    scheduler.record_skipped();
                    continue;
                };
                match scheduler.submit(event) {
                    Ok(_) | Err(DispatchError::QueueFull { .. }) => {}
                    Err(DispatchError::ShuttingDown) => break,
                    Err(e) => warn!("submit failed: {e}"),
                }
            }

            if scheduler.is_accepting() {
                warn!("input capture stream closed");
            }
            let _ = disconnected.send(());
        })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
