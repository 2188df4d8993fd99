//! Input capture infrastructure.
//!
//! A capture source reads raw kernel input records from the physical device
//! on a dedicated thread and places them into an `mpsc` channel.  The engine's
//! capture pump drains that channel, stamps each record with an arrival time
//! and submits payload events to the scheduler.
//!
//! When the source loses its device (unplugged, read error, end of file) it
//! drops its sender.  The closed channel is how the engine learns that
//! capture has ended.
//!
//! # Testability
//!
//! The `InputSource` trait allows unit tests to inject synthetic records
//! without an actual `/dev/input` device.

use std::path::PathBuf;
use std::sync::mpsc;

use latency_core::InputRecord;

pub mod device_file;
pub mod mock;

/// Error type for input capture operations.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to open input device {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("capture source has already been started")]
    AlreadyStarted,
}

/// Trait abstracting input record production.
///
/// The production implementation reads `/dev/input/eventN`; tests use
/// [`mock::MockInputSource`].
pub trait InputSource: Send {
    /// Starts the source and returns a receiver for captured records.
    fn start(&self) -> Result<mpsc::Receiver<InputRecord>, CaptureError>;
    /// Stops the source.  The receiver observes a closed channel afterwards.
    fn stop(&self);
}
