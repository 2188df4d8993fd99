//! Emits raw `input_event` records to any byte sink.
//!
//! On Linux the sink is normally a uinput descriptor that has already been
//! configured as a virtual mouse/keyboard, but a FIFO or plain file works
//! just as well and produces a capture that
//! [`DeviceFileSource`](crate::infrastructure::input_capture::device_file::DeviceFileSource)
//! can replay.
//!
//! Every write is one complete 24-byte record written with `write_all`, so a
//! record is never split across calls.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use latency_core::protocol::encode_record;
use latency_core::{EventKind, InputRecord};
use tracing::debug;

use crate::application::schedule_events::{EmitError, VirtualDevice};

/// [`VirtualDevice`] that serializes events into a [`Write`] sink.
pub struct RecordWriterDevice<W: Write + Send = File> {
    sink: Mutex<Option<W>>,
}

impl RecordWriterDevice<File> {
    /// Opens `path` for appending, creating it if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from opening the file.
    pub fn open(path: &Path) -> Result<Self, EmitError> {
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        debug!("virtual device output opened at {}", path.display());
        Ok(Self::new(file))
    }
}

impl<W: Write + Send> RecordWriterDevice<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink: Mutex::new(Some(sink)),
        }
    }

    /// Stops writing and hands the sink back.  Returns `None` if already released.
    pub fn into_inner(self) -> Option<W> {
        self.sink.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, Option<W>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_record(&self, mut record: InputRecord) -> Result<(), EmitError> {
        record.time = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let mut guard = self.lock();
        let sink = guard.as_mut().ok_or(EmitError::Closed)?;
        sink.write_all(&encode_record(&record))?;
        Ok(())
    }
}

impl<W: Write + Send> VirtualDevice for RecordWriterDevice<W> {
    fn write_payload(&self, kind: EventKind, code: u16, value: i32) -> Result<(), EmitError> {
        self.write_record(InputRecord::new(kind.ev_type(), code, value))
    }

    fn write_sync(&self) -> Result<(), EmitError> {
        self.write_record(InputRecord::sync_report())?;
        if let Some(sink) = self.lock().as_mut() {
            sink.flush()?;
        }
        Ok(())
    }

    fn release(&self) -> Result<(), EmitError> {
        if let Some(mut sink) = self.lock().take() {
            sink.flush()?;
        }
        Ok(())
    }
}
