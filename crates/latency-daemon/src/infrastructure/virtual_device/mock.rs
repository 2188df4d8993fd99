//! Mock virtual device for unit testing.
//!
//! Records every successful write together with the (possibly paused) tokio
//! clock reading at the time of the call.

use std::sync::Mutex;

use latency_core::EventKind;
use tokio::time::Instant;

use crate::application::schedule_events::{EmitError, VirtualDevice};

/// One write observed by [`RecordingDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceWrite {
    Payload { kind: EventKind, code: u16, value: i32 },
    Sync,
}

#[derive(Default)]
struct Inner {
    writes: Vec<(DeviceWrite, Instant)>,
    fail_payloads: u32,
    released: bool,
}

/// A [`VirtualDevice`] that stores writes in memory.
#[derive(Default)]
pub struct RecordingDevice {
    inner: Mutex<Inner>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` payload writes fail with [`EmitError::Rejected`].
    pub fn fail_next_payloads(&self, n: u32) {
        self.inner.lock().expect("lock poisoned").fail_payloads = n;
    }

    /// All recorded writes in call order.
    pub fn writes(&self) -> Vec<DeviceWrite> {
        self.timed_writes().into_iter().map(|(w, _)| w).collect()
    }

    /// All recorded writes with the instant each one happened.
    pub fn timed_writes(&self) -> Vec<(DeviceWrite, Instant)> {
        self.inner.lock().expect("lock poisoned").writes.clone()
    }

    /// Recorded payloads as `(kind, code, value)` tuples.
    pub fn payloads(&self) -> Vec<(EventKind, u16, i32)> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                DeviceWrite::Payload { kind, code, value } => Some((kind, code, value)),
                DeviceWrite::Sync => None,
            })
            .collect()
    }

    pub fn is_released(&self) -> bool {
        self.inner.lock().expect("lock poisoned").released
    }
}

impl VirtualDevice for RecordingDevice {
    fn write_payload(&self, kind: EventKind, code: u16, value: i32) -> Result<(), EmitError> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        if inner.released {
            return Err(EmitError::Closed);
        }
        if inner.fail_payloads > 0 {
            inner.fail_payloads -= 1;
            return Err(EmitError::Rejected(format!("{kind} code {code}")));
        }
        inner
            .writes
            .push((DeviceWrite::Payload { kind, code, value }, Instant::now()));
        Ok(())
    }

    fn write_sync(&self) -> Result<(), EmitError> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        if inner.released {
            return Err(EmitError::Closed);
        }
        inner.writes.push((DeviceWrite::Sync, Instant::now()));
        Ok(())
    }

    fn release(&self) -> Result<(), EmitError> {
        self.inner.lock().expect("lock poisoned").released = true;
        Ok(())
    }
}
