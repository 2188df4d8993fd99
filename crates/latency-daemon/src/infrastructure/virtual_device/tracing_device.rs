//! Dry-run device: logs every write instead of emitting it.

use std::sync::atomic::{AtomicU64, Ordering};

use latency_core::EventKind;
use tracing::{debug, info};

use crate::application::schedule_events::{EmitError, VirtualDevice};

/// [`VirtualDevice`] that only reports writes through `tracing`.
#[derive(Debug, Default)]
pub struct TracingDevice {
    payloads: AtomicU64,
}

impl TracingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payload_count(&self) -> u64 {
        self.payloads.load(Ordering::Relaxed)
    }
}

impl VirtualDevice for TracingDevice {
    fn write_payload(&self, kind: EventKind, code: u16, value: i32) -> Result<(), EmitError> {
        self.payloads.fetch_add(1, Ordering::Relaxed);
        debug!(%kind, code, value, "emit");
        Ok(())
    }

    fn write_sync(&self) -> Result<(), EmitError> {
        Ok(())
    }

    fn release(&self) -> Result<(), EmitError> {
        info!("dry-run device released after {} events", self.payload_count());
        Ok(())
    }
}
