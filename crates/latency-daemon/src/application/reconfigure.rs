//! ReconfigurationChannel: applies delay updates while the engine runs.
//!
//! Messages arrive as text lines from any transport (a control socket, a
//! test harness, stdin).  Each line is parsed, merged into the active
//! configuration and published as a fresh snapshot.  Events already in the
//! queue keep the delay they were scheduled with; only later submissions see
//! the new values.
//!
//! A malformed line is logged and ignored.  The active configuration is left
//! exactly as it was.

use std::sync::Arc;

use latency_core::protocol::parse_message;
use latency_core::{ConfigStore, DelayConfig, ReconfigError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Applies reconfiguration messages to a shared [`ConfigStore`].
///
/// Cheap to clone; every clone publishes into the same store.
#[derive(Debug, Clone)]
pub struct ReconfigurationChannel {
    store: Arc<ConfigStore>,
}

impl ReconfigurationChannel {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }

    /// The configuration currently in effect.
    pub fn current(&self) -> DelayConfig {
        *self.store.current()
    }

    /// Parses one message and publishes the resulting configuration.
    ///
    /// Returns the configuration as stored, after normalization.
    ///
    /// # Errors
    ///
    /// Returns [`ReconfigError`] if the line is malformed.  Nothing is
    /// published in that case.
    pub fn apply(&self, line: &str) -> Result<DelayConfig, ReconfigError> {
        let message = match parse_message(line) {
            Ok(message) => message,
            Err(e) => {
                warn!("ignoring reconfiguration {:?}: {e}", line.trim());
                return Err(e);
            }
        };

        let stored = self.store.update(|current| message.apply_to(current));
        info!("delay configuration updated: {stored}");
        Ok(stored)
    }

    /// Applies every line received on `lines` until all senders are dropped.
    ///
    /// Returns the number of messages that were applied successfully.
    pub async fn run(self, mut lines: mpsc::Receiver<String>) -> u64 {
        let mut applied = 0;
        while let Some(line) = lines.recv().await {
            if line.trim().is_empty() {
                continue;
            }
            if self.apply(&line).is_ok() {
                applied += 1;
            }
        }
        debug!("reconfiguration channel closed after {applied} updates");
        applied
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
