//! Mock input source for unit testing.
//!
//! Allows tests to inject synthetic [`InputRecord`]s without requiring
//! a physical input device.

use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex,
};

use latency_core::InputRecord;

use super::{CaptureError, InputSource};

/// A mock implementation of [`InputSource`] that allows tests to inject records.
///
/// Clones share the same channel, so a test can keep one handle while the
/// engine owns the other.
#[derive(Clone)]
pub struct MockInputSource {
    sender: Arc<Mutex<Option<Sender<InputRecord>>>>,
    stop_count: Arc<Mutex<u32>>,
}

impl MockInputSource {
    /// Creates a new mock input source.
    pub fn new() -> Self {
        Self {
            sender: Arc::new(Mutex::new(None)),
            stop_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Injects a synthetic record, as if read from the device.
    ///
    /// Panics if `start()` has not been called or if the source was disconnected.
    pub fn inject(&self, record: InputRecord) {
        let guard = self.sender.lock().expect("lock poisoned");
        if let Some(ref sender) = *guard {
            sender
                .send(record)
                .expect("receiver has been dropped; call start() first");
        } else {
            panic!("MockInputSource::inject called before start()");
        }
    }

    /// Simulates losing the device: the capture channel closes.
    pub fn disconnect(&self) {
        *self.sender.lock().expect("lock poisoned") = None;
    }

    /// Returns the number of times [`InputSource::stop`] was called.
    pub fn stop_count(&self) -> u32 {
        *self.stop_count.lock().expect("lock poisoned")
    }
}

impl Default for MockInputSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSource for MockInputSource {
    fn start(&self) -> Result<mpsc::Receiver<InputRecord>, CaptureError> {
        let mut guard = self.sender.lock().expect("lock poisoned");
        if guard.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }
        let (tx, rx) = mpsc::channel();
        *guard = Some(tx);
        Ok(rx)
    }

    fn stop(&self) {
        *self.stop_count.lock().expect("lock poisoned") += 1;
        // Drop the sender to close the channel
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use latency_core::domain::event::{EV_KEY, EV_REL};

    #[test]
    fn test_mock_input_source_starts_and_receives_records() {
        // Arrange
        let source = MockInputSource::new();
        let rx = source.start().expect("start should succeed");

        // Act
        source.inject(InputRecord::new(EV_KEY, 30, 1));

        // Assert
        let record = rx.recv().expect("should receive record");
        assert_eq!(record, InputRecord::new(EV_KEY, 30, 1));
    }

    #[test]
    fn test_mock_input_source_stop_closes_channel() {
        // Arrange
        let source = MockInputSource::new();
        let rx = source.start().expect("start should succeed");

        // Act
        source.stop();

        // Assert – channel should be disconnected
        assert!(rx.recv().is_err(), "channel should be closed after stop()");
        assert_eq!(source.stop_count(), 1);
    }

    #[test]
    fn test_mock_input_source_rejects_second_start() {
        let source = MockInputSource::new();
        let _rx = source.start().expect("start should succeed");

        assert!(matches!(source.start(), Err(CaptureError::AlreadyStarted)));
    }

    #[test]
    fn test_clones_share_one_channel() {
        // Arrange
        let source = MockInputSource::new();
        let handle = source.clone();
        let rx = source.start().expect("start should succeed");

        // Act
        handle.inject(InputRecord::new(EV_REL, 0, 4));
        handle.inject(InputRecord::sync_report());
        handle.disconnect();

        // Assert
        let received: Vec<InputRecord> = rx.iter().collect();
        assert_eq!(received, vec![InputRecord::new(EV_REL, 0, 4), InputRecord::sync_report()]);
    }
}
