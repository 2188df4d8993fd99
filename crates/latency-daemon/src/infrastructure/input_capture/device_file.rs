//! Capture from a Linux evdev node such as `/dev/input/event3`.
//!
//! The kernel hands out whole 24-byte `input_event` records per `read(2)`,
//! so the reader thread simply loops on `read_exact`, decodes each record
//! and forwards it.  The same code reads a recorded event file, which is how
//! captures are replayed offline.
//!
//! The reader thread ends on end of file, on any read error other than
//! `Interrupted` (an unplugged device reports `ENODEV`), or once `stop()` has
//! been called and the next record arrives.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc, Arc, Mutex, PoisonError,
};

use latency_core::protocol::{decode_record, INPUT_EVENT_SIZE};
use latency_core::InputRecord;
use tracing::{debug, error, info, warn};

use super::{CaptureError, InputSource};

/// Reads input records from a device node or recorded event file.
pub struct DeviceFileSource {
    path: PathBuf,
    running: Arc<AtomicBool>,
    started: Mutex<bool>,
}

impl DeviceFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            running: Arc::new(AtomicBool::new(false)),
            started: Mutex::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InputSource for DeviceFileSource {
    fn start(&self) -> Result<mpsc::Receiver<InputRecord>, CaptureError> {
        let mut started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        if *started {
            return Err(CaptureError::AlreadyStarted);
        }

        let file = File::open(&self.path).map_err(|source| CaptureError::Open {
            path: self.path.clone(),
            source,
        })?;

        let (tx, rx) = mpsc::channel();
        self.running.store(true, Ordering::Relaxed);
        let running = Arc::clone(&self.running);
        let path = self.path.clone();

        std::thread::Builder::new()
            .name("latency-capture".to_string())
            .spawn(move || {
                let forwarded = read_records(file, &tx, &running);
                info!("capture from {} ended after {forwarded} records", path.display());
            })
            .map_err(CaptureError::Spawn)?;

        *started = true;
        info!("capturing input from {}", self.path.display());
        Ok(rx)
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

/// Forwards decoded records from `reader` to `tx` until the stream ends.
///
/// Returns the number of records forwarded.
pub(crate) fn read_records<R: Read>(
    mut reader: R,
    tx: &mpsc::Sender<InputRecord>,
    running: &AtomicBool,
) -> u64 {
    let mut buf = [0u8; INPUT_EVENT_SIZE];
    let mut forwarded = 0;

    while running.load(Ordering::Relaxed) {
        match reader.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                debug!("input stream reached end of file");
                break;
            }
            Err(e) => {
                error!("input device read failed: {e}");
                break;
            }
        }

        match decode_record(&buf) {
            Ok(record) => {
                if tx.send(record).is_err() {
                    // Receiver dropped – engine is shutting down.
                    break;
                }
                forwarded += 1;
            }
            Err(e) => warn!("skipping undecodable input record: {e}"),
        }
    }

    forwarded
}

// ── Tests ─────────────────────────────────────────────────────────────────────
