//! In-memory record of every emitted event, persisted at shutdown.
//!
//! The drain task owns the log exclusively, so appends need no locking.  On
//! shutdown the log is handed back to the engine, which writes it out as
//! semicolon-separated rows:
//!
//! ```text
//! timestamp;delay;type;value;code
//! 0;100;1;1;30
//! 4;35;2;-3;0
//! ```
//!
//! A header line is only written when the target file is new or empty, so
//! repeated runs append to the same file.

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use latency_core::protocol::LOG_HEADER;
use latency_core::LogRecord;

/// Append-only list of [`LogRecord`]s in emission order.
#[derive(Debug, Default)]
pub struct EventLog {
    records: Vec<LogRecord>,
}

impl EventLog {
    /// Records reserved up front; matches the typical burst size.
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    pub fn append(&mut self, record: LogRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    /// Number of records whose device write failed.
    pub fn failed_count(&self) -> usize {
        self.records.iter().filter(|r| r.failed).count()
    }

    /// Empties the log without writing it anywhere.
    pub fn take(&mut self) -> Vec<LogRecord> {
        std::mem::take(&mut self.records)
    }

    /// Writes all records to `out`, optionally preceded by the header row,
    /// and empties the log.
    ///
    /// Returns the records that were written.  On error the log is left
    /// untouched so the caller can retry elsewhere.
    ///
    /// # Errors
    ///
    /// Propagates any I/O error from `out`.
    pub fn flush<W: Write>(&mut self, out: W, write_header: bool) -> io::Result<Vec<LogRecord>> {
        let mut out = BufWriter::new(out);
        if write_header {
            writeln!(out, "{LOG_HEADER}")?;
        }
        for record in &self.records {
            writeln!(out, "{}", record.to_row())?;
        }
        out.flush()?;
        Ok(self.take())
    }

    /// Appends all records to the file at `path`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be opened or written.
    pub fn flush_to_path(&mut self, path: &Path) -> io::Result<Vec<LogRecord>> {
        let needs_header = match std::fs::metadata(path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => return Err(e),
        };
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.flush(file, needs_header)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use latency_core::EventKind;

    fn record(timestamp_ms: u64, delay_ms: u64, failed: bool) -> LogRecord {
        LogRecord {
            timestamp_ms,
            delay_ms,
            kind: EventKind::Key,
            code: 30,
            value: 1,
            failed,
        }
    }

    fn temp_log_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("latency-daemon-{}-{name}.csv", std::process::id()))
    }

    #[test]
    fn test_append_preserves_emission_order() {
        let mut log = EventLog::new();
        log.append(record(0, 10, false));
        log.append(record(5, 3, true));

        assert_eq!(log.len(), 2);
        assert_eq!(log.records()[0].timestamp_ms, 0);
        assert_eq!(log.records()[1].timestamp_ms, 5);
        assert_eq!(log.failed_count(), 1);
    }

    #[test]
    fn test_flush_writes_header_then_rows_and_empties_log() {
        // Arrange
        let mut log = EventLog::new();
        log.append(record(0, 100, false));
        let mut out = Vec::new();

        // Act
        let written = log.flush(&mut out, true).unwrap();

        // Assert
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "timestamp;delay;type;value;code\n0;100;1;1;30\n"
        );
        assert_eq!(written.len(), 1);
        assert!(log.is_empty());
    }

    #[test]
    fn test_flush_to_path_writes_header_only_once() {
        // Arrange
        let path = temp_log_path("header-once");
        let _ = std::fs::remove_file(&path);
        let mut log = EventLog::new();

        // Act – two sessions appending to the same file
        log.append(record(0, 100, false));
        log.flush_to_path(&path).unwrap();
        log.append(record(7, 12, false));
        log.flush_to_path(&path).unwrap();

        // Assert
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["timestamp;delay;type;value;code", "0;100;1;1;30", "7;12;1;1;30"]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_flush_to_unwritable_path_keeps_records() {
        let mut log = EventLog::new();
        log.append(record(0, 1, false));
        let path = std::env::temp_dir().join("latency-daemon-missing-dir").join("x").join("log.csv");

        assert!(log.flush_to_path(&path).is_err());
        assert_eq!(log.len(), 1);
    }
}
