//! Persisted event-log format.
//!
//! One semicolon-delimited row per emitted event:
//!
//! ```text
//! timestamp;delay;type;value;code
//! 0;100;1;1;30
//! ```
//!
//! - `timestamp` – arrival time in milliseconds since the engine started.
//! - `delay` – effective delay in milliseconds.
//! - `type` – numeric evdev type (`1` = `EV_KEY`, `2` = `EV_REL`).
//!
//! The header row is written once per destination file.

use std::time::Duration;

use thiserror::Error;

use crate::domain::event::{EventKind, ScheduledEvent};

/// Header row of every log file.
pub const LOG_HEADER: &str = "timestamp;delay;type;value;code";

/// Errors produced when reading a log row back.
#[derive(Debug, Error, PartialEq)]
pub enum LogFormatError {
    #[error("expected 5 fields, got {0}")]
    FieldCount(usize),
    #[error("invalid {field} field: {value:?}")]
    InvalidField { field: &'static str, value: String },
    #[error("type {0} is not a delayed event type")]
    UnknownType(u16),
}

/// Record of one emitted event.  Never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp_ms: u64,
    pub delay_ms: u64,
    pub kind: EventKind,
    pub code: u16,
    pub value: i32,
    /// Set when the virtual device rejected the write.  Not persisted.
    pub failed: bool,
}

impl LogRecord {
    /// Builds the record for a fired event.
    pub fn from_scheduled(event: &ScheduledEvent, failed: bool) -> Self {
        Self {
            timestamp_ms: millis(event.raw.arrival_time),
            delay_ms: millis(event.delay()),
            kind: event.raw.kind,
            code: event.raw.code,
            value: event.raw.value,
            failed,
        }
    }

    /// Formats the record as one log row, without a trailing newline.
    pub fn to_row(&self) -> String {
        format!(
            "{};{};{};{};{}",
            self.timestamp_ms,
            self.delay_ms,
            self.kind.ev_type(),
            self.value,
            self.code
        )
    }

    /// Parses one log row.
    ///
    /// # Errors
    ///
    /// Returns [`LogFormatError`] when the row does not have the expected shape.
    pub fn parse_row(row: &str) -> Result<Self, LogFormatError> {
        let fields: Vec<&str> = row.trim_end().split(';').collect();
        if fields.len() != 5 {
            return Err(LogFormatError::FieldCount(fields.len()));
        }

        let timestamp_ms = parse_field(fields[0], "timestamp")?;
        let delay_ms = parse_field(fields[1], "delay")?;
        let ev_type: u16 = parse_field(fields[2], "type")?;
        let value = parse_field(fields[3], "value")?;
        let code = parse_field(fields[4], "code")?;
        let kind = EventKind::classify(ev_type, code).ok_or(LogFormatError::UnknownType(ev_type))?;

        Ok(Self {
            timestamp_ms,
            delay_ms,
            kind,
            code,
            value,
            failed: false,
        })
    }
}

fn parse_field<T: std::str::FromStr>(value: &str, field: &'static str) -> Result<T, LogFormatError> {
    value.parse().map_err(|_| LogFormatError::InvalidField {
        field,
        value: value.to_string(),
    })
}

fn millis(d: Duration) -> u64 {
    d.as_millis().try_into().unwrap_or(u64::MAX)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
