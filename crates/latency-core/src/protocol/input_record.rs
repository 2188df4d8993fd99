//! Binary codec for Linux `struct input_event` records.
//!
//! Layout on 64-bit Linux (native byte order):
//! ```text
//! [tv_sec:8][tv_usec:8][type:2][code:2][value:4]
//! ```
//! Total record size: 24 bytes.  This is what `read(2)` returns for
//! `/dev/input/eventN` and what `write(2)` expects on a uinput descriptor.

use std::time::Duration;

use thiserror::Error;

use crate::domain::event::InputRecord;

/// Size of one encoded `input_event`.
pub const INPUT_EVENT_SIZE: usize = 24;

/// Errors that can occur while decoding a record.
#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    /// Fewer bytes than one full record.
    #[error("insufficient data: need {INPUT_EVENT_SIZE} bytes, got {0}")]
    InsufficientData(usize),

    /// The timestamp fields hold a negative or out-of-range value.
    #[error("invalid timestamp: tv_sec={tv_sec} tv_usec={tv_usec}")]
    InvalidTimestamp { tv_sec: i64, tv_usec: i64 },
}

/// Encodes `record` into its 24-byte kernel representation.
pub fn encode_record(record: &InputRecord) -> [u8; INPUT_EVENT_SIZE] {
    let tv_sec = record.time.as_secs() as i64;
    let tv_usec = i64::from(record.time.subsec_micros());

    let mut buf = [0u8; INPUT_EVENT_SIZE];
    buf[0..8].copy_from_slice(&tv_sec.to_ne_bytes());
    buf[8..16].copy_from_slice(&tv_usec.to_ne_bytes());
    buf[16..18].copy_from_slice(&record.ev_type.to_ne_bytes());
    buf[18..20].copy_from_slice(&record.code.to_ne_bytes());
    buf[20..24].copy_from_slice(&record.value.to_ne_bytes());
    buf
}

/// Decodes one record from the start of `bytes`.
///
/// # Errors
///
/// Returns [`RecordError`] if `bytes` is shorter than [`INPUT_EVENT_SIZE`] or
/// the timestamp is invalid.
pub fn decode_record(bytes: &[u8]) -> Result<InputRecord, RecordError> {
    if bytes.len() < INPUT_EVENT_SIZE {
        return Err(RecordError::InsufficientData(bytes.len()));
    }

    let tv_sec = i64::from_ne_bytes(field(bytes, 0));
    let tv_usec = i64::from_ne_bytes(field(bytes, 8));
    if tv_sec < 0 || !(0..1_000_000).contains(&tv_usec) {
        return Err(RecordError::InvalidTimestamp { tv_sec, tv_usec });
    }

    Ok(InputRecord {
        ev_type: u16::from_ne_bytes(field(bytes, 16)),
        code: u16::from_ne_bytes(field(bytes, 18)),
        value: i32::from_ne_bytes(field(bytes, 20)),
        time: Duration::from_secs(tv_sec as u64) + Duration::from_micros(tv_usec as u64),
    })
}

fn field<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::{EV_KEY, EV_REL};

    #[test]
    fn test_encoded_record_is_24_bytes_with_fields_in_kernel_order() {
        // Arrange
        let record = InputRecord {
            ev_type: EV_KEY,
            code: 30,
            value: 1,
            time: Duration::new(3, 250_000_000),
        };

        // Act
        let bytes = encode_record(&record);

        // Assert
        assert_eq!(bytes.len(), INPUT_EVENT_SIZE);
        assert_eq!(i64::from_ne_bytes(bytes[0..8].try_into().unwrap()), 3);
        assert_eq!(i64::from_ne_bytes(bytes[8..16].try_into().unwrap()), 250_000);
        assert_eq!(u16::from_ne_bytes(bytes[16..18].try_into().unwrap()), EV_KEY);
        assert_eq!(u16::from_ne_bytes(bytes[18..20].try_into().unwrap()), 30);
        assert_eq!(i32::from_ne_bytes(bytes[20..24].try_into().unwrap()), 1);
    }

    #[test]
    fn test_decode_reads_what_encode_wrote() {
        let record = InputRecord {
            ev_type: EV_REL,
            code: 1,
            value: -12,
            time: Duration::new(17, 4_000),
        };
        assert_eq!(decode_record(&encode_record(&record)), Ok(record));
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut bytes = encode_record(&InputRecord::sync_report()).to_vec();
        bytes.extend_from_slice(&[0xFF; 10]);
        assert_eq!(decode_record(&bytes), Ok(InputRecord::sync_report()));
    }

    #[test]
    fn test_decode_short_buffer_fails() {
        assert_eq!(decode_record(&[0u8; 23]), Err(RecordError::InsufficientData(23)));
    }

    #[test]
    fn test_decode_rejects_out_of_range_microseconds() {
        let mut bytes = encode_record(&InputRecord::sync_report());
        bytes[8..16].copy_from_slice(&2_000_000i64.to_ne_bytes());
        assert!(matches!(
            decode_record(&bytes),
            Err(RecordError::InvalidTimestamp { tv_usec: 2_000_000, .. })
        ));
    }
}
