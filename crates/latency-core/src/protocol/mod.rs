//! Wire and file formats: reconfiguration lines, event-log rows, and raw
//! kernel input records.

pub mod input_record;
pub mod log_format;
pub mod reconfig;

pub use input_record::{decode_record, encode_record, RecordError, INPUT_EVENT_SIZE};
pub use log_format::{LogFormatError, LogRecord, LOG_HEADER};
pub use reconfig::{parse_message, NormalParams, ReconfigError, ReconfigMessage};
