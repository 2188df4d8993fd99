//! # latency-core
//!
//! Shared library for the input latency daemon containing the event model,
//! the delay configuration and its snapshot store, the delay sampler, and
//! the text/binary formats the daemon speaks.
//!
//! It has zero dependencies on OS devices, async runtimes, or sockets.
//!
//! # Architecture overview (for beginners)
//!
//! The daemon sits between a physical input device and a virtual one.  Every
//! pointer movement, button press, or key press read from the physical device
//! is held back for a randomized number of milliseconds and then written to
//! the virtual device, so applications see the same input with added latency.
//!
//! This crate defines:
//!
//! - **`domain`** – Events, delay configuration, and the sampler that picks
//!   each event's delay.
//!
//! - **`protocol`** – The reconfiguration line format, the CSV-like event log
//!   row format, and the 24-byte Linux `input_event` record codec.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `latency_core::DelayConfig` instead of `latency_core::domain::config::DelayConfig`.
pub use domain::config::{ConfigStore, DelayConfig, DelayRange, Distribution};
pub use domain::event::{EventKind, InputRecord, RawEvent, ScheduledEvent};
pub use domain::sampler::{sample, sample_for};
pub use protocol::log_format::LogRecord;
pub use protocol::reconfig::{ReconfigError, ReconfigMessage};
