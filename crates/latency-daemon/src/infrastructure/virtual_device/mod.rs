//! Virtual device adapters implementing
//! [`VirtualDevice`](crate::application::schedule_events::VirtualDevice).
//!
//! | Adapter                 | Writes to                                   |
//! |-------------------------|---------------------------------------------|
//! | [`RecordWriterDevice`]  | a uinput descriptor, FIFO, or plain file    |
//! | [`TracingDevice`]       | the `tracing` log only (dry run)            |
//! | [`mock::RecordingDevice`] | memory, for tests                         |

pub mod mock;
pub mod record_writer;
pub mod tracing_device;

pub use record_writer::RecordWriterDevice;
pub use tracing_device::TracingDevice;
