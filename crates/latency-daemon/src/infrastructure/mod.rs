//! Infrastructure layer for the latency daemon.
//!
//! Contains OS-facing adapters: input device capture, virtual device output,
//! the reconfiguration control socket, and file-system storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `latency_core`.  The application layer only reaches in here for the
//! `InputSource` trait.

pub mod input_capture;
pub mod reconfig_transport;
pub mod storage;
pub mod virtual_device;
