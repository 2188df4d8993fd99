//! Domain entities for the latency daemon.
//!
//! Pure logic with no OS, async, or file-system dependencies:
//!
//! - **`event`** – what a captured event is and how it is classified.
//! - **`config`** – delay ranges, distribution parameters, and the shared
//!   snapshot store that lets configuration change while events flow.
//! - **`sampler`** – draws the per-event delay.
//!
//! Everything here can be unit-tested on any platform without a device.

pub mod config;
pub mod event;
pub mod sampler;
