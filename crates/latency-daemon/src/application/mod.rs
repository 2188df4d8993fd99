//! Application layer use cases for the latency daemon.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure rules in `latency_core`) and the infrastructure (devices, sockets,
//! files).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil a goal (e.g., "re-emit this key
//!   press 87ms later, after the previous key press").
//! - **Depend on abstractions** (traits) rather than concrete devices, so the
//!   infrastructure can be swapped without changing this code.
//!
//! # Sub-modules
//!
//! - **`schedule_events`** – The delay queue, the drain task, and the
//!   `VirtualDevice` trait.  Runs on every captured event.
//!
//! - **`reconfigure`** – Applies delay updates while events are in flight.
//!
//! - **`event_log`** – Keeps a record of every emitted event and writes it out.
//!
//! - **`engine`** – Starts and stops the whole pipeline.

pub mod engine;
pub mod event_log;
pub mod reconfigure;
pub mod schedule_events;
