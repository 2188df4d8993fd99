//! Input event entities: what gets captured, scheduled, and re-emitted.
//!
//! # Event kinds (for beginners)
//!
//! The Linux input subsystem describes every event with a `(type, code, value)`
//! triple.  Only three flavours carry delay in this daemon:
//!
//! | evdev type | code range        | [`EventKind`] | delay range used |
//! |------------|-------------------|---------------|------------------|
//! | `EV_KEY`   | `0x100..0x160`    | `Button`      | click            |
//! | `EV_KEY`   | anything else     | `Key`         | click            |
//! | `EV_REL`   | any               | `Motion`      | movement         |
//!
//! Everything else (`EV_SYN`, `EV_MSC`, ...) is structural.  Structural events
//! are never delayed on their own; the engine writes a fresh `SYN_REPORT`
//! marker after every payload event it re-emits.
//!
//! # Limitations
//!
//! Records of any other type are counted as skipped and are not re-emitted at
//! all.  `MSC_SCAN` companions of key events are lost, and an absolute-pointer
//! device (`EV_ABS`: tablets, touchscreens, some VMs) produces no output.
//! Only relative pointers and keyboards are supported.

use std::cmp::Ordering;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// `EV_SYN`: synchronization / batch boundary events.
pub const EV_SYN: u16 = 0x00;
/// `EV_KEY`: keys and buttons.
pub const EV_KEY: u16 = 0x01;
/// `EV_REL`: relative axes (pointer deltas, wheel).
pub const EV_REL: u16 = 0x02;
/// `EV_MSC`: miscellaneous (e.g. `MSC_SCAN`).
pub const EV_MSC: u16 = 0x04;
/// `EV_ABS`: absolute axes.  Not delayed or forwarded.
pub const EV_ABS: u16 = 0x03;
/// `SYN_REPORT` code of the synchronization marker.
pub const SYN_REPORT: u16 = 0x00;

/// First button code (`BTN_MISC`).
const BTN_FIRST: u16 = 0x100;
/// One past the last mouse/joystick/gamepad/digitizer button code.
const BTN_END: u16 = 0x160;

/// The three kinds of payload events that receive injected delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Relative pointer motion or wheel (`EV_REL`).
    Motion,
    /// Mouse or other device button (`EV_KEY` in the button range).
    Button,
    /// Keyboard key (`EV_KEY` outside the button range).
    Key,
}

impl EventKind {
    /// All kinds, in [`EventKind::index`] order.
    pub const ALL: [EventKind; 3] = [EventKind::Motion, EventKind::Button, EventKind::Key];

    /// Classifies a raw evdev `(type, code)` pair.
    ///
    /// Returns `None` for structural events that must not be delayed.
    pub fn classify(ev_type: u16, code: u16) -> Option<Self> {
        match ev_type {
            EV_REL => Some(EventKind::Motion),
            EV_KEY if (BTN_FIRST..BTN_END).contains(&code) => Some(EventKind::Button),
            EV_KEY => Some(EventKind::Key),
            _ => None,
        }
    }

    /// The evdev type written to the virtual device for this kind.
    pub fn ev_type(self) -> u16 {
        match self {
            EventKind::Motion => EV_REL,
            EventKind::Button | EventKind::Key => EV_KEY,
        }
    }

    /// Returns `true` when this kind is delayed with the click range.
    pub fn uses_click_delay(self) -> bool {
        matches!(self, EventKind::Button | EventKind::Key)
    }

    /// Dense index for per-kind lookup tables.
    pub fn index(self) -> usize {
        match self {
            EventKind::Motion => 0,
            EventKind::Button => 1,
            EventKind::Key => 2,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::Motion => "motion",
            EventKind::Button => "button",
            EventKind::Key => "key",
        };
        f.write_str(name)
    }
}

/// One raw kernel input record as produced by a capture device.
///
/// `time` is the kernel timestamp (`tv_sec`/`tv_usec`) converted to a
/// [`Duration`]; it is carried for diagnostics only.  Scheduling uses the
/// arrival time stamped by the engine's own monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputRecord {
    pub ev_type: u16,
    pub code: u16,
    pub value: i32,
    pub time: Duration,
}

impl InputRecord {
    /// Creates a record with a zero timestamp.
    pub fn new(ev_type: u16, code: u16, value: i32) -> Self {
        Self {
            ev_type,
            code,
            value,
            time: Duration::ZERO,
        }
    }

    /// The `EV_SYN / SYN_REPORT / 0` marker that closes every re-emitted batch.
    pub fn sync_report() -> Self {
        Self::new(EV_SYN, SYN_REPORT, 0)
    }

    /// Returns `true` for `EV_SYN` records.
    pub fn is_sync(&self) -> bool {
        self.ev_type == EV_SYN
    }
}

/// A captured payload event.  Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: EventKind,
    pub code: u16,
    pub value: i32,
    /// Monotonic arrival time, measured from the engine clock's epoch.
    pub arrival_time: Duration,
}

impl RawEvent {
    pub fn new(kind: EventKind, code: u16, value: i32, arrival_time: Duration) -> Self {
        Self {
            kind,
            code,
            value,
            arrival_time,
        }
    }

    /// Builds a payload event from a raw record, or `None` if the record is structural.
    pub fn from_record(record: &InputRecord, arrival_time: Duration) -> Option<Self> {
        EventKind::classify(record.ev_type, record.code)
            .map(|kind| Self::new(kind, record.code, record.value, arrival_time))
    }
}

/// A payload event waiting in the delay queue.
///
/// Ordered by `(fire_time, sequence)` so that a min-heap pops the earliest
/// event first and breaks ties in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledEvent {
    pub raw: RawEvent,
    /// The delay drawn from the distribution, before any ordering adjustment.
    pub sampled_delay: Duration,
    /// When the event is released, measured from the engine clock's epoch.
    ///
    /// Always `>= raw.arrival_time + sampled_delay`.
    pub fire_time: Duration,
    /// Submission order, unique per scheduler.
    pub sequence: u64,
}

impl ScheduledEvent {
    /// The effective delay actually applied (`fire_time - arrival_time`).
    pub fn delay(&self) -> Duration {
        self.fire_time.saturating_sub(self.raw.arrival_time)
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fire_time
            .cmp(&other.fire_time)
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
