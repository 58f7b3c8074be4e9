//! Outbound application events.
//!
//! The [`Controller`](super::service::Controller) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other side
//! decide what to do with them: log them, put the status record on the CAN
//! bus, or record them in a test.

use crate::bus::ChangeNotification;
use crate::control::DivergenceReason;
use crate::fsm::ControllerState;

/// Structured events emitted by the controller core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The controller has started (carries the initial state).
    Started(ControllerState),

    /// The state machine moved to a different state.  Emitted exactly once
    /// per distinct transition, with the record as it stands after this
    /// cycle's actuation.
    StateChanged {
        from: ControllerState,
        to: ControllerState,
        record: ChangeNotification,
    },

    /// The interlock latched; a key cycle is required.  Carries the fault
    /// bitmask seen at the time.
    FaultLatched(u8),

    /// The operator cycled the key and the latch is gone.
    LatchCleared,

    /// A pre-charge attempt was abandoned.
    PrechargeDiverged(DivergenceReason),

    /// Result of a rate-limited isolation-monitor query.
    IsolationPolled { ok: bool },

    /// Per-cycle debug line (board profile option).
    Status(StatusLine),
}

/// A point-in-time view of the controller, one per cycle when enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLine {
    pub state: ControllerState,
    pub raw_key: bool,
    /// Key after the fault latch.
    pub key: bool,
    pub safe: bool,
    pub latched: bool,
    pub sto_attempts: u8,
    pub precharge_dv: u8,
    pub pack_dv: u8,
    pub fault_flags: u8,
}
