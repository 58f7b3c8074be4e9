//! Port traits: the hexagonal boundary between the controller core and the
//! board.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Controller (domain)
//! ```
//!
//! Driven adapters (pins, SPI, CAN, clocks, event sinks) implement these
//! traits.  The [`Controller`](super::service::Controller) consumes them via
//! generics, so the sequencing logic never touches hardware directly.
//!
//! All port errors are typed; the controller decides per call whether a
//! failure reads as "not ok" or is only logged.

use crate::bus::BusMessage;
use crate::drivers::PathOutput;
use crate::error::{ActuatorError, BusError, Error, SensorError};
use crate::sensors::{InputLevels, IsolationCode, VoltageChannel};

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port.  Every call is a synchronous request/response.
pub trait SensorPort {
    /// Sample the key, battery-ok and e-stop lines.
    fn read_inputs(&mut self) -> Result<InputLevels, SensorError>;

    /// One voltage channel in decivolts.
    fn read_voltage(&mut self, channel: VoltageChannel) -> Result<u8, SensorError>;

    /// Query the isolation monitor.  Called at most once per poll interval.
    fn read_isolation(&mut self) -> Result<IsolationCode, Error>;
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port for the resistive paths, the APM enable and the main
/// contactor.
pub trait ActuatorPort {
    /// Drive one of the active-high path outputs.
    fn set_output(&mut self, output: PathOutput, on: bool) -> Result<(), ActuatorError>;

    /// Command the contactor.  Implementations pulse a coil only when the
    /// position actually changes.
    fn set_contactor_open(&mut self, open: bool) -> Result<(), ActuatorError>;

    /// Last successfully commanded contactor position.
    fn contactor_open(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Broadcast port (driven adapter: domain → CAN)
// ───────────────────────────────────────────────────────────────

/// Fire-and-forget network messages (TMS NMT, BMS reset).
pub trait BroadcastPort {
    fn broadcast(&mut self, msg: &BusMessage) -> Result<(), BusError>;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic millisecond clock.  All controller timers are measured as
/// differences of this value.
pub trait ClockPort {
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The controller emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go (log, CAN status
/// frame, test recorder).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}
