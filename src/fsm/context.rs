//! Shared mutable context threaded through every FSM handler.
//!
//! `FsmContext` is the blackboard the state handlers read from and write
//! to: this cycle's sensor snapshot, the interlock verdict, the I/O mirror,
//! the commands to apply once dispatch is done, and the pre-charge session.

use heapless::Vec;

use crate::config::BoardProfile;
use crate::control::{DivergenceReason, PrechargeSession};
use crate::drivers::ContactorIntent;
use crate::sensors::InputLevels;

// ---------------------------------------------------------------------------
// Sensor snapshot (read-only to state handlers; written by the service)
// ---------------------------------------------------------------------------

/// Everything sampled at the start of a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorSnapshot {
    /// Raw digital inputs (key not yet filtered by the latch).
    pub inputs: InputLevels,
    /// Load side of the pre-charge resistor, decivolts.
    pub precharge_dv: u8,
    /// Pack terminals, decivolts.
    pub pack_dv: u8,
}

// ---------------------------------------------------------------------------
// Actuator commands (written by state handlers; applied by the service)
// ---------------------------------------------------------------------------

/// One-shot network messages requested by a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Broadcast {
    /// NMT start for the thermal-management system.
    TmsWake,
    /// NMT pre-operational for the thermal-management system.
    TmsSleep,
    /// Battery management reset, repeated on the wire.
    BmsReset,
}

/// Desired actuator state.  Levels persist across cycles; `broadcasts`
/// is drained each time the commands are applied.
#[derive(Debug, Clone)]
pub struct ActuatorCommands {
    pub precharge: bool,
    pub discharge: bool,
    pub apm: bool,
    pub contactor: ContactorIntent,
    pub broadcasts: Vec<Broadcast, 4>,
}

impl Default for ActuatorCommands {
    fn default() -> Self {
        Self {
            precharge: false,
            discharge: false,
            apm: false,
            contactor: ContactorIntent::Open,
            broadcasts: Vec::new(),
        }
    }
}

impl ActuatorCommands {
    /// Everything de-energised, contactor open.
    pub fn all_off() -> Self {
        Self::default()
    }

    /// Queue a broadcast.  The queue is far larger than any single cycle
    /// needs; an overflow is dropped and logged.
    pub fn send(&mut self, msg: Broadcast) {
        if self.broadcasts.push(msg).is_err() {
            log::error!("broadcast queue full, dropping {:?}", msg);
        }
    }
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler function.
pub struct FsmContext {
    // -- Timing --
    /// Controller clock at the start of this cycle (ms).
    pub now_ms: u64,
    /// Clock value when the current state was entered.
    pub state_entered_ms: u64,

    // -- Inputs --
    pub sensors: SensorSnapshot,
    /// Raw key level from the previous cycle, for edge detection.
    pub prev_key_raw: bool,
    /// Interlock verdict for this cycle.
    pub safe: bool,
    /// Key after the fault latch.
    pub key: bool,
    /// I/O mirror: contactor position as reported by its driver.
    pub contactor_open: bool,

    // -- Outputs --
    pub commands: ActuatorCommands,

    // -- Configuration --
    pub profile: BoardProfile,

    // -- Safety --
    /// Interlock fault bitmask (see `SafetyFault::mask()`), diagnostics only.
    pub fault_flags: u8,
    /// Set by a handler to latch the interlock; consumed by the service.
    pub latch_request: Option<&'static str>,

    // -- Pre-charge --
    /// Why the last pre-charge attempt was abandoned; consumed by the service.
    pub divergence: Option<DivergenceReason>,
    pub session: Option<PrechargeSession>,
    /// The bus has been pre-charged since the last `PowerOff`.
    pub post_precharge: bool,
}

impl FsmContext {
    pub fn new(profile: BoardProfile) -> Self {
        Self {
            now_ms: 0,
            state_entered_ms: 0,
            sensors: SensorSnapshot::default(),
            prev_key_raw: false,
            safe: false,
            key: false,
            contactor_open: true,
            commands: ActuatorCommands::all_off(),
            profile,
            fault_flags: 0,
            latch_request: None,
            divergence: None,
            session: None,
            post_precharge: false,
        }
    }

    /// Milliseconds since the current state was entered.
    pub fn ms_in_state(&self) -> u64 {
        self.now_ms.saturating_sub(self.state_entered_ms)
    }

    /// Raw key went from off to on since the previous cycle.
    pub fn key_rising_edge(&self) -> bool {
        self.sensors.inputs.key && !self.prev_key_raw
    }
}
