//! Mock hardware adapters for integration testing.
//!
//! `MockHardware` implements every hardware port, records each actuation
//! and broadcast in order and is driven by a settable clock.  Readings
//! are plain fields the test rewrites between cycles.

use pvc_controller::app::events::AppEvent;
use pvc_controller::app::ports::{ActuatorPort, BroadcastPort, ClockPort, EventSink, SensorPort};
use pvc_controller::bus::{BusMessage, CanId};
use pvc_controller::drivers::PathOutput;
use pvc_controller::error::{ActuatorError, BusError, Error, SensorError};
use pvc_controller::fsm::ControllerState;
use pvc_controller::sensors::{InputLevels, IsolationCode, VoltageChannel};

// ── Recorded calls ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum HwCall {
    SetOutput(PathOutput, bool),
    SetContactor { open: bool },
    Broadcast(BusMessage),
}

// ── MockHardware ─────────────────────────────────────────────

pub struct MockHardware {
    pub calls: Vec<HwCall>,
    pub now_ms: u64,

    pub inputs: InputLevels,
    pub precharge_dv: u8,
    pub pack_dv: u8,
    pub isolation: Result<IsolationCode, Error>,
    pub isolation_reads: u32,

    pub fail_inputs: bool,
    pub fail_voltages: bool,
    /// Coil pulses fail; the contactor stays where it is.
    pub stuck_contactor: bool,

    outputs: [bool; 3],
    contactor_open: bool,
    /// (open, close) coil pulses actually fired.
    pub coil_pulses: (u32, u32),
}

impl MockHardware {
    /// Key off, batteries good, e-stop loop closed, pack at 10.0 V and the
    /// bus discharged.
    pub fn healthy() -> Self {
        Self {
            calls: Vec::new(),
            now_ms: 0,
            inputs: InputLevels {
                key: false,
                battery1_ok: true,
                battery2_ok: true,
                estop_active: true,
            },
            precharge_dv: 0,
            pack_dv: 100,
            isolation: Ok(IsolationCode::NoFault),
            isolation_reads: 0,
            fail_inputs: false,
            fail_voltages: false,
            stuck_contactor: false,
            outputs: [false; 3],
            contactor_open: true,
            coil_pulses: (0, 0),
        }
    }

    pub fn advance(&mut self, ms: u64) {
        self.now_ms += ms;
    }

    #[allow(dead_code)]
    pub fn output(&self, output: PathOutput) -> bool {
        self.outputs[output as usize]
    }

    #[allow(dead_code)]
    pub fn contactor_open_now(&self) -> bool {
        self.contactor_open
    }

    #[allow(dead_code)]
    pub fn broadcasts(&self) -> Vec<&BusMessage> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                HwCall::Broadcast(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    #[allow(dead_code)]
    pub fn broadcasts_with_id(&self, raw: u16) -> usize {
        self.broadcasts()
            .iter()
            .filter(|m| m.id == CanId::Standard(raw))
            .count()
    }

    #[allow(dead_code)]
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }
}

impl SensorPort for MockHardware {
    fn read_inputs(&mut self) -> Result<InputLevels, SensorError> {
        if self.fail_inputs {
            return Err(SensorError::GpioReadFailed);
        }
        Ok(self.inputs)
    }

    fn read_voltage(&mut self, channel: VoltageChannel) -> Result<u8, SensorError> {
        if self.fail_voltages {
            return Err(SensorError::SpiReadFailed);
        }
        Ok(match channel {
            VoltageChannel::PrechargeSide => self.precharge_dv,
            VoltageChannel::Pack => self.pack_dv,
        })
    }

    fn read_isolation(&mut self) -> Result<IsolationCode, Error> {
        self.isolation_reads += 1;
        self.isolation
    }
}

impl ActuatorPort for MockHardware {
    fn set_output(&mut self, output: PathOutput, on: bool) -> Result<(), ActuatorError> {
        self.outputs[output as usize] = on;
        self.calls.push(HwCall::SetOutput(output, on));
        Ok(())
    }

    fn set_contactor_open(&mut self, open: bool) -> Result<(), ActuatorError> {
        self.calls.push(HwCall::SetContactor { open });
        if open == self.contactor_open {
            return Ok(());
        }
        if self.stuck_contactor {
            return Err(ActuatorError::CoilPulseFailed);
        }
        if open {
            self.coil_pulses.0 += 1;
        } else {
            self.coil_pulses.1 += 1;
        }
        self.contactor_open = open;
        Ok(())
    }

    fn contactor_open(&self) -> bool {
        self.contactor_open
    }
}

impl BroadcastPort for MockHardware {
    fn broadcast(&mut self, msg: &BusMessage) -> Result<(), BusError> {
        self.calls.push(HwCall::Broadcast(msg.clone()));
        Ok(())
    }
}

impl ClockPort for MockHardware {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }
}

// ── Event recorder ───────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(from, to)` of every `StateChanged`, in order.
    #[allow(dead_code)]
    pub fn transitions(&self) -> Vec<(ControllerState, ControllerState)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::StateChanged { from, to, .. } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    #[allow(dead_code)]
    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
