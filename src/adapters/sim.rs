//! Simulated plant for host runs.
//!
//! A shared [`PlantState`] models the pack, the capacitive bus behind the
//! pre-charge resistor, the operator inputs and an isolation monitor.  The
//! handles handed out by [`Plant`] implement the `embedded-hal` and
//! `embedded-can` traits, so the real drivers (`BoardInputs`,
//! `PathOutputs`, `Contactor`, `VoltageSense`, `Sim100`) run unchanged on
//! top of it through [`HardwareAdapter`].
//!
//! ```text
//!   pack ──[R]──┬── bus (C) ──[discharge R]── gnd
//!        └─/ ───┘  main contactor
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_can::blocking::Can;
use embedded_can::{ErrorKind, ExtendedId, Frame, Id};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType as PinErrorType, InputPin, OutputPin};
use embedded_hal::spi::{ErrorType as SpiErrorType, Operation, SpiDevice};
use heapless::Vec;
use log::trace;

use crate::app::ports::ClockPort;
use crate::config::BoardProfile;
use crate::drivers::{Contactor, PathOutputs};
use crate::error::ActuatorError;
use crate::sensors::BoardInputs;
use crate::sensors::isolation::{REQUEST_ID, RESPONSE_ID, Sim100Command};

use super::hardware::HardwareAdapter;
use super::time::ManualClock;

/// The full driver stack wired to the simulated plant.
pub type SimHardware = HardwareAdapter<
    BoardInputs<SimInput, SimInput, SimInput, SimInput>,
    PathOutputs<SimOutput, SimOutput, SimOutput>,
    Contactor<SimOutput, SimOutput, SimDelay>,
    SimSpi,
    SimCan,
    ManualClock,
>;

/// Everything the simulated board can observe or change.
#[derive(Debug)]
pub struct PlantState {
    pub pack_dv: f32,
    pub bus_dv: f32,
    pub key: bool,
    pub battery1_ok: bool,
    pub battery2_ok: bool,
    /// E-stop loop closed (not pressed).
    pub estop_active: bool,
    /// Status byte the isolation monitor reports.
    pub isolation_status: u8,
    /// Isolation monitor ignores requests.
    pub isolation_silent: bool,
    pub precharge_on: bool,
    pub discharge_on: bool,
    pub apm_on: bool,
    pub contactor_closed: bool,
    /// Coil pulses seen, open and close.
    pub coil_pulses: (u32, u32),
    /// Every frame put on the bus, in order.
    pub transmitted: std::vec::Vec<SimFrame>,
    rx: VecDeque<SimFrame>,
    tau_ms: f32,
    sub_ms_ns: u32,
}

/// Handle to the simulated plant.  Clones share state and time.
#[derive(Clone)]
pub struct Plant {
    state: Rc<RefCell<PlantState>>,
    clock: ManualClock,
}

impl Plant {
    /// A healthy, idle plant: key off, interlocks good, bus discharged.
    pub fn new(profile: &BoardProfile, pack_dv: u8) -> Self {
        let state = PlantState {
            pack_dv: f32::from(pack_dv),
            bus_dv: 0.0,
            key: false,
            battery1_ok: true,
            battery2_ok: true,
            estop_active: true,
            isolation_status: 0x00,
            isolation_silent: false,
            precharge_on: false,
            discharge_on: false,
            apm_on: false,
            contactor_closed: false,
            coil_pulses: (0, 0),
            transmitted: std::vec::Vec::new(),
            rx: VecDeque::new(),
            tau_ms: profile.tau_ms(),
            sub_ms_ns: 0,
        };
        Self {
            state: Rc::new(RefCell::new(state)),
            clock: ManualClock::new(),
        }
    }

    /// Wire the real drivers to this plant.  Outputs and coils start low.
    pub fn hardware(&self, profile: &BoardProfile) -> Result<SimHardware, ActuatorError> {
        let input = |line| SimInput {
            plant: self.clone(),
            line,
        };
        let output = |line| SimOutput {
            plant: self.clone(),
            line,
        };
        let inputs = BoardInputs::new(
            input(InputLine::Key),
            input(InputLine::Battery1),
            input(InputLine::Battery2),
            input(InputLine::EStop),
        );
        let outputs = PathOutputs::new(
            output(OutputLine::Precharge),
            output(OutputLine::Discharge),
            output(OutputLine::Apm),
        )?;
        let contactor = Contactor::new(
            output(OutputLine::OpenCoil),
            output(OutputLine::CloseCoil),
            SimDelay { plant: self.clone() },
            profile.contactor_pulse_ms,
        )?;
        Ok(HardwareAdapter::new(
            inputs,
            outputs,
            contactor,
            SimSpi { plant: self.clone() },
            self.can(),
            self.clock.clone(),
        ))
    }

    /// Another handle on the simulated CAN bus.
    pub fn can(&self) -> SimCan {
        SimCan { plant: self.clone() }
    }

    pub fn clock(&self) -> ManualClock {
        self.clock.clone()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Let `ms` of plant time pass.
    pub fn advance(&self, ms: u64) {
        self.state.borrow_mut().settle(ms as f32);
        self.clock.advance(ms);
    }

    fn advance_ns(&self, ns: u32) {
        let whole_ms = {
            let mut s = self.state.borrow_mut();
            let total = s.sub_ms_ns + ns;
            s.sub_ms_ns = total % 1_000_000;
            total / 1_000_000
        };
        if whole_ms > 0 {
            self.advance(u64::from(whole_ms));
        }
    }

    /// Inspect or change the plant.
    pub fn with<R>(&self, f: impl FnOnce(&mut PlantState) -> R) -> R {
        f(&mut self.state.borrow_mut())
    }

    pub fn set_key(&self, on: bool) {
        self.with(|s| s.key = on);
    }

    pub fn press_estop(&self, pressed: bool) {
        self.with(|s| s.estop_active = !pressed);
    }

    pub fn bus_dv(&self) -> f32 {
        self.with(|s| s.bus_dv)
    }

    /// Frames transmitted with the given standard or extended raw id.
    pub fn frames_with_id(&self, raw: u32) -> std::vec::Vec<SimFrame> {
        self.with(|s| {
            s.transmitted
                .iter()
                .filter(|f| f.raw_id() == raw)
                .cloned()
                .collect()
        })
    }
}

impl PlantState {
    /// RC physics over `dt_ms`.
    fn settle(&mut self, dt_ms: f32) {
        if self.contactor_closed {
            self.bus_dv = self.pack_dv;
            return;
        }
        let decay = (-dt_ms / self.tau_ms).exp();
        if self.precharge_on {
            self.bus_dv = self.pack_dv + (self.bus_dv - self.pack_dv) * decay;
        }
        if self.discharge_on {
            self.bus_dv *= decay;
        }
    }

    /// Queue the isolation monitor's answer to a request frame.
    fn answer(&mut self, request: &SimFrame) {
        if self.isolation_silent {
            return;
        }
        let Some(&code) = request.data.first() else {
            return;
        };
        let Some(command) = Sim100Command::ALL.into_iter().find(|c| c.code() == code) else {
            return;
        };
        let status = [self.isolation_status];
        let volts = ((self.pack_dv / 10.0) as u16).to_be_bytes();
        let body: &[u8] = match command {
            Sim100Command::IsolationState => &status,
            Sim100Command::BatteryVoltage => &volts,
            Sim100Command::Temperature => &[0, 0, 0, 25],
            Sim100Command::ErrorFlags => &[0],
            Sim100Command::VnHighRes | Sim100Command::VpHighRes => &[0; 4],
            Sim100Command::Resistances | Sim100Command::Capacitances | Sim100Command::VpVn => &[0; 6],
            Sim100Command::DisableExcitation | Sim100Command::Restart | Sim100Command::SetMaxVoltage => &[],
        };
        let mut data: Vec<u8, 8> = Vec::new();
        let _ = data.push(code);
        let _ = data.extend_from_slice(body);
        if let Some(id) = ExtendedId::new(RESPONSE_ID) {
            self.rx.push_back(SimFrame {
                id: Id::Extended(id),
                data,
            });
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Pins
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum InputLine {
    Key,
    Battery1,
    Battery2,
    EStop,
}

pub struct SimInput {
    plant: Plant,
    line: InputLine,
}

impl PinErrorType for SimInput {
    type Error = Infallible;
}

impl InputPin for SimInput {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.plant.with(|s| match self.line {
            InputLine::Key => s.key,
            InputLine::Battery1 => s.battery1_ok,
            InputLine::Battery2 => s.battery2_ok,
            InputLine::EStop => s.estop_active,
        }))
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        self.is_high().map(|high| !high)
    }
}

#[derive(Debug, Clone, Copy)]
enum OutputLine {
    Precharge,
    Discharge,
    Apm,
    OpenCoil,
    CloseCoil,
}

pub struct SimOutput {
    plant: Plant,
    line: OutputLine,
}

impl SimOutput {
    fn drive(&mut self, high: bool) {
        let line = self.line;
        self.plant.with(|s| match line {
            OutputLine::Precharge => s.precharge_on = high,
            OutputLine::Discharge => s.discharge_on = high,
            OutputLine::Apm => s.apm_on = high,
            OutputLine::OpenCoil if high => {
                s.contactor_closed = false;
                s.coil_pulses.0 += 1;
            }
            OutputLine::CloseCoil if high => {
                s.contactor_closed = true;
                s.coil_pulses.1 += 1;
            }
            OutputLine::OpenCoil | OutputLine::CloseCoil => {}
        });
    }
}

impl PinErrorType for SimOutput {
    type Error = Infallible;
}

impl OutputPin for SimOutput {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.drive(true);
        Ok(())
    }
}

/// Delays advance plant time instead of sleeping.
pub struct SimDelay {
    plant: Plant,
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.plant.advance_ns(ns);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.plant.advance(u64::from(ms));
    }
}

// ───────────────────────────────────────────────────────────────
// Voltage-sense ADC
// ───────────────────────────────────────────────────────────────

/// Answers register reads with the plant voltages as ADC counts.
pub struct SimSpi {
    plant: Plant,
}

/// Smallest count that converts back to at least `dv`.
fn decivolts_to_counts(dv: f32) -> u16 {
    let whole = dv.max(0.0).floor() as u32;
    ((whole * 40_960 + 1_097) / 1_098).min(u32::from(u16::MAX)) as u16
}

impl SpiErrorType for SimSpi {
    type Error = Infallible;
}

impl SpiDevice for SimSpi {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Infallible> {
        let mut register = 0;
        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => register = bytes.first().map_or(0, |h| h >> 2),
                Operation::Read(buf) => {
                    let dv = self.plant.with(|s| match register {
                        0x01 => s.bus_dv,
                        0x02 => s.pack_dv,
                        _ => 0.0,
                    });
                    let counts = decivolts_to_counts(dv).to_be_bytes();
                    for (dst, src) in buf.iter_mut().zip(counts) {
                        *dst = src;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// CAN
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimFrame {
    pub id: Id,
    pub data: Vec<u8, 8>,
}

impl SimFrame {
    pub fn raw_id(&self) -> u32 {
        match self.id {
            Id::Standard(id) => u32::from(id.as_raw()),
            Id::Extended(id) => id.as_raw(),
        }
    }
}

impl Frame for SimFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        Some(Self {
            id: id.into(),
            data: Vec::from_slice(data).ok()?,
        })
    }

    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        self.data.len()
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Bus handle: records every transmitted frame and lets the simulated
/// isolation monitor answer its requests.
pub struct SimCan {
    plant: Plant,
}

impl Can for SimCan {
    type Frame = SimFrame;
    type Error = ErrorKind;

    fn transmit(&mut self, frame: &SimFrame) -> Result<(), ErrorKind> {
        trace!("CAN tx {:08X} {:02X?}", frame.raw_id(), frame.data.as_slice());
        self.plant.with(|s| {
            s.transmitted.push(frame.clone());
            if frame.is_extended() && frame.raw_id() == REQUEST_ID {
                s.answer(frame);
            }
        });
        Ok(())
    }

    fn receive(&mut self) -> Result<SimFrame, ErrorKind> {
        self.plant.with(|s| s.rx.pop_front()).ok_or(ErrorKind::Overrun)
    }
}
