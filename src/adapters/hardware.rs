//! Hardware adapter: bridges the board drivers to the domain port traits.
//!
//! Owns the input bank, the path outputs, the contactor, the voltage-sense
//! ADC, the CAN bus (shared by the isolation monitor and the broadcasts)
//! and a clock, exposing them through [`SensorPort`], [`ActuatorPort`],
//! [`BroadcastPort`] and [`ClockPort`].  Every driver is generic over the
//! `embedded-hal` / `embedded-can` traits, so the same adapter runs on the
//! board and against the simulated plant.

use embedded_can::blocking::Can;
use embedded_hal::spi::SpiDevice;

use crate::app::ports::{ActuatorPort, BroadcastPort, ClockPort, SensorPort};
use crate::bus::BusMessage;
use crate::drivers::{ContactorControl, OutputBank, PathOutput};
use crate::error::{ActuatorError, BusError, Error, SensorError};
use crate::sensors::{InputBank, InputLevels, IsolationCode, Sim100, VoltageChannel, VoltageSense};

/// Concrete adapter that combines all hardware behind port traits.
pub struct HardwareAdapter<I, O, K, S, B, T> {
    inputs: I,
    outputs: O,
    contactor: K,
    voltage: VoltageSense<S>,
    bus: B,
    isolation: Sim100,
    clock: T,
}

impl<I, O, K, S, B, T> HardwareAdapter<I, O, K, S, B, T>
where
    I: InputBank,
    O: OutputBank,
    K: ContactorControl,
    S: SpiDevice,
    B: Can,
    T: ClockPort,
{
    pub fn new(inputs: I, outputs: O, contactor: K, spi: S, bus: B, clock: T) -> Self {
        Self {
            inputs,
            outputs,
            contactor,
            voltage: VoltageSense::new(spi),
            bus,
            isolation: Sim100::new(),
            clock,
        }
    }

    /// Direct access to the isolation monitor for diagnostics beyond the
    /// isolation state (resistances, temperature, restart).
    pub fn isolation_monitor(&mut self) -> (&Sim100, &mut B) {
        (&self.isolation, &mut self.bus)
    }
}

// ── SensorPort implementation ─────────────────────────────────

impl<I, O, K, S, B, T> SensorPort for HardwareAdapter<I, O, K, S, B, T>
where
    I: InputBank,
    S: SpiDevice,
    B: Can,
{
    fn read_inputs(&mut self) -> Result<InputLevels, SensorError> {
        self.inputs.sample()
    }

    fn read_voltage(&mut self, channel: VoltageChannel) -> Result<u8, SensorError> {
        self.voltage.read_channel(channel)
    }

    fn read_isolation(&mut self) -> Result<IsolationCode, Error> {
        Ok(self.isolation.isolation_state(&mut self.bus)?)
    }
}

// ── ActuatorPort implementation ───────────────────────────────

impl<I, O, K, S, B, T> ActuatorPort for HardwareAdapter<I, O, K, S, B, T>
where
    O: OutputBank,
    K: ContactorControl,
{
    fn set_output(&mut self, output: PathOutput, on: bool) -> Result<(), ActuatorError> {
        self.outputs.set(output, on)
    }

    fn set_contactor_open(&mut self, open: bool) -> Result<(), ActuatorError> {
        self.contactor.set_open(open)
    }

    fn contactor_open(&self) -> bool {
        self.contactor.is_open()
    }
}

// ── BroadcastPort implementation ──────────────────────────────

impl<I, O, K, S, B, T> BroadcastPort for HardwareAdapter<I, O, K, S, B, T>
where
    B: Can,
{
    fn broadcast(&mut self, msg: &BusMessage) -> Result<(), BusError> {
        transmit(&mut self.bus, msg)
    }
}

impl<I, O, K, S, B, T> ClockPort for HardwareAdapter<I, O, K, S, B, T>
where
    T: ClockPort,
{
    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}

/// Encode and send one message on any `embedded-can` bus.
pub(crate) fn transmit<B: Can>(bus: &mut B, msg: &BusMessage) -> Result<(), BusError> {
    let frame: B::Frame = msg.to_frame()?;
    bus.transmit(&frame).map_err(|_| BusError::TransmitFailed)
}
