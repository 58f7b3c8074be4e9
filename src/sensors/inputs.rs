//! Digital interlock inputs: ignition key, battery-ok lines, e-stop.

use embedded_hal::digital::InputPin;

use crate::error::SensorError;

/// Logical levels of the interlock inputs for one cycle.
///
/// `estop_active` follows the wiring: the e-stop loop is closed (HIGH)
/// while the machine may run, so `true` means *not* stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputLevels {
    pub key: bool,
    pub battery1_ok: bool,
    pub battery2_ok: bool,
    pub estop_active: bool,
}

impl InputLevels {
    /// Physical e-stop button pressed.
    pub fn estop_asserted(&self) -> bool {
        !self.estop_active
    }
}

/// Something that can sample the four interlock inputs.
pub trait InputBank {
    fn sample(&mut self) -> Result<InputLevels, SensorError>;
}

/// Interlock inputs wired to four GPIOs.
pub struct BoardInputs<KEY, B1, B2, ES> {
    key: KEY,
    battery1: B1,
    battery2: B2,
    estop: ES,
}

impl<KEY, B1, B2, ES> BoardInputs<KEY, B1, B2, ES>
where
    KEY: InputPin,
    B1: InputPin,
    B2: InputPin,
    ES: InputPin,
{
    pub fn new(key: KEY, battery1: B1, battery2: B2, estop: ES) -> Self {
        Self {
            key,
            battery1,
            battery2,
            estop,
        }
    }
}

impl<KEY, B1, B2, ES> InputBank for BoardInputs<KEY, B1, B2, ES>
where
    KEY: InputPin,
    B1: InputPin,
    B2: InputPin,
    ES: InputPin,
{
    fn sample(&mut self) -> Result<InputLevels, SensorError> {
        Ok(InputLevels {
            key: level(&mut self.key)?,
            battery1_ok: level(&mut self.battery1)?,
            battery2_ok: level(&mut self.battery2)?,
            estop_active: level(&mut self.estop)?,
        })
    }
}

fn level<P: InputPin>(pin: &mut P) -> Result<bool, SensorError> {
    pin.is_high().map_err(|_| SensorError::GpioReadFailed)
}
