//! Active-high path outputs: pre-charge relay, discharge relay, APM enable.

use embedded_hal::digital::OutputPin;
use log::debug;

use crate::error::ActuatorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOutput {
    Precharge,
    Discharge,
    /// Auxiliary power module (DC/DC) enable.
    Apm,
}

impl PathOutput {
    pub const ALL: [PathOutput; 3] = [Self::Precharge, Self::Discharge, Self::Apm];
}

/// Something that can drive the three path outputs.
pub trait OutputBank {
    fn set(&mut self, output: PathOutput, on: bool) -> Result<(), ActuatorError>;
    fn is_on(&self, output: PathOutput) -> bool;
}

pub struct PathOutputs<PC, DC, APM> {
    precharge: PC,
    discharge: DC,
    apm: APM,
    /// Commanded levels, indexed by `PathOutput as usize`.
    levels: [bool; 3],
}

impl<PC, DC, APM> PathOutputs<PC, DC, APM>
where
    PC: OutputPin,
    DC: OutputPin,
    APM: OutputPin,
{
    /// Every output is driven low before the bank is returned.
    pub fn new(precharge: PC, discharge: DC, apm: APM) -> Result<Self, ActuatorError> {
        let mut bank = Self {
            precharge,
            discharge,
            apm,
            levels: [false; 3],
        };
        for output in PathOutput::ALL {
            bank.set(output, false)?;
        }
        Ok(bank)
    }
}

impl<PC, DC, APM> OutputBank for PathOutputs<PC, DC, APM>
where
    PC: OutputPin,
    DC: OutputPin,
    APM: OutputPin,
{
    fn set(&mut self, output: PathOutput, on: bool) -> Result<(), ActuatorError> {
        let result = match output {
            PathOutput::Precharge => drive(&mut self.precharge, on),
            PathOutput::Discharge => drive(&mut self.discharge, on),
            PathOutput::Apm => drive(&mut self.apm, on),
        };
        if result.is_ok() && self.levels[output as usize] != on {
            debug!("{:?} -> {}", output, if on { "on" } else { "off" });
            self.levels[output as usize] = on;
        }
        result
    }

    fn is_on(&self, output: PathOutput) -> bool {
        self.levels[output as usize]
    }
}

fn drive<P: OutputPin>(pin: &mut P, on: bool) -> Result<(), ActuatorError> {
    let r = if on { pin.set_high() } else { pin.set_low() };
    r.map_err(|_| ActuatorError::GpioWriteFailed)
}
