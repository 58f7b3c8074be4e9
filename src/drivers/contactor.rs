//! Bistable (latching) main contactor.
//!
//! Two momentary coil outputs: pulsing coil 1 opens the contacts, pulsing
//! coil 2 closes them.  The relay holds its position unpowered, so the
//! driver only pulses on an actual change of intent.
//!
//! ## Safety contract
//!
//! There is no auxiliary contact feedback.  [`Contactor::is_open`] reports
//! the last *commanded* position, updated only after the coil pulse has
//! completed.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::{error, info};

use crate::error::ActuatorError;

/// Logical contactor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactorIntent {
    Open,
    Closed,
}

impl ContactorIntent {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Anything that can move the main contactor.
pub trait ContactorControl {
    /// Move to the requested position.  A no-op if already there.
    fn set_open(&mut self, should_open: bool) -> Result<(), ActuatorError>;

    /// Last commanded position.
    fn is_open(&self) -> bool;
}

pub struct Contactor<OPEN, CLOSE, D> {
    open_coil: OPEN,
    close_coil: CLOSE,
    delay: D,
    pulse_ms: u32,
    is_open: bool,
}

impl<OPEN, CLOSE, D> Contactor<OPEN, CLOSE, D>
where
    OPEN: OutputPin,
    CLOSE: OutputPin,
    D: DelayNs,
{
    /// Both coils are driven low before the driver is returned.  The
    /// contacts are assumed open at power-up.
    pub fn new(
        mut open_coil: OPEN,
        mut close_coil: CLOSE,
        delay: D,
        pulse_ms: u32,
    ) -> Result<Self, ActuatorError> {
        open_coil
            .set_low()
            .map_err(|_| ActuatorError::GpioWriteFailed)?;
        close_coil
            .set_low()
            .map_err(|_| ActuatorError::GpioWriteFailed)?;
        Ok(Self {
            open_coil,
            close_coil,
            delay,
            pulse_ms,
            is_open: true,
        })
    }
}

impl<OPEN, CLOSE, D> ContactorControl for Contactor<OPEN, CLOSE, D>
where
    OPEN: OutputPin,
    CLOSE: OutputPin,
    D: DelayNs,
{
    fn set_open(&mut self, should_open: bool) -> Result<(), ActuatorError> {
        if should_open == self.is_open {
            return Ok(());
        }

        let result = if should_open {
            pulse(&mut self.open_coil, &mut self.delay, self.pulse_ms)
        } else {
            pulse(&mut self.close_coil, &mut self.delay, self.pulse_ms)
        };

        match result {
            Ok(()) => {
                self.is_open = should_open;
                info!(
                    "Contactor: {}",
                    if should_open { "opened" } else { "closed" }
                );
                Ok(())
            }
            Err(e) => {
                error!("Contactor: coil pulse failed, position unchanged");
                Err(e)
            }
        }
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}

/// Energise one coil for `ms`, then release it.  The release is attempted
/// even if raising the coil reported an error.
fn pulse<P: OutputPin, D: DelayNs>(coil: &mut P, delay: &mut D, ms: u32) -> Result<(), ActuatorError> {
    let raised = coil.set_high();
    delay.delay_ms(ms);
    let released = coil.set_low();
    match (raised, released) {
        (Ok(()), Ok(())) => Ok(()),
        _ => Err(ActuatorError::CoilPulseFailed),
    }
}
