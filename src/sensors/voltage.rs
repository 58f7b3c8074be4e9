//! MAX22530 isolated ADC: pack and pre-charge node voltage sense.
//!
//! Each channel is a 12-bit conversion left in a 16-bit register.  The
//! front end divides the bus by 61 against a 1.8 V reference, so
//!
//! ```text
//! dV = count * 1.8 * 61 / 4096 = count * 1098 / 40960
//! ```
//!
//! computed in integer arithmetic (truncating) and clamped to `u8`
//! decivolts.

use embedded_hal::spi::{Operation, SpiDevice};
use log::error;

use crate::error::SensorError;

/// ADC register for each sensed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VoltageChannel {
    /// Load side of the pre-charge resistor (the bus being charged).
    PrechargeSide = 0x01,
    /// Battery pack terminals.
    Pack = 0x02,
}

impl VoltageChannel {
    /// SPI command header for a single-register read.
    pub const fn read_header(self) -> u8 {
        (self as u8) << 2
    }
}

/// Convert a raw ADC register value to decivolts.
pub fn counts_to_decivolts(count: u16) -> u8 {
    let dv = u32::from(count) * 1098 / 40960;
    dv.min(u32::from(u8::MAX)) as u8
}

/// MAX22530 driver over any `embedded-hal` SPI device.
pub struct VoltageSense<SPI> {
    spi: SPI,
}

impl<SPI: SpiDevice> VoltageSense<SPI> {
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    /// Read one channel and return decivolts.
    pub fn read_channel(&mut self, channel: VoltageChannel) -> Result<u8, SensorError> {
        let count = self.read_register(channel)?;
        Ok(counts_to_decivolts(count))
    }

    fn read_register(&mut self, channel: VoltageChannel) -> Result<u16, SensorError> {
        let header = [channel.read_header()];
        let mut reply = [0u8; 2];
        self.spi
            .transaction(&mut [Operation::Write(&header), Operation::Read(&mut reply)])
            .map_err(|_| {
                error!("MAX22530: SPI read of {:?} failed", channel);
                SensorError::SpiReadFailed
            })?;
        Ok(u16::from_be_bytes(reply))
    }

    /// Release the SPI device.
    pub fn release(self) -> SPI {
        self.spi
    }
}
