//! Sendyne SIM100 isolation monitor over CAN.
//!
//! Request/response protocol on extended identifiers: commands go to
//! [`REQUEST_ID`], replies come back on [`RESPONSE_ID`] with the command
//! byte echoed in `data[0]`.  Multi-byte fields are big-endian.
//!
//! The driver does not own the bus; each call borrows it so the same
//! controller can also carry the broadcasts.

use embedded_can::blocking::Can;
use embedded_can::{ExtendedId, Frame, Id};
use heapless::Vec;
use log::{debug, warn};

use crate::error::BusError;

/// Extended identifier the SIM100 listens on.
pub const REQUEST_ID: u32 = 0x0A10_0101;
/// Extended identifier the SIM100 answers on.
pub const RESPONSE_ID: u32 = 0x0A10_0100;
/// Frames examined while waiting for a matching reply.
pub const MAX_RECEIVE_ATTEMPTS: u8 = 10;

// ---------------------------------------------------------------------------
// Isolation verdict
// ---------------------------------------------------------------------------

/// Two-bit isolation status reported in the low bits of the status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationCode {
    /// `00`: isolation good.
    NoFault,
    /// `01`: monitor has no valid measurement yet.
    Indeterminate,
    /// `10`: resistance below the warning threshold.
    Warning,
    /// `11`: ground fault.
    Fault,
}

impl IsolationCode {
    pub fn from_status(status: u8) -> Self {
        match status & 0b11 {
            0b00 => Self::NoFault,
            0b01 => Self::Indeterminate,
            0b10 => Self::Warning,
            _ => Self::Fault,
        }
    }

    /// Codes the interlock accepts.  A warning still permits operation.
    pub fn is_ok(self) -> bool {
        matches!(self, Self::NoFault | Self::Warning)
    }
}

// ---------------------------------------------------------------------------
// Command set
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Sim100Command {
    VnHighRes = 0x60,
    VpHighRes = 0x61,
    DisableExcitation = 0x62,
    Temperature = 0x80,
    IsolationState = 0xE0,
    Resistances = 0xE1,
    Capacitances = 0xE2,
    VpVn = 0xE3,
    BatteryVoltage = 0xE4,
    ErrorFlags = 0xE5,
    Restart = 0xC1,
    SetMaxVoltage = 0xF0,
}

impl Sim100Command {
    pub const ALL: [Sim100Command; 12] = [
        Self::VnHighRes,
        Self::VpHighRes,
        Self::DisableExcitation,
        Self::Temperature,
        Self::IsolationState,
        Self::Resistances,
        Self::Capacitances,
        Self::VpVn,
        Self::BatteryVoltage,
        Self::ErrorFlags,
        Self::Restart,
        Self::SetMaxVoltage,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Bytes required after the echoed command byte.
    const fn payload_len(self) -> usize {
        match self {
            Self::VnHighRes | Self::VpHighRes | Self::Temperature => 4,
            Self::IsolationState | Self::ErrorFlags => 1,
            Self::Resistances | Self::Capacitances | Self::VpVn => 6,
            Self::BatteryVoltage => 2,
            Self::DisableExcitation | Self::Restart | Self::SetMaxVoltage => 0,
        }
    }
}

/// Decoded reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sim100Reading {
    /// High-resolution Vn or Vp, signed raw units.
    HighRes(i32),
    Temperature(i32),
    Isolation { status: u8, code: IsolationCode },
    /// Raw resistance or capacitance block (value/uncertainty pairs).
    RawBlock(Vec<u8, 7>),
    VpVn { vp: u16, vn: u16 },
    BatteryVoltage(u16),
    ErrorFlags(u8),
    /// Command acknowledged with no data.
    Ack,
}

/// Decode the data field of a reply to `command`.
///
/// `data[0]` must echo the command.  Extra trailing bytes are ignored.
pub fn decode_response(command: Sim100Command, data: &[u8]) -> Result<Sim100Reading, BusError> {
    let (&echo, body) = data.split_first().ok_or(BusError::MalformedResponse)?;
    if echo != command.code() || body.len() < command.payload_len() {
        return Err(BusError::MalformedResponse);
    }

    let be_i32 = |b: &[u8]| i32::from_be_bytes([b[0], b[1], b[2], b[3]]);
    let be_u16 = |b: &[u8]| u16::from_be_bytes([b[0], b[1]]);

    let reading = match command {
        Sim100Command::VnHighRes | Sim100Command::VpHighRes => Sim100Reading::HighRes(be_i32(body)),
        Sim100Command::Temperature => Sim100Reading::Temperature(be_i32(body)),
        Sim100Command::IsolationState => Sim100Reading::Isolation {
            status: body[0],
            code: IsolationCode::from_status(body[0]),
        },
        Sim100Command::Resistances | Sim100Command::Capacitances => {
            let mut block = Vec::new();
            block
                .extend_from_slice(&body[..command.payload_len()])
                .map_err(|_| BusError::MalformedResponse)?;
            Sim100Reading::RawBlock(block)
        }
        // [vp_hi, vp_lo, vp_unc, vn_hi, vn_lo, vn_unc]
        Sim100Command::VpVn => Sim100Reading::VpVn {
            vp: be_u16(&body[0..2]),
            vn: be_u16(&body[3..5]),
        },
        Sim100Command::BatteryVoltage => Sim100Reading::BatteryVoltage(be_u16(body)),
        Sim100Command::ErrorFlags => Sim100Reading::ErrorFlags(body[0]),
        Sim100Command::DisableExcitation | Sim100Command::Restart | Sim100Command::SetMaxVoltage => {
            Sim100Reading::Ack
        }
    };
    Ok(reading)
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// SIM100 request/response driver.
#[derive(Debug, Default)]
pub struct Sim100;

impl Sim100 {
    pub fn new() -> Self {
        Self
    }

    /// Send `command` with an optional argument and wait for its reply.
    pub fn request<B: Can>(
        &self,
        bus: &mut B,
        command: Sim100Command,
        args: &[u8],
    ) -> Result<Sim100Reading, BusError> {
        let mut payload: Vec<u8, 8> = Vec::new();
        payload
            .push(command.code())
            .map_err(|_| BusError::InvalidFrame)?;
        payload
            .extend_from_slice(args)
            .map_err(|_| BusError::InvalidFrame)?;

        let id = ExtendedId::new(REQUEST_ID).ok_or(BusError::InvalidFrame)?;
        let frame = B::Frame::new(id, &payload).ok_or(BusError::InvalidFrame)?;
        bus.transmit(&frame).map_err(|_| BusError::TransmitFailed)?;

        let mut receive_failed = false;
        for _ in 0..MAX_RECEIVE_ATTEMPTS {
            let frame = match bus.receive() {
                Ok(f) => f,
                Err(_) => {
                    receive_failed = true;
                    continue;
                }
            };
            if !is_reply_to(&frame, command) {
                debug!("SIM100: skipping unrelated frame {:?}", frame.id());
                continue;
            }
            return decode_response(command, frame.data());
        }

        warn!("SIM100: no reply to 0x{:02X}", command.code());
        if receive_failed {
            Err(BusError::ReceiveFailed)
        } else {
            Err(BusError::NoResponse)
        }
    }

    pub fn isolation_state<B: Can>(&self, bus: &mut B) -> Result<IsolationCode, BusError> {
        match self.request(bus, Sim100Command::IsolationState, &[])? {
            Sim100Reading::Isolation { code, .. } => Ok(code),
            _ => Err(BusError::MalformedResponse),
        }
    }

    pub fn vn_high_res<B: Can>(&self, bus: &mut B) -> Result<i32, BusError> {
        self.high_res(bus, Sim100Command::VnHighRes)
    }

    pub fn vp_high_res<B: Can>(&self, bus: &mut B) -> Result<i32, BusError> {
        self.high_res(bus, Sim100Command::VpHighRes)
    }

    fn high_res<B: Can>(&self, bus: &mut B, command: Sim100Command) -> Result<i32, BusError> {
        match self.request(bus, command, &[])? {
            Sim100Reading::HighRes(v) => Ok(v),
            _ => Err(BusError::MalformedResponse),
        }
    }

    pub fn temperature<B: Can>(&self, bus: &mut B) -> Result<i32, BusError> {
        match self.request(bus, Sim100Command::Temperature, &[])? {
            Sim100Reading::Temperature(t) => Ok(t),
            _ => Err(BusError::MalformedResponse),
        }
    }

    pub fn resistances<B: Can>(&self, bus: &mut B) -> Result<Vec<u8, 7>, BusError> {
        self.raw_block(bus, Sim100Command::Resistances)
    }

    pub fn capacitances<B: Can>(&self, bus: &mut B) -> Result<Vec<u8, 7>, BusError> {
        self.raw_block(bus, Sim100Command::Capacitances)
    }

    fn raw_block<B: Can>(&self, bus: &mut B, command: Sim100Command) -> Result<Vec<u8, 7>, BusError> {
        match self.request(bus, command, &[])? {
            Sim100Reading::RawBlock(block) => Ok(block),
            _ => Err(BusError::MalformedResponse),
        }
    }

    /// Returns `(vp, vn)`.
    pub fn vp_vn<B: Can>(&self, bus: &mut B) -> Result<(u16, u16), BusError> {
        match self.request(bus, Sim100Command::VpVn, &[])? {
            Sim100Reading::VpVn { vp, vn } => Ok((vp, vn)),
            _ => Err(BusError::MalformedResponse),
        }
    }

    pub fn battery_voltage<B: Can>(&self, bus: &mut B) -> Result<u16, BusError> {
        match self.request(bus, Sim100Command::BatteryVoltage, &[])? {
            Sim100Reading::BatteryVoltage(v) => Ok(v),
            _ => Err(BusError::MalformedResponse),
        }
    }

    pub fn error_flags<B: Can>(&self, bus: &mut B) -> Result<u8, BusError> {
        match self.request(bus, Sim100Command::ErrorFlags, &[])? {
            Sim100Reading::ErrorFlags(f) => Ok(f),
            _ => Err(BusError::MalformedResponse),
        }
    }

    pub fn restart<B: Can>(&self, bus: &mut B) -> Result<(), BusError> {
        self.request(bus, Sim100Command::Restart, &[]).map(|_| ())
    }

    pub fn disable_excitation<B: Can>(&self, bus: &mut B) -> Result<(), BusError> {
        self.request(bus, Sim100Command::DisableExcitation, &[])
            .map(|_| ())
    }

    /// Program the maximum expected battery voltage (volts).
    pub fn set_max_voltage<B: Can>(&self, bus: &mut B, volts: u16) -> Result<(), BusError> {
        self.request(bus, Sim100Command::SetMaxVoltage, &volts.to_be_bytes())
            .map(|_| ())
    }
}

fn is_reply_to<F: Frame>(frame: &F, command: Sim100Command) -> bool {
    let from_monitor = matches!(frame.id(), Id::Extended(id) if id.as_raw() == RESPONSE_ID);
    from_monitor && frame.data().first() == Some(&command.code())
}
