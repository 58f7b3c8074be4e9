//! CAN message catalogue: broadcasts the controller originates and the
//! 7-byte state-change record.
//!
//! | Message                | Id      | Data                               |
//! |------------------------|---------|------------------------------------|
//! | TMS wake (NMT start)   | `0x000` | `[0x01, node]`                     |
//! | TMS sleep (NMT pre-op) | `0x000` | `[0x80, node]`                     |
//! | BMS reset              | `0x7FF` | `00 01 02 03 04 05 06 07`, sent 5x |
//! | Status record          | `0x48A` | see [`ChangeNotification`]         |

use embedded_can::{ExtendedId, Frame, Id, StandardId};
use heapless::Vec;

use crate::error::BusError;
use crate::fsm::ControllerState;
use crate::fsm::context::Broadcast;

pub const NMT_ID: u16 = 0x000;
pub const NMT_START: u8 = 0x01;
pub const NMT_PRE_OPERATIONAL: u8 = 0x80;
pub const BMS_RESET_ID: u16 = 0x7FF;
pub const BMS_RESET_PAYLOAD: [u8; 8] = [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
/// The BMS reset is fire-and-forget; it is repeated to survive a lost frame.
pub const BMS_RESET_REPEATS: u8 = 5;
pub const STATUS_ID: u16 = 0x48A;

/// Identifier width-agnostic CAN id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanId {
    Standard(u16),
    Extended(u32),
}

impl CanId {
    fn to_id(self) -> Result<Id, BusError> {
        match self {
            Self::Standard(raw) => StandardId::new(raw)
                .map(Id::Standard)
                .ok_or(BusError::InvalidFrame),
            Self::Extended(raw) => ExtendedId::new(raw)
                .map(Id::Extended)
                .ok_or(BusError::InvalidFrame),
        }
    }
}

/// An outbound data frame, independent of any CAN driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub id: CanId,
    pub data: Vec<u8, 8>,
}

impl BusMessage {
    pub fn new(id: CanId, data: &[u8]) -> Result<Self, BusError> {
        let data = Vec::from_slice(data).map_err(|_| BusError::InvalidFrame)?;
        Ok(Self { id, data })
    }

    /// Fixed catalogue frames; every payload here is at most 8 bytes.
    fn standard(id: u16, data: &[u8]) -> Self {
        Self {
            id: CanId::Standard(id),
            data: Vec::from_slice(data).unwrap_or_default(),
        }
    }

    pub fn tms_wake(node: u8) -> Self {
        Self::standard(NMT_ID, &[NMT_START, node])
    }

    pub fn tms_sleep(node: u8) -> Self {
        Self::standard(NMT_ID, &[NMT_PRE_OPERATIONAL, node])
    }

    pub fn bms_reset() -> Self {
        Self::standard(BMS_RESET_ID, &BMS_RESET_PAYLOAD)
    }

    pub fn status(record: &ChangeNotification) -> Self {
        Self::standard(STATUS_ID, &record.encode())
    }

    /// Message and repeat count for a handler-requested broadcast.
    pub fn for_broadcast(msg: Broadcast, tms_node: u8) -> (Self, u8) {
        match msg {
            Broadcast::TmsWake => (Self::tms_wake(tms_node), 1),
            Broadcast::TmsSleep => (Self::tms_sleep(tms_node), 1),
            Broadcast::BmsReset => (Self::bms_reset(), BMS_RESET_REPEATS),
        }
    }

    /// Build a driver frame.
    pub fn to_frame<F: Frame>(&self) -> Result<F, BusError> {
        F::new(self.id.to_id()?, &self.data).ok_or(BusError::InvalidFrame)
    }
}

// ---------------------------------------------------------------------------
// State-change record
// ---------------------------------------------------------------------------

/// Snapshot sent once per distinct state transition.
///
/// ```text
/// byte 0  state ordinal
/// byte 1  0x00
/// byte 2  key    << 4 | sto
/// byte 3  batt1  << 4 | batt2
/// byte 4  estop  << 4 | apm        (estop: 1 = loop closed, not pressed)
/// byte 5  pc     << 4 | dc
/// byte 6  cont   << 4 | volt       (cont: 1 = closed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeNotification {
    pub state: ControllerState,
    /// Key after the fault latch.
    pub key: bool,
    pub sto: bool,
    pub battery1_ok: bool,
    pub battery2_ok: bool,
    pub estop_active: bool,
    pub apm: bool,
    pub precharge: bool,
    pub discharge: bool,
    pub contactor_closed: bool,
    pub pack_voltage_ok: bool,
}

impl ChangeNotification {
    pub const LEN: usize = 7;

    pub fn encode(&self) -> [u8; Self::LEN] {
        let pair = |hi: bool, lo: bool| (u8::from(hi) << 4) | u8::from(lo);
        [
            self.state.ordinal(),
            0x00,
            pair(self.key, self.sto),
            pair(self.battery1_ok, self.battery2_ok),
            pair(self.estop_active, self.apm),
            pair(self.precharge, self.discharge),
            pair(self.contactor_closed, self.pack_voltage_ok),
        ]
    }

    /// Parse a record.  Nibbles must be 0 or 1 and byte 1 must be zero.
    pub fn decode(data: &[u8]) -> Result<Self, BusError> {
        if data.len() != Self::LEN || data[1] != 0 {
            return Err(BusError::MalformedResponse);
        }
        let state = ControllerState::from_wire(data[0]).ok_or(BusError::MalformedResponse)?;
        let flag = |nibble: u8| match nibble {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(BusError::MalformedResponse),
        };
        let split = |b: u8| -> Result<(bool, bool), BusError> { Ok((flag(b >> 4)?, flag(b & 0x0F)?)) };

        let (key, sto) = split(data[2])?;
        let (battery1_ok, battery2_ok) = split(data[3])?;
        let (estop_active, apm) = split(data[4])?;
        let (precharge, discharge) = split(data[5])?;
        let (contactor_closed, pack_voltage_ok) = split(data[6])?;
        Ok(Self {
            state,
            key,
            sto,
            battery1_ok,
            battery2_ok,
            estop_active,
            apm,
            precharge,
            discharge,
            contactor_closed,
            pack_voltage_ok,
        })
    }
}
