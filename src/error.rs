//! Unified error types for the pre-charge controller.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! control loop's error handling uniform.  All variants are `Copy` so they
//! can be handed through the interlock and FSM without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the controller funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A sensor could not be read.
    Sensor(SensorError),
    /// An actuator command failed.
    Actuator(ActuatorError),
    /// A CAN bus transaction failed.
    Bus(BusError),
    /// A safety interlock was violated.
    Safety(SafetyFault),
    /// Board profile is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::Safety(e) => write!(f, "safety: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// SPI register read of the voltage-sense chip failed.
    SpiReadFailed,
    /// A digital input could not be sampled.
    GpioReadFailed,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpiReadFailed => write!(f, "SPI read failed"),
            Self::GpioReadFailed => write!(f, "GPIO read failed"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// GPIO set failed.
    GpioWriteFailed,
    /// A contactor coil pulse could not be completed.
    CoilPulseFailed,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GpioWriteFailed => write!(f, "GPIO write failed"),
            Self::CoilPulseFailed => write!(f, "contactor coil pulse failed"),
        }
    }
}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Bus errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The controller refused the frame.
    TransmitFailed,
    /// Reception failed at the controller level.
    ReceiveFailed,
    /// No response carrying the expected command arrived within the
    /// retry bound.
    NoResponse,
    /// A response arrived but was too short for the requested field.
    MalformedResponse,
    /// Identifier or payload cannot be represented as a CAN frame.
    InvalidFrame,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransmitFailed => write!(f, "CAN transmit failed"),
            Self::ReceiveFailed => write!(f, "CAN receive failed"),
            Self::NoResponse => write!(f, "no response within retry bound"),
            Self::MalformedResponse => write!(f, "malformed response"),
            Self::InvalidFrame => write!(f, "invalid CAN frame"),
        }
    }
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

// ---------------------------------------------------------------------------
// Safety faults
// ---------------------------------------------------------------------------

/// Safety-to-operate fault classes.  The interlock accumulates them in a
/// bitfield so several simultaneous causes can be reported at once.  They
/// feed diagnostics and telemetry only; sequencing branches on the single
/// safe/unsafe verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SafetyFault {
    /// Battery pack one reports not-ok.
    Battery1 = 0b0000_0001,
    /// Battery pack two reports not-ok.
    Battery2 = 0b0000_0010,
    /// Emergency stop is physically asserted.
    EStop = 0b0000_0100,
    /// Isolation monitor reports a ground fault or is unreachable.
    Isolation = 0b0000_1000,
    /// Pack voltage at or below the configured minimum.
    Undervoltage = 0b0001_0000,
}

impl SafetyFault {
    pub const ALL: [SafetyFault; 5] = [
        Self::Battery1,
        Self::Battery2,
        Self::EStop,
        Self::Isolation,
        Self::Undervoltage,
    ];

    /// Return the bitmask for this fault.
    pub const fn mask(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for SafetyFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Battery1 => write!(f, "battery 1 not ok"),
            Self::Battery2 => write!(f, "battery 2 not ok"),
            Self::EStop => write!(f, "e-stop asserted"),
            Self::Isolation => write!(f, "isolation fault"),
            Self::Undervoltage => write!(f, "pack undervoltage"),
        }
    }
}

impl From<SafetyFault> for Error {
    fn from(e: SafetyFault) -> Self {
        Self::Safety(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
