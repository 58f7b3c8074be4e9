//! Sensor subsystem: interlock inputs, bus voltage sense and the isolation monitor.
//!
//! The hardware adapter owns one of each and the controller reads them
//! through [`SensorPort`](crate::app::ports::SensorPort) at the start of
//! every cycle.

pub mod inputs;
pub mod isolation;
pub mod voltage;

pub use inputs::{BoardInputs, InputBank, InputLevels};
pub use isolation::{IsolationCode, Sim100};
pub use voltage::{VoltageChannel, VoltageSense};
