//! Actuator drivers: path outputs and the latching main contactor.

pub mod contactor;
pub mod outputs;

pub use contactor::{Contactor, ContactorControl, ContactorIntent};
pub use outputs::{OutputBank, PathOutput, PathOutputs};
