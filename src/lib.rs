//! Pre-charge / discharge controller library.
//!
//! Sequences the main contactor and the resistive pre-charge and discharge
//! paths of a high-voltage bus behind a safety-to-operate interlock.
//! Everything hardware-facing goes through the port traits in
//! [`app::ports`]; the drivers are generic over `embedded-hal` and
//! `embedded-can`, so the whole controller runs on a host against the
//! simulated plant in [`adapters::sim`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod bus;
pub mod config;
pub mod control;
pub mod drivers;
pub mod error;
pub mod fsm;
pub mod safety;
pub mod sensors;

pub use app::{Controller, ControllerStatus};
pub use config::BoardProfile;
pub use error::{Error, Result};
