//! Application core: sequencing logic with no direct I/O.
//!
//! This module holds the controller itself: interlock evaluation, state
//! dispatch, pre-charge supervision and notification.  All interaction
//! with hardware happens through **port traits** defined in [`ports`],
//! keeping this layer testable without real peripherals.

pub mod events;
pub mod ports;
pub mod service;

pub use service::{Controller, ControllerStatus};
