//! Closed-loop supervision of the pre-charge ramp.

pub mod curve;

pub use curve::{ChargeCurve, CurveVerdict, DivergenceReason, PrechargeSession, SessionStage};
