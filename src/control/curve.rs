//! RC pre-charge curve model.
//!
//! While the pre-charge resistor is in circuit the bus follows
//!
//! ```text
//! V(t) = V0 + (Vpack - V0) * (1 - e^(-t / tau)),   tau = 1000 * R * C  [ms]
//! ```
//!
//! Each cycle the measured node voltage is compared against that curve.
//! Anything further than [`TRACKING_TOLERANCE_DV`] from it means the load
//! is not what we think it is (short, open resistor, welded contactor) and
//! the attempt is abandoned.  Within [`SETTLED_TOLERANCE_DV`] of the pack
//! the bus is charged and the contactor may close.

use crate::config::{BoardProfile, PrechargeMode};

/// Maximum distance from the expected curve (decivolts).
pub const TRACKING_TOLERANCE_DV: i32 = 5;
/// Maximum distance from the pack voltage to call the bus charged.
pub const SETTLED_TOLERANCE_DV: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivergenceReason {
    /// Pack at or below the configured minimum.
    PackUndervoltage,
    /// Measured voltage left the tracking band.
    OffCurve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveVerdict {
    Ramping,
    Done,
    Diverged(DivergenceReason),
}

/// The charge curve for one board.  Pure: the same inputs always give the
/// same verdict.
#[derive(Debug, Clone, Copy)]
pub struct ChargeCurve {
    tau_ms: f32,
    min_pack_dv: u8,
}

impl ChargeCurve {
    pub fn new(tau_ms: f32, min_pack_dv: u8) -> Self {
        Self { tau_ms, min_pack_dv }
    }

    pub fn from_profile(profile: &BoardProfile) -> Self {
        Self::new(profile.tau_ms(), profile.min_pack_voltage_dv)
    }

    /// Expected node voltage `elapsed_ms` after the path was enabled,
    /// truncated to whole decivolts.
    pub fn expected_dv(&self, initial_dv: u8, pack_dv: u8, elapsed_ms: u64) -> i32 {
        let swing = f32::from(pack_dv) - f32::from(initial_dv);
        let charged = 1.0 - (-(elapsed_ms as f32) / self.tau_ms).exp();
        (f32::from(initial_dv) + swing * charged) as i32
    }

    pub fn classify(&self, initial_dv: u8, measured_dv: u8, pack_dv: u8, elapsed_ms: u64) -> CurveVerdict {
        if pack_dv <= self.min_pack_dv {
            return CurveVerdict::Diverged(DivergenceReason::PackUndervoltage);
        }
        let measured = i32::from(measured_dv);
        let expected = self.expected_dv(initial_dv, pack_dv, elapsed_ms);
        if (measured - expected).abs() > TRACKING_TOLERANCE_DV {
            return CurveVerdict::Diverged(DivergenceReason::OffCurve);
        }
        if (measured - i32::from(pack_dv)).abs() <= SETTLED_TOLERANCE_DV {
            return CurveVerdict::Done;
        }
        CurveVerdict::Ramping
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    Ramping,
    /// Charged; the first isolation poll after pre-charge is still owed.
    SettledAwaitingIsolationRecheck,
    Done,
    Diverged(DivergenceReason),
}

/// One pre-charge attempt, from entering `Precharging` until the bus is
/// charged and re-checked, or the attempt is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrechargeSession {
    pub start_ms: u64,
    pub initial_dv: u8,
    pub stage: SessionStage,
}

impl PrechargeSession {
    pub fn start(now_ms: u64, initial_dv: u8) -> Self {
        Self {
            start_ms: now_ms,
            initial_dv,
            stage: SessionStage::Ramping,
        }
    }

    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.start_ms)
    }

    /// Advance the session with this cycle's readings and return the
    /// verdict.  Settled or diverged sessions no longer change.
    pub fn update(
        &mut self,
        profile: &BoardProfile,
        measured_dv: u8,
        pack_dv: u8,
        now_ms: u64,
    ) -> CurveVerdict {
        match self.stage {
            SessionStage::Ramping => {}
            SessionStage::SettledAwaitingIsolationRecheck | SessionStage::Done => {
                return CurveVerdict::Done;
            }
            SessionStage::Diverged(reason) => return CurveVerdict::Diverged(reason),
        }

        let elapsed = self.elapsed_ms(now_ms);
        let verdict = match profile.precharge_mode {
            PrechargeMode::CurveTracked => {
                ChargeCurve::from_profile(profile).classify(self.initial_dv, measured_dv, pack_dv, elapsed)
            }
            PrechargeMode::Timed { delay_ms } => {
                if pack_dv <= profile.min_pack_voltage_dv {
                    CurveVerdict::Diverged(DivergenceReason::PackUndervoltage)
                } else if elapsed >= u64::from(delay_ms) {
                    CurveVerdict::Done
                } else {
                    CurveVerdict::Ramping
                }
            }
        };

        self.stage = match verdict {
            CurveVerdict::Ramping => SessionStage::Ramping,
            CurveVerdict::Done => SessionStage::SettledAwaitingIsolationRecheck,
            CurveVerdict::Diverged(reason) => SessionStage::Diverged(reason),
        };
        verdict
    }
}
