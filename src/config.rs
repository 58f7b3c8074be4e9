//! Board profile.
//!
//! Every tunable for one pre-charge board lives here.  The two production
//! boards differ only in these values, so the controller is a single state
//! machine parameterised by a [`BoardProfile`] rather than one type per
//! board.

use serde::{Deserialize, Serialize};

/// How the controller decides that pre-charge has finished.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PrechargeMode {
    /// Track the measured node against the RC charge curve and finish when
    /// it converges on the pack voltage.
    CurveTracked,
    /// Hold the pre-charge path for a fixed time, then close.
    Timed { delay_ms: u32 },
}

/// Tunables for one board variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoardProfile {
    // --- Identity ---
    /// Short board tag used in logs.
    pub name: BoardName,

    // --- Safety interlock ---
    /// Consecutive unsafe evaluations tolerated before the fault latches.
    pub max_sto_attempts: u8,
    /// Minimum pack voltage (decivolts) for operation.
    pub min_pack_voltage_dv: u8,
    /// Also require `pack > min` before the first pre-charge.
    pub require_pack_voltage_before_precharge: bool,
    /// Poll the isolation monitor once pre-charged.
    pub isolation_monitoring: bool,
    /// Minimum spacing between isolation polls (ms).
    pub isolation_poll_interval_ms: u32,
    /// A diverged pre-charge also requires a key cycle.
    pub latch_on_divergence: bool,

    // --- Sequencing ---
    pub precharge_mode: PrechargeMode,
    /// Wait in forward-disable before opening the contactor (ms).
    pub forward_disable_delay_ms: u32,
    /// Time the discharge path is held after the contactor opens (ms).
    pub discharge_delay_ms: u32,
    /// Coil pulse width for the bistable contactor (ms).
    pub contactor_pulse_ms: u32,

    // --- RC charge curve ---
    /// Pre-charge resistance (ohms).
    pub precharge_resistance_ohms: f32,
    /// Bus capacitance (farads).
    pub bus_capacitance_farads: f32,

    // --- Network ---
    /// Node id of the thermal-management system woken by NMT.
    pub tms_node_id: u8,

    // --- Diagnostics ---
    /// Emit a status line every control cycle (debug side channel).
    pub log_status_each_cycle: bool,
    /// Expected control-loop period (ms).
    pub control_period_ms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoardName {
    Dev1,
    Kev1n,
}

impl BoardProfile {
    /// DEV1 / PVC board: curve-tracked pre-charge with isolation monitoring.
    pub const fn dev1() -> Self {
        Self {
            name: BoardName::Dev1,
            max_sto_attempts: 3,
            min_pack_voltage_dv: 40,
            require_pack_voltage_before_precharge: false,
            isolation_monitoring: true,
            isolation_poll_interval_ms: 5000,
            latch_on_divergence: true,
            precharge_mode: PrechargeMode::CurveTracked,
            forward_disable_delay_ms: 5000,
            discharge_delay_ms: 5250,
            contactor_pulse_ms: 20,
            precharge_resistance_ohms: 30.0,
            bus_capacitance_farads: 0.014,
            tms_node_id: 0x08,
            log_status_each_cycle: false,
            control_period_ms: 100,
        }
    }

    /// KEV1N board: fixed 2 s pre-charge, divergence does not latch.
    pub const fn kev1n() -> Self {
        Self {
            name: BoardName::Kev1n,
            latch_on_divergence: false,
            precharge_mode: PrechargeMode::Timed { delay_ms: 2000 },
            log_status_each_cycle: true,
            ..Self::dev1()
        }
    }

    /// RC time constant of the pre-charge circuit (ms).
    pub fn tau_ms(&self) -> f32 {
        1000.0 * self.precharge_resistance_ohms * self.bus_capacitance_farads
    }

    /// Reject profiles that would defeat a safety guard.  Values are never
    /// silently clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sto_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_sto_attempts must be at least 1",
            ));
        }
        if self.min_pack_voltage_dv == 0 {
            return Err(ConfigError::ValidationFailed(
                "min_pack_voltage_dv must be non-zero",
            ));
        }
        if self.contactor_pulse_ms == 0 || self.contactor_pulse_ms > 100 {
            return Err(ConfigError::ValidationFailed(
                "contactor_pulse_ms must be within 1..=100",
            ));
        }
        if self.forward_disable_delay_ms == 0 || self.discharge_delay_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "teardown delays must be non-zero",
            ));
        }
        if self.isolation_monitoring && self.isolation_poll_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "isolation_poll_interval_ms must be non-zero",
            ));
        }
        if !(self.precharge_resistance_ohms > 0.0 && self.bus_capacitance_farads > 0.0) {
            return Err(ConfigError::ValidationFailed(
                "RC constants must be positive",
            ));
        }
        if let PrechargeMode::Timed { delay_ms } = self.precharge_mode {
            if delay_ms == 0 {
                return Err(ConfigError::ValidationFailed(
                    "timed pre-charge needs a non-zero delay",
                ));
            }
        }
        if self.control_period_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "control_period_ms must be non-zero",
            ));
        }
        Ok(())
    }
}

impl Default for BoardProfile {
    fn default() -> Self {
        Self::dev1()
    }
}

/// Board profile rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A field failed range validation; the message names it.
    ValidationFailed(&'static str),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}

impl From<ConfigError> for crate::error::Error {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::ValidationFailed(msg) => Self::Config(msg),
        }
    }
}
