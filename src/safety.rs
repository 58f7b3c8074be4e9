//! Safety-to-operate (STO) interlock.
//!
//! The interlock runs **every cycle before the state machine** and reduces
//! the battery-ok lines, the e-stop loop, the isolation monitor and the
//! pack voltage to a single `safe` verdict.
//!
//! ## Fault lifecycle
//!
//! 1. All inputs good: `safe = true`, retry counter cleared.
//! 2. Something bad, e-stop not pressed: the counter is bumped and `safe`
//!    keeps its previous value, so a single glitch does not tear down a
//!    running bus.
//! 3. E-stop pressed, or the bumped counter exceeds `max_sto_attempts`: the fault
//!    **latches**.  `safe` drops, and the ignition key reads as off until
//!    the operator is seen turning it to off.
//!
//! The fault bitmask (see [`SafetyFault::mask`]) is for diagnostics and
//! telemetry; sequencing only looks at the verdict.

use log::{error, info, warn};

use crate::config::BoardProfile;
use crate::error::SafetyFault;
use crate::sensors::IsolationCode;

/// Everything the interlock looks at in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoInputs {
    pub battery1_ok: bool,
    pub battery2_ok: bool,
    /// `true` while the e-stop loop is closed (not pressed).
    pub estop_active: bool,
    pub isolation_ok: bool,
    /// Pack voltage strictly above the configured minimum.
    pub pack_voltage_ok: bool,
}

impl StoInputs {
    /// Bitmask of every failing condition that applies in this phase.
    pub fn fault_mask(&self, post_precharge: bool, check_pack: bool) -> u8 {
        let mut mask = 0;
        if !self.battery1_ok {
            mask |= SafetyFault::Battery1.mask();
        }
        if !self.battery2_ok {
            mask |= SafetyFault::Battery2.mask();
        }
        if !self.estop_active {
            mask |= SafetyFault::EStop.mask();
        }
        if post_precharge && !self.isolation_ok {
            mask |= SafetyFault::Isolation.mask();
        }
        if (post_precharge || check_pack) && !self.pack_voltage_ok {
            mask |= SafetyFault::Undervoltage.mask();
        }
        mask
    }
}

/// Retry budget plus key-cycle latch.
pub struct SafetyInterlock {
    max_attempts: u8,
    check_pack_before_precharge: bool,
    attempts: u8,
    safe: bool,
    latched: bool,
    faults: u8,
}

impl SafetyInterlock {
    pub fn new(profile: &BoardProfile) -> Self {
        Self {
            max_attempts: profile.max_sto_attempts,
            check_pack_before_precharge: profile.require_pack_voltage_before_precharge,
            attempts: 0,
            safe: false,
            latched: false,
            faults: 0,
        }
    }

    /// Evaluate one cycle.  `post_precharge` adds the isolation and pack
    /// voltage terms.  Returns the new verdict.
    pub fn evaluate(&mut self, inputs: &StoInputs, post_precharge: bool) -> bool {
        let mask = inputs.fault_mask(post_precharge, self.check_pack_before_precharge);
        self.log_fault_changes(mask);
        self.faults = mask;

        if mask == 0 {
            self.safe = true;
            self.attempts = 0;
            return true;
        }

        self.attempts = self.attempts.saturating_add(1);
        if !inputs.estop_active || self.attempts > self.max_attempts {
            error!(
                "STO: fault latched after {} attempts, faults=0b{:08b}",
                self.attempts, mask
            );
            self.safe = false;
            self.attempts = 0;
            self.latched = true;
            return false;
        }

        warn!(
            "STO: unsafe reading {}/{}, faults=0b{:08b}",
            self.attempts, self.max_attempts, mask
        );
        self.safe
    }

    /// Latch a fault that was detected elsewhere (pre-charge divergence).
    pub fn latch(&mut self, reason: &'static str) {
        if !self.latched {
            warn!("STO: key cycle required ({})", reason);
        }
        self.latched = true;
    }

    /// Filter the raw ignition key through the latch.  While latched the key
    /// reads off; seeing the raw key off clears the latch.
    pub fn effective_key(&mut self, raw_key: bool) -> bool {
        if self.latched {
            if !raw_key {
                info!("STO: key cycled, latch cleared");
                self.latched = false;
            }
            return false;
        }
        raw_key
    }

    pub fn is_safe(&self) -> bool {
        self.safe
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    /// Failing conditions from the last evaluation.
    pub fn faults(&self) -> u8 {
        self.faults
    }

    pub fn has_fault(&self, fault: SafetyFault) -> bool {
        self.faults & fault.mask() != 0
    }

    fn log_fault_changes(&self, mask: u8) {
        for fault in SafetyFault::ALL {
            let now = mask & fault.mask() != 0;
            let before = self.faults & fault.mask() != 0;
            if now && !before {
                error!("SAFETY FAULT SET: {fault}");
            } else if !now && before {
                info!("SAFETY FAULT CLEARED: {fault}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Isolation poll pacing
// ---------------------------------------------------------------------------

/// Rate limits isolation-monitor queries and holds the last verdict.
///
/// Armed when a pre-charge completes.  The first poll is due one interval
/// later, then one per interval.  A poll that fails, or returns a code the
/// interlock does not accept, reads as not-ok and is retried next cycle.
pub struct IsolationPoller {
    interval_ms: u32,
    next_due_ms: Option<u64>,
    ok: bool,
}

impl IsolationPoller {
    pub fn new(profile: &BoardProfile) -> Self {
        Self {
            interval_ms: profile.isolation_poll_interval_ms,
            next_due_ms: None,
            ok: true,
        }
    }

    /// Start polling after a completed pre-charge.  The status is assumed
    /// good until the first poll.
    pub fn arm(&mut self, now_ms: u64) {
        self.next_due_ms = Some(now_ms + u64::from(self.interval_ms));
        self.ok = true;
    }

    pub fn disarm(&mut self) {
        self.next_due_ms = None;
        self.ok = true;
    }

    pub fn is_armed(&self) -> bool {
        self.next_due_ms.is_some()
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        self.next_due_ms.is_some_and(|due| now_ms >= due)
    }

    /// Record a poll result.  Returns the verdict for this cycle.
    pub fn record<E>(&mut self, now_ms: u64, result: Result<IsolationCode, E>) -> bool {
        match result {
            Ok(code) if code.is_ok() => {
                self.ok = true;
                self.next_due_ms = Some(now_ms + u64::from(self.interval_ms));
            }
            Ok(code) => {
                error!("Isolation monitor reports {:?}", code);
                self.ok = false;
                if code == IsolationCode::Fault {
                    self.next_due_ms = Some(now_ms + u64::from(self.interval_ms));
                }
            }
            Err(_) => {
                error!("Isolation monitor unreachable");
                self.ok = false;
            }
        }
        self.ok
    }

    pub fn is_ok(&self) -> bool {
        self.ok
    }
}
