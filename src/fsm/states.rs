//! Concrete state handler functions and table builder.
//!
//! ```text
//!                 ┌──────────[safe]──────────┐
//!                 ▼                          │
//!   POWER_OFF ──[!safe]──▶ ESTOP_WAIT ───────┘
//!      │ ▲
//! [safe && key]  └────────────[discharge delay]────────── DISCHARGING
//!      ▼                                                      ▲
//!  PRECHARGING ──[done]──▶ CONTACTOR_CLOSING ──[ok]──▶ POWERED_ON
//!      │                         │                     │      │
//!      └─[diverged|!safe|!key]───┴─────────────────────┘      │
//!                  ▼                                          │
//!          FORWARD_DISABLE_WAIT ──[delay]──▶ CONTACTOR_OPENING┘
//! ```
//!
//! Handlers only touch [`FsmContext`]; the service turns the resulting
//! commands into actuator and bus calls after dispatch.

use super::context::{Broadcast, FsmContext};
use super::{ControllerState, StateDescriptor};
use crate::control::CurveVerdict;
use crate::control::PrechargeSession;
use crate::drivers::ContactorIntent;
use log::{debug, info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Row order follows the wire ordinals.
pub fn build_state_table() -> [StateDescriptor; ControllerState::COUNT] {
    [
        // 0
        StateDescriptor {
            id: ControllerState::PowerOff,
            name: "PowerOff",
            on_enter: Some(power_off_enter),
            on_exit: None,
            on_update: power_off_update,
        },
        // 1
        StateDescriptor {
            id: ControllerState::PoweredOn,
            name: "PoweredOn",
            on_enter: None,
            on_exit: None,
            on_update: powered_on_update,
        },
        // 2
        StateDescriptor {
            id: ControllerState::EStopWait,
            name: "EStopWait",
            on_enter: None,
            on_exit: None,
            on_update: estop_wait_update,
        },
        // 3
        StateDescriptor {
            id: ControllerState::Precharging,
            name: "Precharging",
            on_enter: Some(precharging_enter),
            on_exit: None,
            on_update: precharging_update,
        },
        // 4
        StateDescriptor {
            id: ControllerState::Discharging,
            name: "Discharging",
            on_enter: Some(discharging_enter),
            on_exit: None,
            on_update: discharging_update,
        },
        // 5
        StateDescriptor {
            id: ControllerState::ContactorOpening,
            name: "ContactorOpening",
            on_enter: Some(contactor_opening_enter),
            on_exit: None,
            on_update: contactor_opening_update,
        },
        // 6
        StateDescriptor {
            id: ControllerState::ContactorClosing,
            name: "ContactorClosing",
            on_enter: Some(contactor_closing_enter),
            on_exit: None,
            on_update: contactor_closing_update,
        },
        // 7
        StateDescriptor {
            id: ControllerState::ForwardDisableWait,
            name: "ForwardDisableWait",
            on_enter: Some(forward_disable_enter),
            on_exit: None,
            on_update: forward_disable_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  POWER_OFF
// ═══════════════════════════════════════════════════════════════════════════

fn power_off_enter(ctx: &mut FsmContext) {
    ctx.session = None;
    ctx.post_precharge = false;
    info!("POWER_OFF: bus de-energised");
}

fn power_off_update(ctx: &mut FsmContext) -> Option<ControllerState> {
    if !ctx.safe {
        return Some(ControllerState::EStopWait);
    }
    if ctx.key {
        return Some(ControllerState::Precharging);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  ESTOP_WAIT
// ═══════════════════════════════════════════════════════════════════════════

fn estop_wait_update(ctx: &mut FsmContext) -> Option<ControllerState> {
    // With the e-stop held the operator can reset the BMS by turning the
    // key.  Uses the raw key: the latch would otherwise hide it.
    if ctx.sensors.inputs.estop_asserted() && ctx.key_rising_edge() {
        info!("ESTOP_WAIT: key turned under e-stop, resetting BMS");
        ctx.commands.send(Broadcast::BmsReset);
    }

    if ctx.safe {
        return Some(ControllerState::PowerOff);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  PRECHARGING
// ═══════════════════════════════════════════════════════════════════════════

fn precharging_enter(ctx: &mut FsmContext) {
    ctx.session = Some(PrechargeSession::start(ctx.now_ms, ctx.sensors.precharge_dv));
    ctx.commands.precharge = true;
    info!(
        "PRECHARGING: from {} dV towards {} dV",
        ctx.sensors.precharge_dv, ctx.sensors.pack_dv
    );
}

fn precharging_update(ctx: &mut FsmContext) -> Option<ControllerState> {
    let profile = ctx.profile;
    let now = ctx.now_ms;
    let (measured, pack) = (ctx.sensors.precharge_dv, ctx.sensors.pack_dv);
    let session = ctx
        .session
        .get_or_insert_with(|| PrechargeSession::start(now, measured));
    let verdict = session.update(&profile, measured, pack, now);

    if let CurveVerdict::Diverged(reason) = verdict {
        warn!(
            "PRECHARGING: diverged ({:?}), measured={} pack={} dV",
            reason, measured, pack
        );
        ctx.divergence = Some(reason);
        if profile.latch_on_divergence {
            ctx.latch_request = Some("pre-charge diverged");
        }
    }

    if matches!(verdict, CurveVerdict::Diverged(_)) || !ctx.safe || !ctx.key {
        ctx.session = None;
        return Some(ControllerState::ForwardDisableWait);
    }

    if verdict == CurveVerdict::Done {
        info!("PRECHARGING: bus at {} dV, pack {} dV", measured, pack);
        ctx.post_precharge = true;
        return Some(ControllerState::ContactorClosing);
    }

    debug!("PRECHARGING: {} dV", measured);
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONTACTOR_CLOSING
// ═══════════════════════════════════════════════════════════════════════════

fn contactor_closing_enter(ctx: &mut FsmContext) {
    ctx.commands.contactor = ContactorIntent::Closed;
    ctx.commands.precharge = false;
    info!("CONTACTOR_CLOSING: closing main contactor");
}

fn contactor_closing_update(ctx: &mut FsmContext) -> Option<ControllerState> {
    if !ctx.safe || !ctx.key {
        return Some(ControllerState::ForwardDisableWait);
    }
    if ctx.contactor_open {
        warn!("CONTACTOR_CLOSING: contactor did not close");
        ctx.commands.contactor = ContactorIntent::Open;
        return Some(ControllerState::ForwardDisableWait);
    }

    ctx.commands.apm = true;
    ctx.commands.send(Broadcast::TmsWake);
    Some(ControllerState::PoweredOn)
}

// ═══════════════════════════════════════════════════════════════════════════
//  POWERED_ON
// ═══════════════════════════════════════════════════════════════════════════

fn powered_on_update(ctx: &mut FsmContext) -> Option<ControllerState> {
    if !ctx.safe || !ctx.key {
        info!(
            "POWERED_ON: shutting down (safe={}, key={})",
            ctx.safe, ctx.key
        );
        return Some(ControllerState::ForwardDisableWait);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  FORWARD_DISABLE_WAIT: the drive stops pulling current
// ═══════════════════════════════════════════════════════════════════════════

fn forward_disable_enter(ctx: &mut FsmContext) {
    ctx.commands.precharge = false;
    // A close that never landed must not be retried on the way down.
    if ctx.contactor_open {
        ctx.commands.contactor = ContactorIntent::Open;
    }
    info!(
        "FORWARD_DISABLE_WAIT: holding {} ms",
        ctx.profile.forward_disable_delay_ms
    );
}

fn forward_disable_update(ctx: &mut FsmContext) -> Option<ControllerState> {
    if ctx.ms_in_state() < u64::from(ctx.profile.forward_disable_delay_ms) {
        return None;
    }
    ctx.commands.apm = false;
    ctx.commands.send(Broadcast::TmsSleep);
    Some(ControllerState::ContactorOpening)
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONTACTOR_OPENING
// ═══════════════════════════════════════════════════════════════════════════

fn contactor_opening_enter(ctx: &mut FsmContext) {
    ctx.commands.contactor = ContactorIntent::Open;
    info!("CONTACTOR_OPENING: opening main contactor");
}

fn contactor_opening_update(_ctx: &mut FsmContext) -> Option<ControllerState> {
    Some(ControllerState::Discharging)
}

// ═══════════════════════════════════════════════════════════════════════════
//  DISCHARGING
// ═══════════════════════════════════════════════════════════════════════════

fn discharging_enter(ctx: &mut FsmContext) {
    ctx.commands.discharge = true;
    info!(
        "DISCHARGING: bleeding bus for {} ms",
        ctx.profile.discharge_delay_ms
    );
}

fn discharging_update(ctx: &mut FsmContext) -> Option<ControllerState> {
    if ctx.ms_in_state() < u64::from(ctx.profile.discharge_delay_ms) {
        return None;
    }
    ctx.commands.discharge = false;
    Some(ControllerState::PowerOff)
}
