//! Safety interlock behaviour through the full controller: e-stop, retry
//! budget, key-cycle latch, BMS reset and pre-charge divergence.

use pvc_controller::app::events::AppEvent;
use pvc_controller::bus::messages::{BMS_RESET_ID, BMS_RESET_PAYLOAD};
use pvc_controller::control::DivergenceReason;
use pvc_controller::drivers::PathOutput;
use pvc_controller::error::SafetyFault;
use pvc_controller::fsm::ControllerState;
use pvc_controller::{BoardProfile, ControllerStatus};

use crate::sequencing_tests::{power_up, run_until, started, step};

// ── E-stop ───────────────────────────────────────────────────

#[test]
fn estop_while_powered_tears_down_and_never_recloses() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    power_up(&mut ctl, &mut hw, &mut sink);

    hw.inputs.estop_active = false;
    assert_eq!(step(&mut ctl, &mut hw, &mut sink, 100), ControllerStatus::Faulted);
    assert_eq!(ctl.state(), ControllerState::ForwardDisableWait);
    assert!(ctl.is_latched());
    assert_eq!(ctl.fault_flags(), SafetyFault::EStop.mask());

    // Key stays on the whole time; the latch hides it.
    run_until(&mut ctl, &mut hw, &mut sink, ControllerState::EStopWait, 12_000);
    for _ in 0..20 {
        step(&mut ctl, &mut hw, &mut sink, 100);
        assert_eq!(ctl.state(), ControllerState::EStopWait);
    }

    assert_eq!(hw.coil_pulses, (1, 1));
    let precharges = sink
        .transitions()
        .iter()
        .filter(|&&(_, to)| to == ControllerState::Precharging)
        .count();
    assert_eq!(precharges, 1);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::FaultLatched(_))), 1);
    // No key edge while the e-stop was held.
    assert_eq!(hw.broadcasts_with_id(BMS_RESET_ID), 0);
}

#[test]
fn latch_needs_key_cycle_after_estop_release() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    hw.inputs.key = true;
    hw.inputs.estop_active = false;
    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(ctl.state(), ControllerState::EStopWait);

    hw.inputs.estop_active = true;
    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(ctl.state(), ControllerState::PowerOff);
    assert!(ctl.is_safe());

    // Safe again, key still held: stays off.
    for _ in 0..10 {
        assert_eq!(step(&mut ctl, &mut hw, &mut sink, 100), ControllerStatus::Faulted);
        assert_eq!(ctl.state(), ControllerState::PowerOff);
    }

    hw.inputs.key = false;
    assert_eq!(step(&mut ctl, &mut hw, &mut sink, 100), ControllerStatus::Normal);
    assert!(!ctl.is_latched());
    assert!(sink.events.contains(&AppEvent::LatchCleared));

    hw.inputs.key = true;
    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(ctl.state(), ControllerState::Precharging);
}

#[test]
fn unreadable_inputs_tear_down() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    power_up(&mut ctl, &mut hw, &mut sink);

    hw.fail_inputs = true;
    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(ctl.state(), ControllerState::ForwardDisableWait);
    assert!(ctl.is_latched());
}

// ── Retry budget ─────────────────────────────────────────────

#[test]
fn battery_fault_latches_after_budget() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    step(&mut ctl, &mut hw, &mut sink, 100);
    assert!(ctl.is_safe());

    hw.inputs.battery1_ok = false;
    for attempt in 1..=3 {
        step(&mut ctl, &mut hw, &mut sink, 100);
        assert_eq!(ctl.state(), ControllerState::PowerOff, "attempt {attempt}");
        assert_eq!(ctl.sto_attempts(), attempt);
        assert!(ctl.is_safe());
        assert!(!ctl.is_latched());
    }

    assert_eq!(step(&mut ctl, &mut hw, &mut sink, 100), ControllerStatus::Faulted);
    assert_eq!(ctl.state(), ControllerState::EStopWait);
    assert!(ctl.is_latched());
    assert_eq!(ctl.fault_flags(), SafetyFault::Battery1.mask());
    assert!(sink.events.contains(&AppEvent::FaultLatched(SafetyFault::Battery1.mask())));
}

#[test]
fn good_reading_resets_budget() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    step(&mut ctl, &mut hw, &mut sink, 100);

    for _ in 0..3 {
        hw.inputs.battery2_ok = false;
        for _ in 0..3 {
            step(&mut ctl, &mut hw, &mut sink, 100);
        }
        assert_eq!(ctl.sto_attempts(), 3);

        hw.inputs.battery2_ok = true;
        step(&mut ctl, &mut hw, &mut sink, 100);
        assert_eq!(ctl.sto_attempts(), 0);
    }
    assert_eq!(ctl.state(), ControllerState::PowerOff);
    assert!(!ctl.is_latched());
}

#[test]
fn battery_blip_does_not_drop_a_running_bus() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    power_up(&mut ctl, &mut hw, &mut sink);

    hw.inputs.battery2_ok = false;
    for _ in 0..3 {
        step(&mut ctl, &mut hw, &mut sink, 100);
        assert_eq!(ctl.state(), ControllerState::PoweredOn);
    }
    hw.inputs.battery2_ok = true;
    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(ctl.state(), ControllerState::PoweredOn);
    assert_eq!(ctl.sto_attempts(), 0);
    assert!(hw.output(PathOutput::Apm));
}

// ── BMS reset ────────────────────────────────────────────────

#[test]
fn key_edge_under_estop_resets_bms() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    hw.inputs.estop_active = false;
    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(ctl.state(), ControllerState::EStopWait);

    hw.inputs.key = true;
    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(hw.broadcasts_with_id(BMS_RESET_ID), 5);
    for msg in hw.broadcasts() {
        assert_eq!(msg.data.as_slice(), &BMS_RESET_PAYLOAD);
    }

    // Held key: no further resets.
    for _ in 0..5 {
        step(&mut ctl, &mut hw, &mut sink, 100);
    }
    assert_eq!(hw.broadcasts_with_id(BMS_RESET_ID), 5);

    hw.inputs.key = false;
    step(&mut ctl, &mut hw, &mut sink, 100);
    hw.inputs.key = true;
    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(hw.broadcasts_with_id(BMS_RESET_ID), 10);
    assert_eq!(ctl.state(), ControllerState::EStopWait);
}

// ── Pre-charge divergence ────────────────────────────────────

#[test]
fn divergence_latches_on_curve_tracked_board() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    hw.inputs.key = true;
    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(ctl.state(), ControllerState::Precharging);

    // Open resistor: the node never moves while the curve expects ~91 dV.
    assert_eq!(step(&mut ctl, &mut hw, &mut sink, 1000), ControllerStatus::Faulted);
    assert_eq!(ctl.state(), ControllerState::ForwardDisableWait);
    assert!(!hw.output(PathOutput::Precharge));
    assert!(ctl.session().is_none());
    assert!(ctl.is_latched());
    assert!(
        sink.events
            .contains(&AppEvent::PrechargeDiverged(DivergenceReason::OffCurve))
    );

    run_until(&mut ctl, &mut hw, &mut sink, ControllerState::PowerOff, 12_000);
    for _ in 0..10 {
        step(&mut ctl, &mut hw, &mut sink, 100);
        assert_eq!(ctl.state(), ControllerState::PowerOff);
    }

    hw.inputs.key = false;
    step(&mut ctl, &mut hw, &mut sink, 100);
    hw.inputs.key = true;
    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(ctl.state(), ControllerState::Precharging);
}

#[test]
fn divergence_retries_on_timed_board() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::kev1n());
    hw.pack_dv = 30;
    hw.inputs.key = true;
    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(ctl.state(), ControllerState::Precharging);

    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(ctl.state(), ControllerState::ForwardDisableWait);
    assert!(!ctl.is_latched());
    assert!(
        sink.events
            .contains(&AppEvent::PrechargeDiverged(DivergenceReason::PackUndervoltage))
    );

    run_until(&mut ctl, &mut hw, &mut sink, ControllerState::PowerOff, 12_000);
    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(ctl.state(), ControllerState::Precharging);
}

#[test]
fn unreadable_voltages_abandon_precharge() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    hw.inputs.key = true;
    step(&mut ctl, &mut hw, &mut sink, 100);

    hw.fail_voltages = true;
    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(ctl.state(), ControllerState::ForwardDisableWait);
    assert_eq!(ctl.sensors().pack_dv, 0);
    assert!(
        sink.events
            .contains(&AppEvent::PrechargeDiverged(DivergenceReason::PackUndervoltage))
    );
}
