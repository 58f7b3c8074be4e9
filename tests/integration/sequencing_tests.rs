//! Power-up and teardown sequencing against mock adapters.
//!
//! Covers the happy path through every bus-energising state, the teardown
//! timers, actuation ordering and the once-per-transition notification.

use pvc_controller::app::events::AppEvent;
use pvc_controller::bus::BusMessage;
use pvc_controller::bus::messages::NMT_ID;
use pvc_controller::drivers::PathOutput;
use pvc_controller::fsm::ControllerState;
use pvc_controller::{BoardProfile, Controller, ControllerStatus};

use crate::mock_hw::{HwCall, MockHardware, RecordingSink};

// ── Helpers ──────────────────────────────────────────────────

pub(crate) fn started(profile: BoardProfile) -> (Controller, MockHardware, RecordingSink) {
    let mut hw = MockHardware::healthy();
    let mut sink = RecordingSink::new();
    let mut ctl = Controller::new(profile).unwrap();
    ctl.start(&mut hw, &mut sink);
    (ctl, hw, sink)
}

/// Advance the clock by `ms`, then run one cycle.
pub(crate) fn step(
    ctl: &mut Controller,
    hw: &mut MockHardware,
    sink: &mut RecordingSink,
    ms: u64,
) -> ControllerStatus {
    hw.advance(ms);
    ctl.handle(hw, sink)
}

/// Cycle every `period` ms until `target` is reached.  Returns the time
/// spent; panics after `limit_ms`.
pub(crate) fn run_until(
    ctl: &mut Controller,
    hw: &mut MockHardware,
    sink: &mut RecordingSink,
    target: ControllerState,
    limit_ms: u64,
) -> u64 {
    let start = hw.now_ms;
    while ctl.state() != target {
        assert!(
            hw.now_ms - start <= limit_ms,
            "stuck in {:?} waiting for {:?}",
            ctl.state(),
            target
        );
        step(ctl, hw, sink, 100);
    }
    hw.now_ms - start
}

/// Key on, let the bus follow the curve to the pack, close.  Leaves the
/// controller in `PoweredOn` one cycle after the contactor closed.
pub(crate) fn power_up(ctl: &mut Controller, hw: &mut MockHardware, sink: &mut RecordingSink) {
    hw.inputs.key = true;
    step(ctl, hw, sink, 100);
    assert_eq!(ctl.state(), ControllerState::Precharging);

    hw.precharge_dv = hw.pack_dv;
    step(ctl, hw, sink, 5000);
    assert_eq!(ctl.state(), ControllerState::ContactorClosing);

    step(ctl, hw, sink, 100);
    assert_eq!(ctl.state(), ControllerState::PoweredOn);
}

fn position(calls: &[HwCall], wanted: &HwCall) -> usize {
    calls
        .iter()
        .position(|c| c == wanted)
        .unwrap_or_else(|| panic!("{:?} not issued in {:?}", wanted, calls))
}

// ── Power-up ─────────────────────────────────────────────────

#[test]
fn key_on_reaches_powered_on_at_100_dv() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());

    hw.inputs.key = true;
    assert_eq!(step(&mut ctl, &mut hw, &mut sink, 100), ControllerStatus::Normal);
    assert_eq!(ctl.state(), ControllerState::Precharging);
    assert!(hw.output(PathOutput::Precharge));
    assert!(hw.contactor_open_now());

    // Fully charged after ~12 tau.
    hw.precharge_dv = 100;
    hw.clear_calls();
    step(&mut ctl, &mut hw, &mut sink, 5000);
    assert_eq!(ctl.state(), ControllerState::ContactorClosing);
    assert!(ctl.is_post_precharge());
    assert!(!hw.output(PathOutput::Precharge));
    assert!(!hw.contactor_open_now());

    // The contactor closes before the pre-charge path is dropped.
    let close = position(&hw.calls, &HwCall::SetContactor { open: false });
    let precharge_off = position(&hw.calls, &HwCall::SetOutput(PathOutput::Precharge, false));
    assert!(close < precharge_off);

    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(ctl.state(), ControllerState::PoweredOn);
    assert!(hw.output(PathOutput::Apm));
    assert_eq!(hw.coil_pulses, (0, 1));

    assert_eq!(
        sink.transitions(),
        vec![
            (ControllerState::PowerOff, ControllerState::Precharging),
            (ControllerState::Precharging, ControllerState::ContactorClosing),
            (ControllerState::ContactorClosing, ControllerState::PoweredOn),
        ]
    );
}

#[test]
fn powered_on_record_reflects_outputs() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    power_up(&mut ctl, &mut hw, &mut sink);

    let Some(AppEvent::StateChanged { record, .. }) = sink
        .events
        .iter()
        .rev()
        .find(|e| matches!(e, AppEvent::StateChanged { .. }))
    else {
        panic!("no state change recorded");
    };
    assert_eq!(record.state, ControllerState::PoweredOn);
    assert!(record.key);
    assert!(record.sto);
    assert!(record.apm);
    assert!(record.contactor_closed);
    assert!(!record.precharge);
    assert!(!record.discharge);
    assert!(record.pack_voltage_ok);
    assert_eq!(record.encode(), [1, 0, 0x11, 0x11, 0x11, 0x00, 0x11]);
}

#[test]
fn tms_is_woken_once_on_power_up() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    power_up(&mut ctl, &mut hw, &mut sink);
    for _ in 0..20 {
        step(&mut ctl, &mut hw, &mut sink, 100);
    }

    assert_eq!(hw.broadcasts(), vec![&BusMessage::tms_wake(0x08)]);
    assert_eq!(hw.broadcasts()[0].data.as_slice(), &[0x01, 0x08]);
}

#[test]
fn timed_profile_closes_after_fixed_delay() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::kev1n());

    hw.inputs.key = true;
    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(ctl.state(), ControllerState::Precharging);

    // The node voltage is not tracked in timed mode.
    hw.precharge_dv = 3;
    step(&mut ctl, &mut hw, &mut sink, 1999);
    assert_eq!(ctl.state(), ControllerState::Precharging);
    step(&mut ctl, &mut hw, &mut sink, 1);
    assert_eq!(ctl.state(), ControllerState::ContactorClosing);

    // This board logs a status line every cycle.
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::Status(_))),
        ctl.tick_count() as usize
    );
}

// ── Teardown ─────────────────────────────────────────────────

#[test]
fn key_off_tears_down_with_profile_delays() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    power_up(&mut ctl, &mut hw, &mut sink);

    hw.inputs.key = false;
    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(ctl.state(), ControllerState::ForwardDisableWait);
    // APM and the contactor are held through the forward-disable window.
    assert!(hw.output(PathOutput::Apm));
    assert!(!hw.contactor_open_now());

    step(&mut ctl, &mut hw, &mut sink, 4999);
    assert_eq!(ctl.state(), ControllerState::ForwardDisableWait);

    hw.clear_calls();
    step(&mut ctl, &mut hw, &mut sink, 1);
    assert_eq!(ctl.state(), ControllerState::ContactorOpening);
    assert!(!hw.output(PathOutput::Apm));
    assert!(hw.contactor_open_now());
    assert_eq!(hw.broadcasts(), vec![&BusMessage::tms_sleep(0x08)]);

    // APM drops before the contactor opens.
    let apm_off = position(&hw.calls, &HwCall::SetOutput(PathOutput::Apm, false));
    let open = position(&hw.calls, &HwCall::SetContactor { open: true });
    assert!(apm_off < open);

    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(ctl.state(), ControllerState::Discharging);
    assert!(hw.output(PathOutput::Discharge));

    step(&mut ctl, &mut hw, &mut sink, 5249);
    assert_eq!(ctl.state(), ControllerState::Discharging);
    step(&mut ctl, &mut hw, &mut sink, 1);
    assert_eq!(ctl.state(), ControllerState::PowerOff);
    assert!(!hw.output(PathOutput::Discharge));
    assert!(!ctl.is_post_precharge());
    assert_eq!(hw.coil_pulses, (1, 1));
}

#[test]
fn key_off_during_precharge_aborts_attempt() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    hw.inputs.key = true;
    step(&mut ctl, &mut hw, &mut sink, 100);

    hw.inputs.key = false;
    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(ctl.state(), ControllerState::ForwardDisableWait);
    assert!(!hw.output(PathOutput::Precharge));
    assert!(ctl.session().is_none());
    assert!(!ctl.is_latched());
    assert_eq!(sink.count(|e| matches!(e, AppEvent::PrechargeDiverged(_))), 0);

    run_until(&mut ctl, &mut hw, &mut sink, ControllerState::PowerOff, 12_000);
    // The contactor was never closed, so no coil pulse at all.
    assert_eq!(hw.coil_pulses, (0, 0));
}

#[test]
fn contactor_that_fails_to_close_is_torn_down() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    hw.stuck_contactor = true;

    hw.inputs.key = true;
    step(&mut ctl, &mut hw, &mut sink, 100);
    hw.precharge_dv = 100;
    step(&mut ctl, &mut hw, &mut sink, 5000);
    assert_eq!(ctl.state(), ControllerState::ContactorClosing);
    assert!(hw.contactor_open_now());

    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(ctl.state(), ControllerState::ForwardDisableWait);

    run_until(&mut ctl, &mut hw, &mut sink, ControllerState::PowerOff, 12_000);
    assert!(!sink.transitions().iter().any(|&(_, to)| to == ControllerState::PoweredOn));
    assert_eq!(hw.broadcasts_with_id(NMT_ID), 1, "sleep only, never wake");
}

#[test]
fn coil_recovering_after_failed_close_stays_open() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    hw.stuck_contactor = true;

    hw.inputs.key = true;
    step(&mut ctl, &mut hw, &mut sink, 100);
    hw.precharge_dv = 100;
    step(&mut ctl, &mut hw, &mut sink, 5000);
    assert_eq!(ctl.state(), ControllerState::ContactorClosing);

    // The coil works again from here on; teardown must not use it to close.
    hw.stuck_contactor = false;
    hw.clear_calls();
    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(ctl.state(), ControllerState::ForwardDisableWait);
    assert!(hw.contactor_open_now());

    while ctl.state() == ControllerState::ForwardDisableWait {
        step(&mut ctl, &mut hw, &mut sink, 100);
        assert!(hw.contactor_open_now());
    }
    run_until(&mut ctl, &mut hw, &mut sink, ControllerState::PowerOff, 12_000);
    assert!(hw.contactor_open_now());
    assert_eq!(hw.coil_pulses, (0, 0));
    assert!(!hw.calls.contains(&HwCall::SetContactor { open: false }));
}

// ── Notification ─────────────────────────────────────────────

#[test]
fn one_notification_per_distinct_transition() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    power_up(&mut ctl, &mut hw, &mut sink);
    for _ in 0..30 {
        step(&mut ctl, &mut hw, &mut sink, 100);
    }
    hw.inputs.key = false;
    run_until(&mut ctl, &mut hw, &mut sink, ControllerState::PowerOff, 12_000);
    for _ in 0..30 {
        step(&mut ctl, &mut hw, &mut sink, 100);
    }

    let transitions = sink.transitions();
    assert_eq!(transitions.len(), 7);
    for (from, to) in &transitions {
        assert_ne!(from, to);
    }
    for pair in transitions.windows(2) {
        assert_eq!(pair[0].1, pair[1].0, "transitions must chain");
    }
    for event in &sink.events {
        if let AppEvent::StateChanged { to, record, .. } = event {
            assert_eq!(record.state, *to);
        }
    }
}

#[test]
fn idle_cycles_are_quiet() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    for _ in 0..50 {
        assert_eq!(step(&mut ctl, &mut hw, &mut sink, 100), ControllerStatus::Normal);
    }
    assert_eq!(ctl.state(), ControllerState::PowerOff);
    assert_eq!(sink.events, vec![AppEvent::Started(ControllerState::PowerOff)]);
    assert_eq!(hw.isolation_reads, 0);
    assert!(hw.broadcasts().is_empty());
}
