//! Isolation-monitor polling once the bus is pre-charged.

use pvc_controller::app::events::AppEvent;
use pvc_controller::control::SessionStage;
use pvc_controller::error::{BusError, Error, SafetyFault};
use pvc_controller::fsm::ControllerState;
use pvc_controller::sensors::IsolationCode;
use pvc_controller::{BoardProfile, Controller};

use crate::mock_hw::{MockHardware, RecordingSink};
use crate::sequencing_tests::{power_up, run_until, started, step};

/// Cycle every 100 ms until the monitor has been read `reads` times.
fn run_to_read(ctl: &mut Controller, hw: &mut MockHardware, sink: &mut RecordingSink, reads: u32) {
    let limit = hw.now_ms + 60_000;
    while hw.isolation_reads < reads {
        assert!(hw.now_ms < limit, "monitor never polled");
        step(ctl, hw, sink, 100);
    }
}

#[test]
fn no_polls_before_precharge() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    for _ in 0..100 {
        step(&mut ctl, &mut hw, &mut sink, 100);
    }
    hw.inputs.key = true;
    step(&mut ctl, &mut hw, &mut sink, 100);
    hw.precharge_dv = 50;
    step(&mut ctl, &mut hw, &mut sink, 300);
    assert_eq!(ctl.state(), ControllerState::Precharging);
    assert_eq!(hw.isolation_reads, 0);
}

#[test]
fn polls_are_paced_by_interval() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    power_up(&mut ctl, &mut hw, &mut sink);
    // Armed when the contactor was commanded closed, 100 ms ago.
    let armed_at = hw.now_ms - 100;

    while hw.now_ms < armed_at + 4900 {
        step(&mut ctl, &mut hw, &mut sink, 100);
    }
    assert_eq!(hw.isolation_reads, 0);

    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(hw.now_ms, armed_at + 5000);
    assert_eq!(hw.isolation_reads, 1);

    while hw.now_ms < armed_at + 15_000 {
        step(&mut ctl, &mut hw, &mut sink, 100);
    }
    assert_eq!(hw.isolation_reads, 3);
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::IsolationPolled { ok: true })),
        3
    );
    assert_eq!(ctl.state(), ControllerState::PoweredOn);
}

#[test]
fn first_poll_consumes_settled_session() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    power_up(&mut ctl, &mut hw, &mut sink);
    assert_eq!(
        ctl.session().map(|s| s.stage),
        Some(SessionStage::SettledAwaitingIsolationRecheck)
    );

    run_to_read(&mut ctl, &mut hw, &mut sink, 1);
    assert!(ctl.session().is_none());
}

#[test]
fn ground_fault_tears_down_after_budget() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    power_up(&mut ctl, &mut hw, &mut sink);
    hw.isolation = Ok(IsolationCode::Fault);

    run_to_read(&mut ctl, &mut hw, &mut sink, 1);
    assert!(sink.events.contains(&AppEvent::IsolationPolled { ok: false }));
    assert_eq!(ctl.state(), ControllerState::PoweredOn);
    assert_eq!(ctl.sto_attempts(), 1);

    // The bad verdict is held between polls and keeps counting.
    step(&mut ctl, &mut hw, &mut sink, 100);
    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(ctl.state(), ControllerState::PoweredOn);
    assert_eq!(ctl.sto_attempts(), 3);
    assert_eq!(hw.isolation_reads, 1);

    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(ctl.state(), ControllerState::ForwardDisableWait);
    assert!(ctl.is_latched());
    assert_eq!(ctl.fault_flags(), SafetyFault::Isolation.mask());
}

#[test]
fn warning_is_accepted() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    power_up(&mut ctl, &mut hw, &mut sink);
    hw.isolation = Ok(IsolationCode::Warning);

    run_to_read(&mut ctl, &mut hw, &mut sink, 2);
    assert_eq!(ctl.state(), ControllerState::PoweredOn);
    assert_eq!(ctl.sto_attempts(), 0);
}

#[test]
fn silent_monitor_is_retried_every_cycle() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    power_up(&mut ctl, &mut hw, &mut sink);
    hw.isolation = Err(Error::Bus(BusError::NoResponse));

    run_to_read(&mut ctl, &mut hw, &mut sink, 1);
    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(hw.isolation_reads, 2);

    // Answers again before the budget runs out.
    hw.isolation = Ok(IsolationCode::NoFault);
    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(hw.isolation_reads, 3);
    step(&mut ctl, &mut hw, &mut sink, 100);
    assert_eq!(hw.isolation_reads, 3);
    assert_eq!(ctl.state(), ControllerState::PoweredOn);
    assert_eq!(ctl.sto_attempts(), 0);
}

#[test]
fn indeterminate_reading_is_retried_every_cycle() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    power_up(&mut ctl, &mut hw, &mut sink);
    hw.isolation = Ok(IsolationCode::Indeterminate);

    run_to_read(&mut ctl, &mut hw, &mut sink, 1);
    for _ in 0..3 {
        step(&mut ctl, &mut hw, &mut sink, 100);
    }
    assert_eq!(hw.isolation_reads, 4);
    assert_eq!(ctl.state(), ControllerState::ForwardDisableWait);
}

#[test]
fn monitoring_disabled_never_polls() {
    let mut profile = BoardProfile::dev1();
    profile.isolation_monitoring = false;
    let (mut ctl, mut hw, mut sink) = started(profile);
    power_up(&mut ctl, &mut hw, &mut sink);
    assert!(ctl.session().is_none());

    for _ in 0..200 {
        step(&mut ctl, &mut hw, &mut sink, 100);
    }
    assert_eq!(hw.isolation_reads, 0);
    assert_eq!(ctl.state(), ControllerState::PoweredOn);
}

#[test]
fn polling_stops_after_power_off() {
    let (mut ctl, mut hw, mut sink) = started(BoardProfile::dev1());
    power_up(&mut ctl, &mut hw, &mut sink);

    hw.inputs.key = false;
    run_until(&mut ctl, &mut hw, &mut sink, ControllerState::PowerOff, 12_000);
    let reads = hw.isolation_reads;

    for _ in 0..200 {
        step(&mut ctl, &mut hw, &mut sink, 100);
    }
    assert_eq!(hw.isolation_reads, reads);
}
