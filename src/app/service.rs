//! Application service: the hexagonal core.
//!
//! [`Controller`] owns the state machine, the safety interlock, the
//! isolation poll pacing and the shared context.  All I/O flows through
//! port traits injected at call sites, so the whole controller runs
//! against mock adapters in tests and against the simulated plant on a
//! host.
//!
//! ```text
//!   SensorPort ──▶ ┌────────────────────────────┐ ──▶ EventSink
//!    ClockPort ──▶ │         Controller         │
//! ActuatorPort ◀── │  Interlock · FSM · Curve   │
//! BroadcastPort ◀──└────────────────────────────┘
//! ```
//!
//! One [`Controller::handle`] call is one control cycle:
//!
//! 1. refresh safety inputs (digital lines, voltages, isolation when due)
//!    and evaluate the interlock
//! 2. refresh the I/O mirror (contactor position)
//! 3. dispatch to the current state's handler
//! 4. apply the resulting actuation and broadcasts
//! 5. notify on a distinct state change

use log::{debug, error, info, warn};

use crate::bus::{BusMessage, ChangeNotification};
use crate::config::BoardProfile;
use crate::control::{PrechargeSession, SessionStage};
use crate::drivers::PathOutput;
use crate::error::Result;
use crate::fsm::context::{FsmContext, SensorSnapshot};
use crate::fsm::states::build_state_table;
use crate::fsm::{ControllerState, Fsm};
use crate::safety::{IsolationPoller, SafetyInterlock, StoInputs};
use crate::sensors::{InputLevels, VoltageChannel};

use super::events::{AppEvent, StatusLine};
use super::ports::{ActuatorPort, BroadcastPort, ClockPort, EventSink, SensorPort};

/// Overall verdict of one control cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerStatus {
    Normal,
    /// The interlock verdict is unsafe or a key cycle is pending.
    Faulted,
}

// ───────────────────────────────────────────────────────────────
// Controller
// ───────────────────────────────────────────────────────────────

/// The pre-charge controller.  Exactly one instance owns all mutable
/// sequencing state.
pub struct Controller {
    fsm: Fsm,
    ctx: FsmContext,
    interlock: SafetyInterlock,
    isolation: IsolationPoller,
    tick_count: u64,
}

impl Controller {
    /// Construct the controller for a board.  The profile is validated
    /// first; an unsafe profile is rejected, never clamped.
    ///
    /// Does **not** start the FSM; call [`start`](Self::start) next.
    pub fn new(profile: BoardProfile) -> Result<Self> {
        profile.validate()?;
        info!("Controller for {:?}", profile.name);
        Ok(Self {
            fsm: Fsm::new(build_state_table(), ControllerState::PowerOff),
            ctx: FsmContext::new(profile),
            interlock: SafetyInterlock::new(&profile),
            isolation: IsolationPoller::new(&profile),
            tick_count: 0,
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Enter `PowerOff` and drive every output to its de-energised level.
    pub fn start(
        &mut self,
        hw: &mut (impl ActuatorPort + BroadcastPort + ClockPort),
        sink: &mut impl EventSink,
    ) {
        self.ctx.now_ms = hw.now_ms();
        self.fsm.start(&mut self.ctx);
        self.apply_commands(hw);
        self.ctx.contactor_open = hw.contactor_open();
        sink.emit(&AppEvent::Started(self.fsm.current_state()));
        info!("Controller started in {:?}", self.fsm.current_state());
    }

    // ── Per-cycle orchestration ───────────────────────────────

    /// Run one control cycle.
    ///
    /// `hw` satisfies every hardware port at once; this keeps a single
    /// mutable borrow while the port boundary stays explicit.
    pub fn handle(
        &mut self,
        hw: &mut (impl SensorPort + ActuatorPort + BroadcastPort + ClockPort),
        sink: &mut impl EventSink,
    ) -> ControllerStatus {
        self.tick_count += 1;
        let prev_state = self.fsm.current_state();
        let was_latched = self.interlock.is_latched();
        self.ctx.now_ms = hw.now_ms();

        // 1. Safety inputs
        let inputs = self.refresh_sensors(hw);
        let isolation_ok = self.poll_isolation(hw, sink);
        let sto = StoInputs {
            battery1_ok: inputs.battery1_ok,
            battery2_ok: inputs.battery2_ok,
            estop_active: inputs.estop_active,
            isolation_ok,
            pack_voltage_ok: self.pack_voltage_ok(),
        };
        self.ctx.safe = self.interlock.evaluate(&sto, self.ctx.post_precharge);
        self.ctx.fault_flags = self.interlock.faults();
        self.ctx.key = self.interlock.effective_key(inputs.key);

        // 2. I/O mirror
        self.ctx.contactor_open = hw.contactor_open();

        // 3. Dispatch
        self.fsm.tick(&mut self.ctx);
        if let Some(reason) = self.ctx.divergence.take() {
            sink.emit(&AppEvent::PrechargeDiverged(reason));
        }
        if let Some(reason) = self.ctx.latch_request.take() {
            self.interlock.latch(reason);
        }

        // 4. Actuation
        self.apply_commands(hw);
        self.ctx.contactor_open = hw.contactor_open();
        self.ctx.prev_key_raw = inputs.key;
        self.track_precharge_phase();

        // 5. Notification
        match (was_latched, self.interlock.is_latched()) {
            (false, true) => sink.emit(&AppEvent::FaultLatched(self.ctx.fault_flags)),
            (true, false) => sink.emit(&AppEvent::LatchCleared),
            _ => {}
        }
        let state = self.fsm.current_state();
        if state != prev_state {
            sink.emit(&AppEvent::StateChanged {
                from: prev_state,
                to: state,
                record: self.notification(),
            });
        }
        if self.ctx.profile.log_status_each_cycle {
            sink.emit(&AppEvent::Status(self.status_line()));
        }

        if self.ctx.safe && !self.interlock.is_latched() {
            ControllerStatus::Normal
        } else {
            ControllerStatus::Faulted
        }
    }

    // ── Queries ───────────────────────────────────────────────

    /// Current FSM state.
    pub fn state(&self) -> ControllerState {
        self.fsm.current_state()
    }

    /// Interlock verdict from the last cycle.
    pub fn is_safe(&self) -> bool {
        self.ctx.safe
    }

    /// A key cycle is pending.
    pub fn is_latched(&self) -> bool {
        self.interlock.is_latched()
    }

    /// Active fault bitmask (0 = none).
    pub fn fault_flags(&self) -> u8 {
        self.ctx.fault_flags
    }

    /// Consecutive unsafe evaluations so far.
    pub fn sto_attempts(&self) -> u8 {
        self.interlock.attempts()
    }

    pub fn session(&self) -> Option<&PrechargeSession> {
        self.ctx.session.as_ref()
    }

    /// Readings sampled at the start of the last cycle.
    pub fn sensors(&self) -> SensorSnapshot {
        self.ctx.sensors
    }

    pub fn profile(&self) -> &BoardProfile {
        &self.ctx.profile
    }

    /// The bus has been pre-charged since the last `PowerOff`.
    pub fn is_post_precharge(&self) -> bool {
        self.ctx.post_precharge
    }

    /// Total control cycles executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// The status record as it stands now.
    pub fn notification(&self) -> ChangeNotification {
        let inputs = self.ctx.sensors.inputs;
        let cmds = &self.ctx.commands;
        ChangeNotification {
            state: self.fsm.current_state(),
            key: self.ctx.key,
            sto: self.ctx.safe,
            battery1_ok: inputs.battery1_ok,
            battery2_ok: inputs.battery2_ok,
            estop_active: inputs.estop_active,
            apm: cmds.apm,
            precharge: cmds.precharge,
            discharge: cmds.discharge,
            contactor_closed: !self.ctx.contactor_open,
            pack_voltage_ok: self.pack_voltage_ok(),
        }
    }

    /// Per-cycle debug view.
    pub fn status_line(&self) -> StatusLine {
        StatusLine {
            state: self.fsm.current_state(),
            raw_key: self.ctx.sensors.inputs.key,
            key: self.ctx.key,
            safe: self.ctx.safe,
            latched: self.interlock.is_latched(),
            sto_attempts: self.interlock.attempts(),
            precharge_dv: self.ctx.sensors.precharge_dv,
            pack_dv: self.ctx.sensors.pack_dv,
            fault_flags: self.ctx.fault_flags,
        }
    }

    // ── Internal ──────────────────────────────────────────────

    /// Sample every input.  An unreadable source counts as "not ok" for
    /// this cycle: all digital lines low (e-stop asserted) or 0 dV.
    fn refresh_sensors(&mut self, hw: &mut impl SensorPort) -> InputLevels {
        let inputs = hw.read_inputs().unwrap_or_else(|e| {
            error!("Input read failed: {}", e);
            InputLevels::default()
        });
        let mut read = |channel| {
            hw.read_voltage(channel).unwrap_or_else(|e| {
                error!("{:?} voltage read failed: {}", channel, e);
                0
            })
        };
        let precharge_dv = read(VoltageChannel::PrechargeSide);
        let pack_dv = read(VoltageChannel::Pack);

        self.ctx.sensors = SensorSnapshot {
            inputs,
            precharge_dv,
            pack_dv,
        };
        inputs
    }

    /// Query the isolation monitor when a poll is due, else reuse the last
    /// verdict.  The first poll after a pre-charge completes the session.
    fn poll_isolation(&mut self, hw: &mut impl SensorPort, sink: &mut impl EventSink) -> bool {
        let now = self.ctx.now_ms;
        if !self.isolation.is_due(now) {
            return self.isolation.is_ok();
        }
        let ok = self.isolation.record(now, hw.read_isolation());
        debug!("Isolation poll: ok={}", ok);
        sink.emit(&AppEvent::IsolationPolled { ok });

        if self
            .ctx
            .session
            .is_some_and(|s| s.stage == SessionStage::SettledAwaitingIsolationRecheck)
        {
            info!("Post-charge isolation recheck done (ok={})", ok);
            self.ctx.session = None;
        }
        ok
    }

    fn pack_voltage_ok(&self) -> bool {
        self.ctx.sensors.pack_dv > self.ctx.profile.min_pack_voltage_dv
    }

    /// Arm the isolation poller once the bus is pre-charged, disarm it
    /// when the machine is back in `PowerOff`.
    fn track_precharge_phase(&mut self) {
        if !self.ctx.post_precharge {
            if self.isolation.is_armed() {
                self.isolation.disarm();
            }
            return;
        }
        if !self.ctx.profile.isolation_monitoring {
            self.ctx.session = None;
        } else if !self.isolation.is_armed() {
            self.isolation.arm(self.ctx.now_ms);
            debug!(
                "Isolation polling armed, every {} ms",
                self.ctx.profile.isolation_poll_interval_ms
            );
        }
    }

    /// Translate the FSM commands into port calls.  Failures are logged;
    /// the next cycle retries with the same commanded levels.
    fn apply_commands(&mut self, hw: &mut (impl ActuatorPort + BroadcastPort)) {
        let closing = !self.ctx.commands.contactor.is_open();

        // Close before the pre-charge path drops; drop APM before opening.
        if closing {
            self.drive_contactor(hw);
        }
        let cmds = &self.ctx.commands;
        for (output, on) in [
            (PathOutput::Precharge, cmds.precharge),
            (PathOutput::Discharge, cmds.discharge),
            (PathOutput::Apm, cmds.apm),
        ] {
            if let Err(e) = hw.set_output(output, on) {
                error!("{:?} output: {}", output, e);
            }
        }
        if !closing {
            self.drive_contactor(hw);
        }

        let node = self.ctx.profile.tms_node_id;
        for msg in core::mem::take(&mut self.ctx.commands.broadcasts) {
            let (frame, repeats) = BusMessage::for_broadcast(msg, node);
            for _ in 0..repeats {
                if let Err(e) = hw.broadcast(&frame) {
                    warn!("{:?} broadcast failed: {}", msg, e);
                }
            }
        }
    }

    fn drive_contactor(&self, hw: &mut impl ActuatorPort) {
        let open = self.ctx.commands.contactor.is_open();
        if let Err(e) = hw.set_contactor_open(open) {
            error!(
                "Contactor {} failed: {}",
                if open { "open" } else { "close" },
                e
            );
        }
    }
}
