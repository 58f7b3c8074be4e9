//! Pre-charge controller bench: runs the real controller and drivers
//! against the simulated plant.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter ── BoardInputs · PathOutputs · Contactor      │
//! │  (Sensor+Actuator    VoltageSense · Sim100 · ManualClock       │
//! │   +Broadcast+Clock)          │                                 │
//! │                              ▼                                 │
//! │                     Plant (RC bus, pack, monitor)              │
//! │                                                                │
//! │  Tee(LogEventSink, CanStatusSink)  ◀── EventSink               │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              Controller (pure logic)                   │    │
//! │  │  Interlock · FSM · Charge curve                        │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `pvc-bench [dev1 | kev1n | <profile.json>]`.  The log level is
//! taken from `PVC_LOG` as an env-filter directive (default `info`).

#![deny(unused_must_use)]

use anyhow::{Context, Result, bail};
use log::{info, warn};
use tracing_subscriber::EnvFilter;

use pvc_controller::adapters::can_sink::{CanStatusSink, Tee};
use pvc_controller::adapters::log_sink::LogEventSink;
use pvc_controller::adapters::sim::{Plant, SimCan, SimHardware};
use pvc_controller::bus::ChangeNotification;
use pvc_controller::bus::messages::{BMS_RESET_ID, STATUS_ID};
use pvc_controller::fsm::ControllerState;
use pvc_controller::{BoardProfile, Controller, Error};

type BenchSink = Tee<LogEventSink, CanStatusSink<SimCan>>;

/// Pack voltage the bench plant is charged to (decivolts).
const PACK_DV: u8 = 100;

fn main() -> Result<()> {
    // ── 1. Logging ────────────────────────────────────────────
    // `log` records reach the subscriber through its tracing-log bridge.
    let filter = EnvFilter::try_from_env("PVC_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("logger: {e}"))?;

    info!("╔══════════════════════════════════════╗");
    info!("║  PVC bench v{}                    ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Board profile ──────────────────────────────────────
    let profile = load_profile(std::env::args().nth(1).as_deref())?;
    info!("Profile: {:?}", profile);

    // ── 3. Plant, adapters, controller ────────────────────────
    let plant = Plant::new(&profile, PACK_DV);
    let mut hw = plant.hardware(&profile).map_err(Error::from)?;
    let mut sink = Tee(LogEventSink::new(), CanStatusSink::new(plant.can()));
    let mut ctl = Controller::new(profile)?;
    ctl.start(&mut hw, &mut sink);

    let mut bench = Bench {
        plant,
        hw,
        sink,
        ctl,
        period_ms: u64::from(profile.control_period_ms),
    };

    // ── 4. Scenario ───────────────────────────────────────────
    bench.run_for(500);

    info!("── key on ──");
    bench.plant.set_key(true);
    bench.run_until(10_000, ControllerState::PoweredOn)?;
    bench.run_for(6_000);

    info!("── e-stop pressed ──");
    bench.plant.press_estop(true);
    bench.run_until(15_000, ControllerState::EStopWait)?;

    info!("── key cycled under e-stop: BMS reset ──");
    bench.plant.set_key(false);
    bench.run_for(300);
    bench.plant.set_key(true);
    bench.run_for(300);

    info!("── e-stop released, key off ──");
    bench.plant.press_estop(false);
    bench.plant.set_key(false);
    bench.run_until(2_000, ControllerState::PowerOff)?;

    info!("── key on again ──");
    bench.plant.set_key(true);
    bench.run_until(10_000, ControllerState::PoweredOn)?;
    bench.run_for(1_000);

    info!("── key off ──");
    bench.plant.set_key(false);
    bench.run_until(15_000, ControllerState::PowerOff)?;

    // ── 5. Summary ────────────────────────────────────────────
    bench.monitor_report();
    bench.summary();
    Ok(())
}

fn load_profile(arg: Option<&str>) -> Result<BoardProfile> {
    let profile = match arg {
        None | Some("dev1") => BoardProfile::dev1(),
        Some("kev1n") => BoardProfile::kev1n(),
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading profile {path}"))?;
            serde_json::from_str(&text).with_context(|| format!("parsing profile {path}"))?
        }
    };
    profile.validate().map_err(Error::from)?;
    Ok(profile)
}

struct Bench {
    plant: Plant,
    hw: SimHardware,
    sink: BenchSink,
    ctl: Controller,
    period_ms: u64,
}

impl Bench {
    fn cycle(&mut self) {
        self.ctl.handle(&mut self.hw, &mut self.sink);
        self.plant.advance(self.period_ms);
    }

    fn run_for(&mut self, ms: u64) {
        let end = self.plant.now_ms() + ms;
        while self.plant.now_ms() < end {
            self.cycle();
        }
    }

    fn run_until(&mut self, timeout_ms: u64, target: ControllerState) -> Result<()> {
        let end = self.plant.now_ms() + timeout_ms;
        while self.ctl.state() != target {
            if self.plant.now_ms() >= end {
                bail!(
                    "still in {:?} after {} ms waiting for {:?}",
                    self.ctl.state(),
                    timeout_ms,
                    target
                );
            }
            self.cycle();
        }
        info!(
            "Reached {:?} at t={} ms (bus {:.1} dV)",
            target,
            self.plant.now_ms(),
            self.plant.bus_dv()
        );
        Ok(())
    }

    /// Read the isolation monitor's diagnostics directly.
    fn monitor_report(&mut self) {
        let (monitor, bus) = self.hw.isolation_monitor();
        match monitor.battery_voltage(bus) {
            Ok(v) => info!("SIM100 battery voltage: {} V", v),
            Err(e) => warn!("SIM100 battery voltage: {}", e),
        }
        match monitor.temperature(bus) {
            Ok(t) => info!("SIM100 temperature: {}", t),
            Err(e) => warn!("SIM100 temperature: {}", e),
        }
        match monitor.error_flags(bus) {
            Ok(flags) => info!("SIM100 error flags: 0b{:08b}", flags),
            Err(e) => warn!("SIM100 error flags: {}", e),
        }
    }

    fn summary(&self) {
        let records: Vec<ChangeNotification> = self
            .plant
            .frames_with_id(u32::from(STATUS_ID))
            .iter()
            .filter_map(|f| ChangeNotification::decode(&f.data).ok())
            .collect();
        let resets = self.plant.frames_with_id(u32::from(BMS_RESET_ID)).len();
        let (opens, closes) = self.plant.with(|s| s.coil_pulses);

        info!("── summary ──");
        info!("cycles:          {}", self.ctl.tick_count());
        info!("status records:  {}", records.len());
        for r in &records {
            info!(
                "  {:?} key={} sto={} cont={} pc={} dc={} apm={}",
                r.state,
                u8::from(r.key),
                u8::from(r.sto),
                u8::from(r.contactor_closed),
                u8::from(r.precharge),
                u8::from(r.discharge),
                u8::from(r.apm),
            );
        }
        info!("BMS reset frames: {}", resets);
        info!("coil pulses:     open={} close={}", opens, closes);
        if self.sink.1.failed() > 0 {
            warn!("{} status records failed to send", self.sink.1.failed());
        }
    }
}
