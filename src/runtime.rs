// Station loop with watchdog, on simulated hardware
//
// The watchdog zeroes every output if the operator stops sending commands, so
// a crashed teleop never leaves the robot driving on its last input.
// `Station::tick` is deterministic in the time it is given; `run` wraps it in
// a real-time tokio loop fed by JSON lines on stdin.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::arm::ArmController;
use crate::config::{
    ARM_CARRY_POSITION, ARM_INTAKE_POSITION, ARM_LIFT_POSITION, CMD_TIMEOUT, LOOP_HZ,
};
use crate::drive::{MecanumDrive, WHEEL_NAMES};
use crate::hardware::{CurrentSensing, HardwareError, PidfGains, PowerHub, SimHub, SimImu, SimMotor};
use crate::health::{FileSummarySink, HealthMonitor, SagTest, SagVerdict, SummarySink};
use crate::loop_timer::{LoopStats, LoopTimer};
use crate::messages::{OperatorCommand, StationActuation, StationHealth};
use crate::stall::StallGuardError;
use crate::store::{ConfigStore, FileConfigStore};
use crate::tuning::{GainAxis, RunStats, SaveStatus, TuningHarness};

/// Resting voltage of a freshly charged simulated battery
const SIM_BATTERY_VOLTS: f64 = 13.2;

/// Yaw rate of the simulated chassis at full turn power
const SIM_TURN_RATE_RAD_PER_SEC: f64 = 3.0;

/// Any wheel or arm power above this counts as "under load" for the sag test
const LOAD_POWER_DEADBAND: f64 = 0.05;

/// Station state for one match
pub struct Station {
    drive: MecanumDrive<SimMotor, SimImu>,
    arm: ArmController<SimMotor>,
    hub: SimHub,
    health: HealthMonitor,
    sag: SagTest,
    loop_timer: LoopTimer,
    latest_cmd: Option<OperatorCommand>,
    /// Whether a tick has acted on `latest_cmd` yet
    cmd_seen: bool,
    cmd_received_at_millis: u64,
    cmd_fresh: bool,
    status: StationHealth,
}

impl Station {
    pub fn new(store: &dyn ConfigStore, field_relative: bool) -> Result<Self, StallGuardError> {
        let wheels = WHEEL_NAMES.map(SimMotor::new);
        let mut drive = MecanumDrive::from_store(wheels, SimImu::new(), store);
        drive.set_field_relative(field_relative);

        Ok(Self {
            drive,
            arm: ArmController::new(SimMotor::new("arm"), store)?,
            hub: SimHub::new(SIM_BATTERY_VOLTS),
            health: HealthMonitor::with_defaults(),
            sag: SagTest::new(SIM_BATTERY_VOLTS),
            loop_timer: LoopTimer::new(),
            latest_cmd: None,
            cmd_seen: true,
            cmd_received_at_millis: 0,
            cmd_fresh: false,
            status: StationHealth::CmdStale, // Start stale until first cmd
        })
    }

    /// Process incoming command. Several may arrive within one period; the
    /// latest wins, but a button press no tick has seen yet is carried over so
    /// a press and release in the same period still count as one press.
    pub fn on_command(&mut self, mut cmd: OperatorCommand, now_millis: u64) {
        debug!("Received command: {:?}", &cmd);
        if let Some(pending) = self.latest_cmd.as_ref().filter(|_| !self.cmd_seen) {
            cmd.toggle_field_relative |= pending.toggle_field_relative;
            cmd.reset_heading |= pending.reset_heading;
            cmd.reset_loop_peak |= pending.reset_loop_peak;
        }
        self.latest_cmd = Some(cmd);
        self.cmd_seen = false;
        self.cmd_received_at_millis = now_millis;
    }

    fn command_is_fresh(&self, now_millis: u64) -> bool {
        self.latest_cmd.is_some()
            && now_millis.saturating_sub(self.cmd_received_at_millis)
                <= CMD_TIMEOUT.as_millis() as u64
    }

    /// Run one control period of `dt_secs` ending at `now_millis`
    pub fn tick(
        &mut self,
        now_millis: u64,
        dt_secs: f64,
    ) -> Result<StationActuation, HardwareError> {
        let fresh = self.command_is_fresh(now_millis);
        let cmd = match (&self.latest_cmd, fresh) {
            (Some(cmd), true) => cmd.clone(),
            _ => OperatorCommand::default(), // Zero everything
        };
        if self.cmd_fresh && !fresh {
            // Watchdog triggered - stop the robot
            warn!(
                "Command stale ({}ms old), stopping robot",
                now_millis.saturating_sub(self.cmd_received_at_millis)
            );
        }
        self.cmd_fresh = fresh;
        self.cmd_seen = true;

        if cmd.reset_loop_peak {
            self.loop_timer.reset_peak();
        }
        self.loop_timer.update(now_millis);

        let wheels = self.drive.drive(&cmd)?;
        self.arm.set_manual_power(cmd.arm_power)?;

        self.advance_plant(dt_secs, wheels.as_array());

        let arm_stalled = self.arm.update(now_millis)?;

        let voltage = self.hub.input_voltage()?;
        let current = self.hub.total_current_amps()?;
        let link_up = self.hub.is_responding();
        self.health
            .update(current, voltage, link_up, now_millis as f64 / 1000.0);

        let under_load = wheels
            .as_array()
            .iter()
            .chain(std::iter::once(&self.arm.applied_power()))
            .any(|p| p.abs() > LOAD_POWER_DEADBAND);
        self.sag.update(voltage, under_load);

        self.status = if !link_up {
            StationHealth::LinkLost
        } else if !fresh {
            StationHealth::CmdStale
        } else if arm_stalled {
            StationHealth::ArmStalled
        } else if self.health.is_voltage_low() {
            StationHealth::LowVoltage
        } else {
            StationHealth::Ok
        };

        Ok(StationActuation {
            wheels,
            arm_power: self.arm.applied_power(),
            field_relative: self.drive.is_field_relative(),
        })
    }

    /// Step the simulated motors, chassis yaw and battery load
    fn advance_plant(&mut self, dt_secs: f64, powers: [f64; 4]) {
        let mut load = 0.0;
        for wheel in self.drive.wheels_mut() {
            wheel.advance(dt_secs);
            load += wheel.current_amps().unwrap_or(0.0);
        }
        self.arm.motor_mut().advance(dt_secs);
        load += self.arm.motor().current_amps().unwrap_or(0.0);
        self.hub.set_load(load);

        let [fl, fr, rl, rr] = powers;
        let yaw_rate = (fl - fr + rl - rr) / 4.0 * SIM_TURN_RATE_RAD_PER_SEC;
        self.drive.imu_mut().rotate(yaw_rate * dt_secs);
    }

    /// Best-effort export of the match summary
    pub fn save_summary(&mut self, sink: &mut dyn SummarySink) -> bool {
        self.health.save_summary(sink)
    }

    pub fn status(&self) -> StationHealth {
        self.status
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn loop_stats(&self) -> LoopStats {
        self.loop_timer.stats()
    }

    pub fn sag_verdict(&self) -> SagVerdict {
        self.sag.verdict()
    }

    pub fn arm(&self) -> &ArmController<SimMotor> {
        &self.arm
    }

    pub fn arm_mut(&mut self) -> &mut ArmController<SimMotor> {
        &mut self.arm
    }

    pub fn hub_mut(&mut self) -> &mut SimHub {
        &mut self.hub
    }
}

/// One line of station output
#[derive(Debug, Serialize)]
struct StationOutput<'a> {
    t_millis: u64,
    actuation: &'a StationActuation,
    health: StationHealth,
    #[serde(flatten)]
    loop_stats: LoopStats,
}

#[derive(Debug, Clone)]
pub struct DriveOptions {
    pub config_path: PathBuf,
    pub summary_dir: PathBuf,
    pub loop_hz: u64,
    pub field_relative: bool,
}

impl Default for DriveOptions {
    fn default() -> Self {
        Self {
            config_path: crate::config::CONFIG_PATH.into(),
            summary_dir: crate::config::SUMMARY_DIR.into(),
            loop_hz: LOOP_HZ,
            field_relative: true,
        }
    }
}

pub async fn run(opts: DriveOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let store = FileConfigStore::load(&opts.config_path);
    let station = Station::new(&store, opts.field_relative)?;
    let mut sink = FileSummarySink::new(&opts.summary_dir);

    info!(
        "Station started: {}Hz loop, {}ms watchdog timeout, {}",
        opts.loop_hz.max(1),
        CMD_TIMEOUT.as_millis(),
        if opts.field_relative {
            "field-relative"
        } else {
            "robot-relative"
        }
    );

    serve(
        station,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        &mut sink,
        opts.loop_hz,
    )
    .await
}

/// Run the station loop over line-delimited JSON until `input` closes, Ctrl-C
/// or an error. The match summary goes to `sink` in every case.
pub async fn serve<R, W>(
    mut station: Station,
    input: R,
    mut output: W,
    sink: &mut dyn SummarySink,
    loop_hz: u64,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    // Forward input lines to the loop; the channel closes on EOF
    let (tx, mut rx) = mpsc::channel::<String>(64);
    tokio::spawn(async move {
        let mut lines = input.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read operator input: {}", e);
                    break;
                }
            }
        }
    });

    let loop_hz = loop_hz.max(1);
    let dt_secs = 1.0 / loop_hz as f64;
    let mut tick = interval(Duration::from_millis(1000 / loop_hz));
    let started = Instant::now();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut ctrl_c_armed = true;

    let mut failure: Option<Box<dyn std::error::Error + Send + Sync>> = None;
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            signal = &mut ctrl_c, if ctrl_c_armed => match signal {
                Ok(()) => {
                    info!("Ctrl-C received, shutting down");
                    break;
                }
                Err(e) => {
                    warn!("Ctrl-C handler unavailable: {}", e);
                    ctrl_c_armed = false;
                    continue;
                }
            },
        }
        let now_millis = started.elapsed().as_millis() as u64;

        // 1. Drain all pending commands (non-blocking), keep latest
        let mut input_closed = false;
        loop {
            match rx.try_recv() {
                Ok(line) if line.trim().is_empty() => {}
                Ok(line) => match serde_json::from_str::<OperatorCommand>(&line) {
                    Ok(cmd) => station.on_command(cmd, now_millis),
                    Err(e) => warn!("Failed to parse command: {}", e),
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    input_closed = true;
                    break;
                }
            }
        }

        // 2. Compute actuation (includes watchdog logic)
        let actuation = match station.tick(now_millis, dt_secs) {
            Ok(actuation) => actuation,
            Err(e) => {
                failure = Some(e.into());
                break;
            }
        };

        // 3. Publish actuation and health
        if let Err(e) = publish(&mut output, now_millis, &actuation, &station).await {
            failure = Some(e);
            break;
        }

        if input_closed {
            info!("Operator input closed, shutting down");
            break;
        }
    }

    // The match log is written however the loop ended
    station.save_summary(sink);
    let loop_stats = station.loop_stats();
    info!(
        "Loop rate {:.1}Hz, peak loop time {}ms",
        loop_stats.loop_hz, loop_stats.peak_loop_ms
    );
    info!("Battery sag verdict: {:?}", station.sag_verdict());

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn publish<W: AsyncWrite + Unpin>(
    output: &mut W,
    now_millis: u64,
    actuation: &StationActuation,
    station: &Station,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut line = serde_json::to_string(&StationOutput {
        t_millis: now_millis,
        actuation,
        health: station.status(),
        loop_stats: station.loop_stats(),
    })?;
    line.push('\n');
    output.write_all(line.as_bytes()).await?;
    output.flush().await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct TuneOptions {
    pub config_path: PathBuf,
    /// Explicit setpoints; empty means the lift/carry toggle sequence
    pub targets: Vec<i32>,
    /// Gain overrides applied on top of the stored values
    pub p: Option<f64>,
    pub i: Option<f64>,
    pub d: Option<f64>,
    pub f: Option<f64>,
    pub save: bool,
    pub loop_hz: u64,
    /// Simulated seconds a single run may take
    pub run_timeout_secs: u64,
}

/// Tuning session against a simulated arm, in simulated time
pub fn tune(opts: TuneOptions) -> Result<Vec<RunStats>, Box<dyn std::error::Error + Send + Sync>> {
    let mut store = FileConfigStore::load(&opts.config_path);
    let mut harness = TuningHarness::from_store(&store);
    apply_overrides(&mut harness, &opts);

    let mut arm = SimMotor::new("arm");
    let loop_hz = opts.loop_hz.max(1);
    let period_millis = 1000 / loop_hz;
    let max_ticks = (opts.run_timeout_secs * loop_hz) as usize;

    // Lift and back, then carry and back, as an operator would toggle them
    let plan: Vec<Setpoint> = if opts.targets.is_empty() {
        [ARM_LIFT_POSITION, ARM_LIFT_POSITION, ARM_CARRY_POSITION, ARM_CARRY_POSITION]
            .into_iter()
            .map(Setpoint::Toggle)
            .collect()
    } else {
        opts.targets.iter().copied().map(Setpoint::Fixed).collect()
    };

    let mut clock = 0;
    let mut results = Vec::with_capacity(plan.len());
    for step in plan {
        let target = match step {
            Setpoint::Fixed(t) => t,
            Setpoint::Toggle(primary) => harness.toggle_target(primary, ARM_INTAKE_POSITION),
        };
        let gains = harness.live_gains();
        let stats = harness.run_to_setpoint(&mut arm, target, gains, clock, max_ticks, |m| {
            m.advance(period_millis as f64 / 1000.0);
            clock += period_millis;
            clock
        })?;
        results.push(stats);
    }

    if opts.save {
        match harness.save(&mut store) {
            SaveStatus::Saved => info!("Gains saved to {}", store.path().display()),
            status => warn!("Save status: {:?}", status),
        }
    }
    Ok(results)
}

#[derive(Debug, Clone, Copy)]
enum Setpoint {
    Fixed(i32),
    /// Toggle between this position and intake
    Toggle(i32),
}

fn apply_overrides(harness: &mut TuningHarness, opts: &TuneOptions) {
    let live: PidfGains = harness.live_gains();
    let overrides = [
        (GainAxis::P, opts.p, live.p),
        (GainAxis::I, opts.i, live.i),
        (GainAxis::D, opts.d, live.d),
        (GainAxis::F, opts.f, live.f),
    ];
    for (axis, wanted, current) in overrides {
        if let Some(value) = wanted {
            harness.adjust(axis, value - current);
        }
    }
}
