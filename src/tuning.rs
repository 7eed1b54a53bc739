// Closed-loop tuning harness for a position-controlled actuator
//
// A run loads the live PIDF gains into the actuator's native controller,
// commands a setpoint, then is polled once per tick while the actuator is
// busy. Each run reports peak overshoot past the setpoint and the time it took
// to first come within the settle tolerance. Accepted gains are persisted to
// the config store; until then they only exist in memory as the live set.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{
    ARM_D, ARM_F, ARM_I, ARM_P, ARM_POWER_LIMIT, KEY_ARM_D, KEY_ARM_F, KEY_ARM_I, KEY_ARM_P,
    KEY_ARM_POWER_LIMIT, SETTLE_TOLERANCE_TICKS, TUNING_DEFAULT_STEP, TUNING_MIN_STEP,
};
use crate::hardware::{HardwareError, PidfGains, PositionControlled};
use crate::store::ConfigStore;

#[derive(Debug, thiserror::Error)]
pub enum TuningError {
    #[error("A tuning run to {target} is still in progress")]
    RunInProgress { target: i32 },

    #[error("No tuning run in progress")]
    NoRunInProgress,

    #[error("Run to {target} did not finish within {ticks} ticks")]
    NotFinished { target: i32, ticks: usize },

    #[error("Settle tolerance must be a positive number of ticks, got {0}")]
    InvalidTolerance(i32),

    #[error("Actuator error: {0}")]
    Hardware(#[from] HardwareError),
}

pub type Result<T> = std::result::Result<T, TuningError>;

/// One of the four tunable coefficients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GainAxis {
    P,
    I,
    D,
    F,
}

impl GainAxis {
    const ALL: [GainAxis; 4] = [GainAxis::P, GainAxis::I, GainAxis::D, GainAxis::F];

    fn index(self) -> usize {
        match self {
            GainAxis::P => 0,
            GainAxis::I => 1,
            GainAxis::D => 2,
            GainAxis::F => 3,
        }
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// Outcome of the most recent save
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    None,
    Saved,
    Failed,
}

/// Metrics for one run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub target: i32,
    /// Peak excursion past the target, in ticks
    pub overshoot: i32,
    /// Time to first enter the tolerance band, or total run time if it never did
    pub settle_millis: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunProgress {
    Running(RunStats),
    Finished(RunStats),
}

#[derive(Debug, Clone, Copy)]
struct ActiveRun {
    target: i32,
    started_millis: u64,
    /// Sign of travel from the start position toward the target
    direction: i64,
    overshoot: i32,
    settled_millis: Option<f64>,
}

impl ActiveRun {
    fn stats(&self, elapsed_millis: f64) -> RunStats {
        RunStats {
            target: self.target,
            overshoot: self.overshoot,
            settle_millis: self.settled_millis.unwrap_or(elapsed_millis),
        }
    }
}

/// Tuning session for one actuator
#[derive(Debug, Clone)]
pub struct TuningHarness {
    live: PidfGains,
    staged: PidfGains,
    selected: GainAxis,
    step: f64,
    tolerance: i32,
    max_power: f64,
    target: i32,
    last: Option<RunStats>,
    run: Option<ActiveRun>,
    save_status: SaveStatus,
}

impl TuningHarness {
    pub fn new(initial: PidfGains, tolerance: i32, max_power: f64) -> Result<Self> {
        if tolerance <= 0 {
            return Err(TuningError::InvalidTolerance(tolerance));
        }
        Ok(Self {
            live: initial,
            staged: initial,
            selected: GainAxis::P,
            step: TUNING_DEFAULT_STEP,
            tolerance,
            max_power,
            target: 0,
            last: None,
            run: None,
            save_status: SaveStatus::None,
        })
    }

    /// Session seeded from the store, falling back to the compiled arm gains
    pub fn from_store(store: &dyn ConfigStore) -> Self {
        let gains = PidfGains {
            p: store.get_f64(KEY_ARM_P, ARM_P),
            i: store.get_f64(KEY_ARM_I, ARM_I),
            d: store.get_f64(KEY_ARM_D, ARM_D),
            f: store.get_f64(KEY_ARM_F, ARM_F),
        };
        Self {
            live: gains,
            staged: gains,
            selected: GainAxis::P,
            step: TUNING_DEFAULT_STEP,
            tolerance: SETTLE_TOLERANCE_TICKS,
            max_power: store.get_f64(KEY_ARM_POWER_LIMIT, ARM_POWER_LIMIT),
            target: 0,
            last: None,
            run: None,
            save_status: SaveStatus::None,
        }
    }

    /// Apply `gains` and command `target`. Runs never overlap: starting one
    /// while another is in flight is rejected, `abort` first to replace it.
    pub fn begin_run<A: PositionControlled>(
        &mut self,
        actuator: &mut A,
        target: i32,
        gains: PidfGains,
        now_millis: u64,
    ) -> Result<()> {
        if let Some(run) = &self.run {
            return Err(TuningError::RunInProgress { target: run.target });
        }

        let start = actuator.position()?;
        actuator.set_target_position(target, gains, self.max_power)?;

        info!(
            "Tuning run {} -> {} (P={:.4} I={:.4} D={:.4} F={:.4})",
            start, target, gains.p, gains.i, gains.d, gains.f
        );
        self.target = target;
        self.run = Some(ActiveRun {
            target,
            started_millis: now_millis,
            direction: (i64::from(target) - i64::from(start)).signum(),
            overshoot: 0,
            settled_millis: None,
        });
        Ok(())
    }

    /// `begin_run` with the live gains
    pub fn begin_live_run<A: PositionControlled>(
        &mut self,
        actuator: &mut A,
        target: i32,
        now_millis: u64,
    ) -> Result<()> {
        let gains = self.live;
        self.begin_run(actuator, target, gains, now_millis)
    }

    /// Poll the run once. Call every tick until it reports `Finished`.
    pub fn step<A: PositionControlled>(
        &mut self,
        actuator: &A,
        now_millis: u64,
    ) -> Result<RunProgress> {
        let Some(run) = self.run.as_mut() else {
            return Err(TuningError::NoRunInProgress);
        };
        let elapsed = now_millis.saturating_sub(run.started_millis) as f64;

        if !actuator.is_busy()? {
            let stats = run.stats(elapsed);
            if run.settled_millis.is_none() {
                debug!("Run to {} ended without settling", run.target);
            }
            info!(
                "Tuning run to {} done: overshoot {} ticks, settle {:.0} ms",
                stats.target, stats.overshoot, stats.settle_millis
            );
            self.last = Some(stats);
            self.run = None;
            return Ok(RunProgress::Finished(stats));
        }

        // Widened so setpoints near the i32 limits cannot overflow
        let error = i64::from(run.target) - i64::from(actuator.position()?);

        // Only excursions beyond the setpoint count, never approach error
        let past = match run.direction {
            1 if error < 0 => -error,
            -1 if error > 0 => error,
            _ => 0,
        };
        let past = i32::try_from(past).unwrap_or(i32::MAX);
        run.overshoot = run.overshoot.max(past);

        if run.settled_millis.is_none() && error.abs() < i64::from(self.tolerance) {
            run.settled_millis = Some(elapsed);
        }

        Ok(RunProgress::Running(run.stats(elapsed)))
    }

    /// Drive a whole run by polling. `tick` advances the world one period and
    /// returns the new time; the run is aborted after `max_ticks`.
    pub fn run_to_setpoint<A, T>(
        &mut self,
        actuator: &mut A,
        target: i32,
        gains: PidfGains,
        start_millis: u64,
        max_ticks: usize,
        mut tick: T,
    ) -> Result<RunStats>
    where
        A: PositionControlled,
        T: FnMut(&mut A) -> u64,
    {
        self.begin_run(actuator, target, gains, start_millis)?;
        for _ in 0..max_ticks {
            let now = tick(actuator);
            if let RunProgress::Finished(stats) = self.step(actuator, now)? {
                return Ok(stats);
            }
        }
        self.abort();
        Err(TuningError::NotFinished {
            target,
            ticks: max_ticks,
        })
    }

    /// Stop tracking the current run, if any
    pub fn abort(&mut self) -> Option<i32> {
        let run = self.run.take()?;
        warn!("Tuning run to {} aborted", run.target);
        Some(run.target)
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Change one live coefficient by `delta`
    pub fn adjust(&mut self, axis: GainAxis, delta: f64) {
        let value = match axis {
            GainAxis::P => &mut self.live.p,
            GainAxis::I => &mut self.live.i,
            GainAxis::D => &mut self.live.d,
            GainAxis::F => &mut self.live.f,
        };
        *value += delta;
        debug!("{:?} -> {:.4}", axis, *value);
    }

    /// Nudge the selected coefficient up (`+1`) or down (`-1`) by the step
    pub fn nudge_selected(&mut self, up: bool) {
        let delta = if up { self.step } else { -self.step };
        self.adjust(self.selected, delta);
    }

    pub fn select_next(&mut self) {
        self.selected = self.selected.next();
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.prev();
    }

    pub fn increase_step(&mut self) {
        self.step *= 10.0;
    }

    pub fn decrease_step(&mut self) {
        self.step = (self.step / 10.0).max(TUNING_MIN_STEP);
    }

    /// Persist the live gains as one batch. On failure neither the store nor
    /// the staged set changes, and the live values stay put for a retry.
    pub fn save(&mut self, store: &mut dyn ConfigStore) -> SaveStatus {
        let writes = [
            (KEY_ARM_P, self.live.p),
            (KEY_ARM_I, self.live.i),
            (KEY_ARM_D, self.live.d),
            (KEY_ARM_F, self.live.f),
        ];
        if let Err(e) = store.set_many(&writes) {
            warn!("Saving gains failed: {}", e);
            self.save_status = SaveStatus::Failed;
            return self.save_status;
        }
        self.staged = self.live;
        self.save_status = SaveStatus::Saved;
        info!(
            "Gains saved: P={:.4} I={:.4} D={:.4} F={:.4}",
            self.live.p, self.live.i, self.live.d, self.live.f
        );
        self.save_status
    }

    /// Re-zero the encoder and clear run statistics
    pub fn reset<A: PositionControlled>(&mut self, actuator: &mut A) -> Result<()> {
        self.abort();
        actuator.reset_encoder()?;
        self.target = 0;
        self.last = None;
        self.save_status = SaveStatus::None;
        Ok(())
    }

    /// Target for a toggle button: go to `primary` unless already there, in
    /// which case return to `home`
    pub fn toggle_target(&self, primary: i32, home: i32) -> i32 {
        if self.target == primary { home } else { primary }
    }

    pub fn live_gains(&self) -> PidfGains {
        self.live
    }

    pub fn staged_gains(&self) -> PidfGains {
        self.staged
    }

    pub fn selected(&self) -> GainAxis {
        self.selected
    }

    pub fn step_size(&self) -> f64 {
        self.step
    }

    pub fn target(&self) -> i32 {
        self.target
    }

    pub fn last_run(&self) -> Option<RunStats> {
        self.last
    }

    pub fn save_status(&self) -> SaveStatus {
        self.save_status
    }
}
