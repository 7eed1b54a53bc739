// Over-current stall detection for a single actuator
//
// A motor that is commanded to move but mechanically blocked draws abnormally
// high current. Brief spikes on start-up or under heavy load are normal, so a
// stall is only reported once the current has stayed above the threshold
// continuously for longer than the sustain window. Recovery is immediate: the
// first sample at or below the threshold clears everything.

use tracing::{info, warn};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum StallGuardError {
    #[error("Stall threshold must be a positive number of amps, got {0}")]
    InvalidThreshold(f64),
}

/// Debounce state: either below threshold, or above it since a timestamp
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GuardState {
    Normal,
    OverThreshold { since_millis: u64 },
}

/// Stall detector bound to one actuator for its lifetime
#[derive(Debug, Clone)]
pub struct StallGuard {
    threshold_amps: f64,
    sustain_millis: u64,
    state: GuardState,
    stalled: bool,
}

impl StallGuard {
    pub fn new(threshold_amps: f64, sustain_millis: u64) -> Result<Self, StallGuardError> {
        if !threshold_amps.is_finite() || threshold_amps <= 0.0 {
            return Err(StallGuardError::InvalidThreshold(threshold_amps));
        }
        Ok(Self {
            threshold_amps,
            sustain_millis,
            state: GuardState::Normal,
            stalled: false,
        })
    }

    /// Feed one current sample taken at `now_millis`
    pub fn update(&mut self, current_amps: f64, now_millis: u64) {
        if current_amps.is_nan() || current_amps <= self.threshold_amps {
            if self.stalled {
                info!("Stall cleared at {:.2}A", current_amps);
            }
            self.state = GuardState::Normal;
            self.stalled = false;
            return;
        }

        match self.state {
            GuardState::Normal => {
                self.state = GuardState::OverThreshold {
                    since_millis: now_millis,
                };
            }
            GuardState::OverThreshold { since_millis } => {
                if !self.stalled && now_millis.saturating_sub(since_millis) > self.sustain_millis {
                    warn!(
                        "Stall detected: {:.2}A above {:.2}A for {}ms",
                        current_amps,
                        self.threshold_amps,
                        now_millis - since_millis
                    );
                    self.stalled = true;
                }
            }
        }
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn threshold_amps(&self) -> f64 {
        self.threshold_amps
    }

    pub fn sustain_millis(&self) -> u64 {
        self.sustain_millis
    }
}
