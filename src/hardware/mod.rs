// Hardware capability interfaces
//
// The core never touches concrete device types. Adapters implement whichever
// capabilities their device has:
// - PowerControlled: open-loop power in [-1, 1]
// - PositionControlled: native closed-loop run-to-position with PIDF gains
// - CurrentSensing: instantaneous current draw
// - HeadingSource: robot yaw from the IMU
// - PowerHub: battery voltage, total current and link status

pub mod sim;

use serde::{Deserialize, Serialize};

pub use sim::{SimHub, SimImu, SimMotor};

/// Error types for hardware adapters
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("Device '{name}' not found in hardware map")]
    NotFound { name: String },

    #[error("Device '{name}' is not responding")]
    NotResponding { name: String },

    #[error("Device '{name}' rejected command: {reason}")]
    Rejected { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, HardwareError>;

/// PIDF coefficients for an actuator's native position controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PidfGains {
    pub p: f64,
    pub i: f64,
    pub d: f64,
    pub f: f64,
}

impl PidfGains {
    pub fn new(p: f64, i: f64, d: f64, f: f64) -> Self {
        Self { p, i, d, f }
    }
}

pub trait PowerControlled {
    /// Command open-loop power. Callers keep `power` within [-1, 1].
    fn set_power(&mut self, power: f64) -> Result<()>;
}

pub trait PositionControlled {
    /// Load `gains` into the native controller and start moving to `ticks`,
    /// limited to `max_power`.
    fn set_target_position(&mut self, ticks: i32, gains: PidfGains, max_power: f64) -> Result<()>;

    /// True while the native controller is still driving toward its target
    fn is_busy(&self) -> Result<bool>;

    /// Current encoder position in ticks
    fn position(&self) -> Result<i32>;

    /// Stop and re-zero the encoder
    fn reset_encoder(&mut self) -> Result<()>;
}

pub trait CurrentSensing {
    fn current_amps(&self) -> Result<f64>;
}

pub trait HeadingSource {
    /// Yaw in radians; wrapped or unbounded, callers only use it through trig
    fn heading_radians(&self) -> Result<f64>;

    /// Make the current orientation the new zero
    fn reset_heading(&mut self) -> Result<()>;
}

pub trait PowerHub {
    fn input_voltage(&self) -> Result<f64>;
    fn total_current_amps(&self) -> Result<f64>;
    fn is_responding(&self) -> bool;
}
