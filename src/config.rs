// Loop timing, thresholds, arm setpoints and default gains
//
// These are the compiled fallbacks. Anything with a `KEY_` counterpart can be
// overridden at init through the config store (see `store.rs`).
use std::time::Duration;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Loop rate is averaged over this window
pub const LOOP_RATE_WINDOW_MS: u64 = 1000;

// Operator command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Default location of the override file
pub const CONFIG_PATH: &str = "robot_config.json";

// Directory the match summary is written into
pub const SUMMARY_DIR: &str = ".";

// Drivetrain
pub const DRIVE_SLOW_MODE_MULTIPLIER: f64 = 0.5; // 50% of normal speed
pub const SLOW_TRIGGER_DEADBAND: f64 = 0.1;

// Arm setpoints (encoder ticks)
pub const ARM_LIFT_POSITION: i32 = 1200;
pub const ARM_CARRY_POSITION: i32 = 400;
pub const ARM_INTAKE_POSITION: i32 = 50;
pub const ARM_POWER_LIMIT: f64 = 0.7;
pub const ARM_MANUAL_POWER_MULTIPLIER: f64 = 0.4;

// Arm PIDF defaults
pub const ARM_P: f64 = 10.0;
pub const ARM_I: f64 = 0.0;
pub const ARM_D: f64 = 1.0;
pub const ARM_F: f64 = 0.5;

// Arm current profile and stall protection
pub const ARM_FREE_SPIN_CURRENT_AMPS: f64 = 1.5;
pub const ARM_STALL_THRESHOLD_AMPS: f64 = 9.0;
pub const ARM_STALL_SUSTAIN_MS: u64 = 500;

// Tuning
pub const SETTLE_TOLERANCE_TICKS: i32 = 10;
pub const TUNING_DEFAULT_STEP: f64 = 0.1;
pub const TUNING_MIN_STEP: f64 = 0.0001;

// Power health
pub const VOLTAGE_WARNING_THRESHOLD: f64 = 12.0;
pub const VOLTAGE_DROP_WARNING: f64 = 0.5;
pub const VOLTAGE_DROP_CRITICAL: f64 = 1.0;
pub const EVENT_LOG_CAPACITY: usize = 10;

// Config store keys
pub const KEY_ARM_P: &str = "ARM_P";
pub const KEY_ARM_I: &str = "ARM_I";
pub const KEY_ARM_D: &str = "ARM_D";
pub const KEY_ARM_F: &str = "ARM_F";
pub const KEY_ARM_STALL_THRESHOLD_AMPS: &str = "ARM_STALL_THRESHOLD_AMPS";
pub const KEY_ARM_MANUAL_POWER_MULTIPLIER: &str = "ARM_MANUAL_POWER_MULTIPLIER";
pub const KEY_ARM_POWER_LIMIT: &str = "ARM_POWER_LIMIT";
pub const KEY_DRIVE_SLOW_MODE_MULTIPLIER: &str = "DRIVE_SLOW_MODE_MULTIPLIER";
