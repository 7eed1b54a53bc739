// Drivetrain module for the mecanum base
//
// Provides:
// - Mecanum inverse kinematics (driver intent -> wheel powers)
// - High-level drivetrain with field/robot-relative modes

mod driver;
pub mod kinematics;

pub use driver::{MecanumDrive, WHEEL_NAMES};
pub use kinematics::{WheelPowers, compute_wheel_powers};
