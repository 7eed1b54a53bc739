// High-level drivetrain for the mecanum base
//
// Combines kinematics with the wheel and IMU capabilities to provide a simple
// API for the station loop: drive modes, slow mode, heading reset.

use tracing::{debug, info, warn};

use super::kinematics::{WheelPowers, compute_wheel_powers};
use crate::config::{
    DRIVE_SLOW_MODE_MULTIPLIER, KEY_DRIVE_SLOW_MODE_MULTIPLIER, SLOW_TRIGGER_DEADBAND,
};
use crate::hardware::{HeadingSource, PowerControlled, Result};
use crate::messages::OperatorCommand;
use crate::store::ConfigStore;

/// Wheel slots in the order used by `WheelPowers::as_array`
pub const WHEEL_NAMES: [&str; 4] = ["frontLeft", "frontRight", "rearLeft", "rearRight"];

/// Mecanum drivetrain with toggleable field-relative control
pub struct MecanumDrive<W: PowerControlled, H: HeadingSource> {
    wheels: [W; 4], // [front_left, front_right, rear_left, rear_right]
    imu: H,
    field_relative: bool,
    toggle_was_pressed: bool,
    slow_multiplier: f64,
}

impl<W: PowerControlled, H: HeadingSource> MecanumDrive<W, H> {
    /// Create a drivetrain; starts in field-relative mode
    pub fn new(wheels: [W; 4], imu: H) -> Self {
        Self {
            wheels,
            imu,
            field_relative: true,
            toggle_was_pressed: false,
            slow_multiplier: DRIVE_SLOW_MODE_MULTIPLIER,
        }
    }

    /// Create a drivetrain with overrides from the config store
    pub fn from_store(wheels: [W; 4], imu: H, store: &dyn ConfigStore) -> Self {
        let mut drive = Self::new(wheels, imu);
        drive.slow_multiplier =
            store.get_f64(KEY_DRIVE_SLOW_MODE_MULTIPLIER, DRIVE_SLOW_MODE_MULTIPLIER);
        drive
    }

    pub fn is_field_relative(&self) -> bool {
        self.field_relative
    }

    pub fn set_field_relative(&mut self, field_relative: bool) {
        self.field_relative = field_relative;
    }

    /// Flip the drive mode once per button press, however long it is held
    fn handle_toggle(&mut self, pressed: bool) {
        if pressed && !self.toggle_was_pressed {
            self.field_relative = !self.field_relative;
            info!(
                "Drive mode: {}",
                if self.field_relative {
                    "FIELD-RELATIVE"
                } else {
                    "ROBOT-RELATIVE"
                }
            );
        }
        self.toggle_was_pressed = pressed;
    }

    /// Run one tick of driver control
    pub fn drive(&mut self, cmd: &OperatorCommand) -> Result<WheelPowers> {
        self.handle_toggle(cmd.toggle_field_relative);

        if cmd.reset_heading {
            self.imu.reset_heading()?;
            debug!("Heading re-zeroed");
        }

        let intent = if cmd.slow_trigger > SLOW_TRIGGER_DEADBAND {
            cmd.drive.scaled(self.slow_multiplier)
        } else {
            cmd.drive
        };

        let heading = if self.field_relative {
            match self.imu.heading_radians() {
                Ok(h) => Some(h),
                Err(e) => {
                    // Robot-relative is the failsafe when the IMU drops out
                    warn!("Heading unavailable ({}), driving robot-relative", e);
                    None
                }
            }
        } else {
            None
        };

        let powers = compute_wheel_powers(intent, heading);
        self.set_wheel_powers(powers)?;
        Ok(powers)
    }

    /// Send wheel powers to all four motors
    pub fn set_wheel_powers(&mut self, powers: WheelPowers) -> Result<()> {
        for (wheel, power) in self.wheels.iter_mut().zip(powers.as_array()) {
            wheel.set_power(power)?;
        }
        Ok(())
    }

    /// Stop all wheels immediately
    pub fn stop(&mut self) -> Result<()> {
        self.set_wheel_powers(WheelPowers::zero())
    }

    pub fn wheels(&self) -> &[W; 4] {
        &self.wheels
    }

    pub fn wheels_mut(&mut self) -> &mut [W; 4] {
        &mut self.wheels
    }

    pub fn imu(&self) -> &H {
        &self.imu
    }

    pub fn imu_mut(&mut self) -> &mut H {
        &mut self.imu
    }
}

impl<W: PowerControlled, H: HeadingSource> Drop for MecanumDrive<W, H> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop drivetrain on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{HardwareError, SimImu, SimMotor};
    use crate::messages::DriveIntent;
    use crate::store::MemoryConfigStore;

    fn sim_drive() -> MecanumDrive<SimMotor, SimImu> {
        let wheels = WHEEL_NAMES.map(SimMotor::new);
        MecanumDrive::new(wheels, SimImu::new())
    }

    fn forward_cmd() -> OperatorCommand {
        OperatorCommand {
            drive: DriveIntent::new(1.0, 0.0, 0.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_powers_reach_motors() {
        let mut drive = sim_drive();
        drive.set_field_relative(false);
        let cmd = OperatorCommand {
            drive: DriveIntent::new(0.0, 0.0, 1.0),
            ..Default::default()
        };
        drive.drive(&cmd).unwrap();
        let applied: Vec<f64> = drive.wheels().iter().map(|w| w.power()).collect();
        assert_eq!(applied, vec![1.0, -1.0, 1.0, -1.0]);
    }

    #[test]
    fn test_toggle_flips_once_per_press() {
        let mut drive = sim_drive();
        assert!(drive.is_field_relative());

        let mut cmd = forward_cmd();
        cmd.toggle_field_relative = true;
        for _ in 0..5 {
            drive.drive(&cmd).unwrap();
        }
        assert!(!drive.is_field_relative(), "held button toggles exactly once");

        cmd.toggle_field_relative = false;
        drive.drive(&cmd).unwrap();
        cmd.toggle_field_relative = true;
        drive.drive(&cmd).unwrap();
        assert!(drive.is_field_relative());
    }

    #[test]
    fn test_slow_mode_halves_intent() {
        let mut drive = sim_drive();
        let mut cmd = forward_cmd();
        cmd.slow_trigger = 0.8;
        let powers = drive.drive(&cmd).unwrap();
        assert_eq!(powers.as_array(), [0.5; 4]);

        cmd.slow_trigger = 0.05; // inside deadband
        let powers = drive.drive(&cmd).unwrap();
        assert_eq!(powers.as_array(), [1.0; 4]);
    }

    #[test]
    fn test_slow_multiplier_from_store() {
        let mut store = MemoryConfigStore::new();
        store.set_f64(KEY_DRIVE_SLOW_MODE_MULTIPLIER, 0.25).unwrap();
        let wheels = WHEEL_NAMES.map(SimMotor::new);
        let mut drive = MecanumDrive::from_store(wheels, SimImu::new(), &store);
        let mut cmd = forward_cmd();
        cmd.slow_trigger = 1.0;
        assert_eq!(drive.drive(&cmd).unwrap().as_array(), [0.25; 4]);
    }

    #[test]
    fn test_heading_reset_restores_forward() {
        let mut drive = sim_drive();
        drive.imu_mut().rotate(std::f64::consts::FRAC_PI_2);
        let yawed = drive.drive(&forward_cmd()).unwrap();
        assert!((yawed.front_right - 1.0).abs() > 0.5, "yaw rotates the intent");

        let mut cmd = forward_cmd();
        cmd.reset_heading = true;
        let powers = drive.drive(&cmd).unwrap();
        for p in powers.as_array() {
            assert!((p - 1.0).abs() < 1e-9);
        }
    }

    struct DeadImu;

    impl HeadingSource for DeadImu {
        fn heading_radians(&self) -> Result<f64> {
            Err(HardwareError::NotResponding {
                name: "imu".to_string(),
            })
        }

        fn reset_heading(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_dead_imu_falls_back_to_robot_relative() {
        let wheels = WHEEL_NAMES.map(SimMotor::new);
        let mut drive = MecanumDrive::new(wheels, DeadImu);
        let powers = drive.drive(&forward_cmd()).unwrap();
        assert_eq!(powers.as_array(), [1.0; 4]);
    }
}
