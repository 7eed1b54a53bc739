// Arm actuator with over-current protection
//
// The arm's stall guard is created here, once, with a threshold read from the
// config store. While the guard reports a stall the motor is held at zero
// power whatever the operator asks for.

use tracing::{debug, info, warn};

use crate::config::{
    ARM_D, ARM_F, ARM_I, ARM_MANUAL_POWER_MULTIPLIER, ARM_P, ARM_POWER_LIMIT,
    ARM_STALL_SUSTAIN_MS, ARM_STALL_THRESHOLD_AMPS, KEY_ARM_D, KEY_ARM_F, KEY_ARM_I,
    KEY_ARM_MANUAL_POWER_MULTIPLIER, KEY_ARM_P, KEY_ARM_POWER_LIMIT,
    KEY_ARM_STALL_THRESHOLD_AMPS,
};
use crate::hardware::{CurrentSensing, PidfGains, PositionControlled, PowerControlled, Result};
use crate::stall::{StallGuard, StallGuardError};
use crate::store::ConfigStore;

pub struct ArmController<M> {
    motor: M,
    guard: StallGuard,
    gains: PidfGains,
    manual_multiplier: f64,
    power_limit: f64,
    applied_power: f64,
}

impl<M> ArmController<M>
where
    M: PowerControlled + PositionControlled + CurrentSensing,
{
    pub fn new(motor: M, store: &dyn ConfigStore) -> std::result::Result<Self, StallGuardError> {
        let threshold = store.get_f64(KEY_ARM_STALL_THRESHOLD_AMPS, ARM_STALL_THRESHOLD_AMPS);
        let guard = StallGuard::new(threshold, ARM_STALL_SUSTAIN_MS)?;
        let gains = PidfGains {
            p: store.get_f64(KEY_ARM_P, ARM_P),
            i: store.get_f64(KEY_ARM_I, ARM_I),
            d: store.get_f64(KEY_ARM_D, ARM_D),
            f: store.get_f64(KEY_ARM_F, ARM_F),
        };
        info!(
            "Arm ready: stall at {:.1}A for {}ms, P={:.4} I={:.4} D={:.4} F={:.4}",
            threshold, ARM_STALL_SUSTAIN_MS, gains.p, gains.i, gains.d, gains.f
        );
        Ok(Self {
            motor,
            guard,
            gains,
            manual_multiplier: store
                .get_f64(KEY_ARM_MANUAL_POWER_MULTIPLIER, ARM_MANUAL_POWER_MULTIPLIER),
            power_limit: store.get_f64(KEY_ARM_POWER_LIMIT, ARM_POWER_LIMIT),
            applied_power: 0.0,
        })
    }

    /// Open-loop drive from a stick value in [-1, 1]. Returns the power that
    /// actually reached the motor.
    pub fn set_manual_power(&mut self, stick: f64) -> Result<f64> {
        let power = if self.guard.is_stalled() {
            0.0
        } else {
            stick.clamp(-1.0, 1.0) * self.manual_multiplier
        };
        self.motor.set_power(power)?;
        self.applied_power = power;
        Ok(power)
    }

    /// Hand the move to the motor's native position controller
    pub fn run_to_position(&mut self, target: i32) -> Result<()> {
        debug!("Arm run to {}", target);
        self.applied_power = 0.0;
        self.motor
            .set_target_position(target, self.gains, self.power_limit)
    }

    /// Sample the motor current and cut power if the guard trips
    pub fn update(&mut self, now_millis: u64) -> Result<bool> {
        let was_stalled = self.guard.is_stalled();
        self.guard.update(self.motor.current_amps()?, now_millis);

        if self.guard.is_stalled() {
            if !was_stalled {
                warn!("Arm stalled, cutting power");
            }
            self.motor.set_power(0.0)?;
            self.applied_power = 0.0;
        }
        Ok(self.guard.is_stalled())
    }

    pub fn is_stalled(&self) -> bool {
        self.guard.is_stalled()
    }

    pub fn applied_power(&self) -> f64 {
        self.applied_power
    }

    pub fn gains(&self) -> PidfGains {
        self.gains
    }

    pub fn guard(&self) -> &StallGuard {
        &self.guard
    }

    pub fn motor(&self) -> &M {
        &self.motor
    }

    pub fn motor_mut(&mut self) -> &mut M {
        &mut self.motor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::SimMotor;
    use crate::store::MemoryConfigStore;

    fn arm() -> ArmController<SimMotor> {
        ArmController::new(SimMotor::new("arm"), &MemoryConfigStore::new()).unwrap()
    }

    #[test]
    fn test_manual_power_is_scaled() {
        let mut arm = arm();
        let applied = arm.set_manual_power(1.0).unwrap();
        assert!((applied - ARM_MANUAL_POWER_MULTIPLIER).abs() < 1e-12);
        assert!((arm.motor().power() - ARM_MANUAL_POWER_MULTIPLIER).abs() < 1e-12);
    }

    #[test]
    fn test_store_overrides() {
        let mut store = MemoryConfigStore::new();
        store.set_f64(KEY_ARM_STALL_THRESHOLD_AMPS, 6.5).unwrap();
        store.set_f64(KEY_ARM_P, 4.0).unwrap();
        let arm = ArmController::new(SimMotor::new("arm"), &store).unwrap();
        assert_eq!(arm.guard().threshold_amps(), 6.5);
        assert_eq!(arm.gains().p, 4.0);
        assert_eq!(arm.gains().d, ARM_D);
    }

    #[test]
    fn test_bad_stored_threshold_is_rejected() {
        let mut store = MemoryConfigStore::new();
        store.set_f64(KEY_ARM_STALL_THRESHOLD_AMPS, -1.0).unwrap();
        assert!(matches!(
            ArmController::new(SimMotor::new("arm"), &store),
            Err(StallGuardError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_jam_cuts_power_until_cleared() {
        let mut arm = arm();
        arm.motor_mut().set_jammed(true);

        let mut now = 0;
        let mut tripped_at = None;
        while tripped_at.is_none() && now <= 1_000 {
            arm.set_manual_power(1.0).unwrap();
            arm.motor_mut().advance(0.02);
            if arm.update(now).unwrap() {
                tripped_at = Some(now);
            }
            now += 20;
        }
        // 10A stall current against a 9A threshold, 500ms sustain
        assert_eq!(tripped_at, Some(520));
        assert_eq!(arm.set_manual_power(1.0).unwrap(), 0.0);

        // With power cut the jammed motor stops drawing current
        arm.motor_mut().advance(0.02);
        assert!(!arm.update(now).unwrap());
        assert!(arm.set_manual_power(1.0).unwrap() > 0.0);
    }

    #[test]
    fn test_run_to_position_uses_gains() {
        let mut arm = arm();
        arm.run_to_position(400).unwrap();
        assert!(arm.motor().is_busy().unwrap());
        for _ in 0..500 {
            arm.motor_mut().advance(0.02);
        }
        assert!((arm.motor().position().unwrap() - 400).abs() <= 10);
    }
}
