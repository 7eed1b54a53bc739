// Simulated devices for running the station without a robot attached
//
// Everything here is advanced explicitly with `advance(dt)` from the caller's
// loop, so tests and the demo runtime stay deterministic.

use tracing::debug;

use super::{
    CurrentSensing, HardwareError, HeadingSource, PidfGains, PositionControlled, PowerControlled,
    PowerHub, Result,
};

/// Free-running speed of the simulated gearmotor at full power
const MAX_TICKS_PER_SEC: f64 = 2800.0;

/// Time constant of the open-loop speed response
const SPEED_TAU_SECS: f64 = 0.05;

/// Map controller gains onto simulated plant dynamics.
/// With the default arm gains (P=10, D=1) this gives an underdamped response
/// with roughly 20% overshoot.
const SIM_P_SCALE: f64 = 2.0;
const SIM_I_SCALE: f64 = 0.5;
const SIM_D_SCALE: f64 = 4.0;

/// Native controller's "close enough" band and speed for reporting not-busy
const BUSY_TOLERANCE_TICKS: f64 = 10.0;
const BUSY_VELOCITY: f64 = 20.0;

const FREE_SPIN_AMPS: f64 = 1.5;
const STALL_AMPS: f64 = 10.0;
const AMPS_PER_TICK_ERROR: f64 = 0.002;

/// Integration step used inside `advance`
const SUBSTEP_SECS: f64 = 0.001;

#[derive(Debug, Clone, Copy)]
enum MotorMode {
    Power(f64),
    Position {
        target: i32,
        gains: PidfGains,
        max_power: f64,
        integral: f64,
    },
}

/// A DC gearmotor with an encoder and current sensor
#[derive(Debug, Clone)]
pub struct SimMotor {
    name: String,
    mode: MotorMode,
    position: f64,
    velocity: f64, // ticks/s
    current: f64,
    jammed: bool,
}

impl SimMotor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: MotorMode::Power(0.0),
            position: 0.0,
            velocity: 0.0,
            current: 0.0,
            jammed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mechanically block the output shaft (or release it)
    pub fn set_jammed(&mut self, jammed: bool) {
        if jammed != self.jammed {
            debug!("{} jammed={}", self.name, jammed);
        }
        self.jammed = jammed;
    }

    /// Last commanded open-loop power, or zero in position mode
    pub fn power(&self) -> f64 {
        match self.mode {
            MotorMode::Power(p) => p,
            MotorMode::Position { .. } => 0.0,
        }
    }

    /// Advance the plant by `dt` seconds
    pub fn advance(&mut self, dt: f64) {
        let mut remaining = dt.max(0.0);
        while remaining > 0.0 {
            let step = remaining.min(SUBSTEP_SECS);
            self.substep(step);
            remaining -= step;
        }
    }

    fn substep(&mut self, dt: f64) {
        match &mut self.mode {
            MotorMode::Power(power) => {
                let power = *power;
                if self.jammed {
                    self.velocity = 0.0;
                    self.current = if power.abs() > 0.05 {
                        STALL_AMPS
                    } else {
                        0.0
                    };
                } else {
                    let target_velocity = power * MAX_TICKS_PER_SEC;
                    self.velocity += (target_velocity - self.velocity) * (dt / SPEED_TAU_SECS);
                    self.current = FREE_SPIN_AMPS * power.abs();
                }
            }
            MotorMode::Position {
                target,
                gains,
                max_power,
                integral,
            } => {
                let error = *target as f64 - self.position;
                *integral += error * dt;
                let accel = gains.p * SIM_P_SCALE * error + gains.i * SIM_I_SCALE * *integral
                    - gains.d * SIM_D_SCALE * self.velocity;
                let limit = max_power.abs() * MAX_TICKS_PER_SEC;
                self.velocity = (self.velocity + accel * dt).clamp(-limit, limit);

                if self.jammed {
                    self.velocity = 0.0;
                    self.current = if error.abs() > BUSY_TOLERANCE_TICKS {
                        STALL_AMPS
                    } else {
                        FREE_SPIN_AMPS
                    };
                } else {
                    self.current =
                        (FREE_SPIN_AMPS + AMPS_PER_TICK_ERROR * error.abs()).min(STALL_AMPS);
                }
            }
        }
        self.position += self.velocity * dt;
    }
}

impl PowerControlled for SimMotor {
    fn set_power(&mut self, power: f64) -> Result<()> {
        if !power.is_finite() {
            return Err(HardwareError::Rejected {
                name: self.name.clone(),
                reason: format!("non-finite power {}", power),
            });
        }
        self.mode = MotorMode::Power(power.clamp(-1.0, 1.0));
        Ok(())
    }
}

impl PositionControlled for SimMotor {
    fn set_target_position(&mut self, ticks: i32, gains: PidfGains, max_power: f64) -> Result<()> {
        debug!(
            "{} run to {} (P={:.4} I={:.4} D={:.4} F={:.4})",
            self.name, ticks, gains.p, gains.i, gains.d, gains.f
        );
        self.mode = MotorMode::Position {
            target: ticks,
            gains,
            max_power: max_power.clamp(0.0, 1.0),
            integral: 0.0,
        };
        Ok(())
    }

    fn is_busy(&self) -> Result<bool> {
        Ok(match self.mode {
            MotorMode::Power(_) => false,
            MotorMode::Position { target, .. } => {
                let error = target as f64 - self.position;
                !(error.abs() <= BUSY_TOLERANCE_TICKS && self.velocity.abs() < BUSY_VELOCITY)
            }
        })
    }

    fn position(&self) -> Result<i32> {
        Ok(self.position.round() as i32)
    }

    fn reset_encoder(&mut self) -> Result<()> {
        self.mode = MotorMode::Power(0.0);
        self.position = 0.0;
        self.velocity = 0.0;
        Ok(())
    }
}

impl CurrentSensing for SimMotor {
    fn current_amps(&self) -> Result<f64> {
        Ok(self.current)
    }
}

/// Control hub: battery with internal resistance plus a link flag
#[derive(Debug, Clone)]
pub struct SimHub {
    resting_voltage: f64,
    internal_resistance: f64, // ohms
    load_amps: f64,
    responding: bool,
}

impl SimHub {
    pub fn new(resting_voltage: f64) -> Self {
        Self {
            resting_voltage,
            internal_resistance: 0.05,
            load_amps: 0.0,
            responding: true,
        }
    }

    pub fn set_load(&mut self, amps: f64) {
        self.load_amps = amps.max(0.0);
    }

    pub fn set_resting_voltage(&mut self, volts: f64) {
        self.resting_voltage = volts;
    }

    pub fn set_responding(&mut self, responding: bool) {
        self.responding = responding;
    }
}

impl PowerHub for SimHub {
    fn input_voltage(&self) -> Result<f64> {
        Ok(self.resting_voltage - self.internal_resistance * self.load_amps)
    }

    fn total_current_amps(&self) -> Result<f64> {
        Ok(self.load_amps)
    }

    fn is_responding(&self) -> bool {
        self.responding
    }
}

/// IMU yaw integrated from commanded rotation
#[derive(Debug, Clone, Default)]
pub struct SimImu {
    yaw: f64,
    zero: f64,
}

impl SimImu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rotate(&mut self, radians: f64) {
        self.yaw += radians;
    }
}

impl HeadingSource for SimImu {
    fn heading_radians(&self) -> Result<f64> {
        Ok(self.yaw - self.zero)
    }

    fn reset_heading(&mut self) -> Result<()> {
        self.zero = self.yaw;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arm_gains() -> PidfGains {
        PidfGains::new(10.0, 0.0, 1.0, 0.5)
    }

    #[test]
    fn test_position_mode_settles_on_target() {
        let mut motor = SimMotor::new("arm");
        motor.set_target_position(400, arm_gains(), 0.7).unwrap();
        assert!(motor.is_busy().unwrap());

        for _ in 0..500 {
            motor.advance(0.02);
        }

        assert!(!motor.is_busy().unwrap(), "should have settled within 10 s");
        assert!((motor.position().unwrap() - 400).abs() <= 10);
    }

    #[test]
    fn test_default_gains_overshoot() {
        let mut motor = SimMotor::new("arm");
        motor.set_target_position(1200, arm_gains(), 0.7).unwrap();
        let mut peak = 0;
        for _ in 0..300 {
            motor.advance(0.02);
            peak = peak.max(motor.position().unwrap());
        }
        assert!(peak > 1200, "underdamped plant should pass the target");
    }

    #[test]
    fn test_jammed_motor_draws_stall_current() {
        let mut motor = SimMotor::new("arm");
        motor.set_jammed(true);
        motor.set_power(0.4).unwrap();
        motor.advance(0.02);
        assert_eq!(motor.current_amps().unwrap(), STALL_AMPS);
        assert_eq!(motor.position().unwrap(), 0);

        motor.set_jammed(false);
        motor.advance(0.02);
        assert!(motor.current_amps().unwrap() < FREE_SPIN_AMPS);
    }

    #[test]
    fn test_non_finite_power_rejected() {
        let mut motor = SimMotor::new("arm");
        assert!(motor.set_power(f64::NAN).is_err());
    }

    #[test]
    fn test_hub_voltage_sags_under_load() {
        let mut hub = SimHub::new(13.0);
        hub.set_load(20.0);
        assert!((hub.input_voltage().unwrap() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_imu_reset_rezeroes_heading() {
        let mut imu = SimImu::new();
        imu.rotate(1.0);
        assert_eq!(imu.heading_radians().unwrap(), 1.0);
        imu.reset_heading().unwrap();
        assert_eq!(imu.heading_radians().unwrap(), 0.0);
    }
}
