// Mecanum inverse kinematics for a 4-wheel base
// Converts driver intent (forward, strafe, turn) to normalized wheel powers,
// optionally rotating the translation into the field frame first.

use serde::{Deserialize, Serialize};

use crate::messages::DriveIntent;

/// Normalized power for each of the four mecanum wheels, all in [-1, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WheelPowers {
    pub front_left: f64,
    pub front_right: f64,
    pub rear_left: f64,
    pub rear_right: f64,
}

impl WheelPowers {
    pub fn new(front_left: f64, front_right: f64, rear_left: f64, rear_right: f64) -> Self {
        Self {
            front_left,
            front_right,
            rear_left,
            rear_right,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns powers as array [front_left, front_right, rear_left, rear_right]
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.front_left,
            self.front_right,
            self.rear_left,
            self.rear_right,
        ]
    }
}

/// Rotate the translation part of `intent` by `-heading` so that "forward"
/// means away from the driver regardless of robot yaw.
fn to_field_frame(intent: DriveIntent, heading: f64) -> DriveIntent {
    let (sin, cos) = (-heading).sin_cos();
    DriveIntent {
        forward: intent.strafe * sin + intent.forward * cos,
        strafe: intent.strafe * cos - intent.forward * sin,
        turn: intent.turn,
    }
}

/// Standard mecanum mix, divided by `max(|f|+|s|+|t|, 1)`
fn mix(intent: DriveIntent) -> WheelPowers {
    let DriveIntent {
        forward: f,
        strafe: s,
        turn: t,
    } = intent;

    // Only ever scale down: inputs already in range pass through untouched
    let denom = (f.abs() + s.abs() + t.abs()).max(1.0);

    WheelPowers {
        front_left: (f + s + t) / denom,
        front_right: (f - s - t) / denom,
        rear_left: (f - s + t) / denom,
        rear_right: (f + s - t) / denom,
    }
}

/// Convert driver intent to wheel powers
///
/// # Arguments
/// * `intent` - forward / strafe / turn, nominally in [-1, 1]
/// * `heading` - robot yaw in radians for field-relative driving, or `None`
///   for robot-relative driving
///
/// # Returns
/// Wheel powers with every value in [-1, 1], preserving the ratios of the raw mix
pub fn compute_wheel_powers(intent: DriveIntent, heading: Option<f64>) -> WheelPowers {
    match heading {
        Some(h) => mix(to_field_frame(intent, h)),
        None => mix(intent),
    }
}
