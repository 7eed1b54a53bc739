// Define message types for the station loop

use serde::{Deserialize, Serialize};

use crate::drive::WheelPowers;

/// Driver intent for one tick. Each axis is nominally in [-1, 1] but may
/// exceed it before normalisation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DriveIntent {
    pub forward: f64,
    pub strafe: f64,
    pub turn: f64,
}

impl DriveIntent {
    pub fn new(forward: f64, strafe: f64, turn: f64) -> Self {
        Self {
            forward,
            strafe,
            turn,
        }
    }

    /// Scale every axis by the same factor (slow mode)
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            forward: self.forward * factor,
            strafe: self.strafe * factor,
            turn: self.turn * factor,
        }
    }
}

// Command from teleop/scripts -> station
// Buttons are sampled levels; edge detection happens in the station.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorCommand {
    pub drive: DriveIntent,
    pub slow_trigger: f64,
    pub toggle_field_relative: bool,
    pub reset_heading: bool,
    pub arm_power: f64,
    /// Restart peak loop-time measurement
    pub reset_loop_peak: bool,
}

// Actuation output from station -> hardware layer
// Has default values because we don't always have an actuation to send
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StationActuation {
    pub wheels: WheelPowers,
    pub arm_power: f64,
    pub field_relative: bool,
}

/// Health status published by the station each tick
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StationHealth {
    Ok,
    CmdStale,
    ArmStalled,
    LowVoltage,
    LinkLost,
}
