// Battery sag measurement
//
// Compares the resting voltage with the lowest voltage seen while the robot is
// under load. A large drop points to a weak battery or a high-resistance
// connection rather than a low state of charge.

use serde::{Deserialize, Serialize};

use crate::config::{VOLTAGE_DROP_CRITICAL, VOLTAGE_DROP_WARNING};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagVerdict {
    Ok,
    Warning,
    Critical,
}

#[derive(Debug, Clone)]
pub struct SagTest {
    resting_voltage: f64,
    min_under_load: f64,
    drop: f64,
    loaded: bool,
}

impl SagTest {
    pub fn new(resting_voltage: f64) -> Self {
        Self {
            resting_voltage,
            min_under_load: resting_voltage,
            drop: 0.0,
            loaded: false,
        }
    }

    /// Feed one voltage sample; `under_load` says whether motors are driven
    pub fn update(&mut self, voltage: f64, under_load: bool) {
        if under_load {
            if !self.loaded {
                // New load episode starts from the live reading
                self.loaded = true;
                self.min_under_load = voltage;
            }
            self.min_under_load = self.min_under_load.min(voltage);
            self.drop = self.drop.max(self.resting_voltage - self.min_under_load);
        } else {
            self.loaded = false;
            self.resting_voltage = voltage;
        }
    }

    /// Largest resting-to-loaded drop seen so far, in volts
    pub fn drop(&self) -> f64 {
        self.drop
    }

    pub fn resting_voltage(&self) -> f64 {
        self.resting_voltage
    }

    pub fn verdict(&self) -> SagVerdict {
        if self.drop > VOLTAGE_DROP_CRITICAL {
            SagVerdict::Critical
        } else if self.drop > VOLTAGE_DROP_WARNING {
            SagVerdict::Warning
        } else {
            SagVerdict::Ok
        }
    }
}
