// System health monitoring for the driver station
//
// Tracks the session's worst-case power figures and turns threshold crossings
// into one log event per transition, never one per tick.

pub mod battery;
mod log;
mod summary;

use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::{EVENT_LOG_CAPACITY, VOLTAGE_WARNING_THRESHOLD};

pub use battery::{SagTest, SagVerdict};
pub use log::{EventLog, LogEntry};
pub use summary::{FileSummarySink, MatchSummary, SummarySink};

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("Event log capacity must be at least 1")]
    ZeroCapacity,

    #[error("Voltage threshold must be a positive number of volts, got {0}")]
    InvalidThreshold(f64),

    #[error("IO error writing {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Health record for one match
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    voltage_threshold: f64,
    min_voltage: Option<f64>,
    max_current_amps: f64,
    link_ok: bool,
    voltage_low: bool,
    first_update: bool,
    last_seconds: f64,
    log: EventLog,
}

impl HealthMonitor {
    pub fn new(voltage_threshold: f64, log_capacity: usize) -> Result<Self, HealthError> {
        if log_capacity == 0 {
            return Err(HealthError::ZeroCapacity);
        }
        if !voltage_threshold.is_finite() || voltage_threshold <= 0.0 {
            return Err(HealthError::InvalidThreshold(voltage_threshold));
        }
        Ok(Self {
            voltage_threshold,
            min_voltage: None,
            max_current_amps: 0.0,
            link_ok: true,
            voltage_low: false,
            first_update: true,
            last_seconds: 0.0,
            log: EventLog::with_capacity(log_capacity),
        })
    }

    /// Monitor with the compiled 12V threshold and 10-entry log
    pub fn with_defaults() -> Self {
        Self {
            voltage_threshold: VOLTAGE_WARNING_THRESHOLD,
            min_voltage: None,
            max_current_amps: 0.0,
            link_ok: true,
            voltage_low: false,
            first_update: true,
            last_seconds: 0.0,
            log: EventLog::with_capacity(EVENT_LOG_CAPACITY),
        }
    }

    /// Feed one tick of hub telemetry
    pub fn update(
        &mut self,
        total_current_amps: f64,
        input_voltage: f64,
        link_is_up: bool,
        now_seconds: f64,
    ) {
        self.last_seconds = now_seconds;

        if self.first_update {
            self.log_event(
                now_seconds,
                format!("Monitor Initialized. Battery at {:.2}V", input_voltage),
            );
            self.first_update = false;
        }

        if total_current_amps > self.max_current_amps {
            self.max_current_amps = total_current_amps;
        }
        if self.min_voltage.is_none_or(|min| input_voltage < min) {
            self.min_voltage = Some(input_voltage);
        }

        if self.link_ok && !link_is_up {
            warn!("Control hub link lost");
            self.log_event(now_seconds, "Hub NOT RESPONDING!");
        } else if !self.link_ok && link_is_up {
            info!("Control hub link restored");
            self.log_event(now_seconds, "Hub link restored");
        }
        self.link_ok = link_is_up;

        if input_voltage < self.voltage_threshold && !self.voltage_low {
            warn!("Voltage brownout: {:.2}V", input_voltage);
            self.log_event(
                now_seconds,
                format!("Voltage Brownout: {:.2}V", input_voltage),
            );
            self.voltage_low = true;
        } else if input_voltage >= self.voltage_threshold && self.voltage_low {
            info!("Voltage recovered: {:.2}V", input_voltage);
            self.log_event(
                now_seconds,
                format!("Voltage Recovered: {:.2}V", input_voltage),
            );
            self.voltage_low = false;
        }
    }

    fn log_event(&mut self, now_seconds: f64, message: impl Into<String>) {
        self.log.push(now_seconds, message);
    }

    pub fn summary(&self) -> MatchSummary {
        MatchSummary {
            min_voltage: self.min_voltage,
            max_current_amps: self.max_current_amps,
            entries: self.log.oldest_first().cloned().collect(),
        }
    }

    /// Export the summary. Best effort: the outcome is recorded in the event
    /// log and returned, never raised.
    pub fn save_summary(&mut self, sink: &mut dyn SummarySink) -> bool {
        let summary = self.summary();
        match sink.write_summary(&summary) {
            Ok(location) => {
                info!("Match log saved to {}", location);
                self.log_event(self.last_seconds, format!("Log SAVED to {}", location));
                true
            }
            Err(e) => {
                warn!("Failed to save match log: {}", e);
                self.log_event(self.last_seconds, "FAILED to save log!");
                false
            }
        }
    }

    pub fn min_voltage(&self) -> Option<f64> {
        self.min_voltage
    }

    pub fn max_current_amps(&self) -> f64 {
        self.max_current_amps
    }

    pub fn is_link_ok(&self) -> bool {
        self.link_ok
    }

    pub fn is_voltage_low(&self) -> bool {
        self.voltage_low
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(monitor: &HealthMonitor) -> Vec<String> {
        monitor
            .event_log()
            .oldest_first()
            .map(|e| e.message.clone())
            .collect()
    }

    fn count_containing(monitor: &HealthMonitor, needle: &str) -> usize {
        messages(monitor)
            .iter()
            .filter(|m| m.contains(needle))
            .count()
    }

    struct FailingSink;

    impl SummarySink for FailingSink {
        fn write_summary(&mut self, _summary: &MatchSummary) -> Result<String, HealthError> {
            Err(HealthError::Io {
                path: PathBuf::from("MatchLog.txt"),
                source: std::io::Error::other("disk full"),
            })
        }
    }

    #[derive(Default)]
    struct CapturingSink {
        saved: Option<MatchSummary>,
    }

    impl SummarySink for CapturingSink {
        fn write_summary(&mut self, summary: &MatchSummary) -> Result<String, HealthError> {
            self.saved = Some(summary.clone());
            Ok("memory".to_string())
        }
    }

    #[test]
    fn test_rejects_invalid_construction() {
        assert!(matches!(
            HealthMonitor::new(12.0, 0),
            Err(HealthError::ZeroCapacity)
        ));
        assert!(matches!(
            HealthMonitor::new(0.0, 10),
            Err(HealthError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_first_update_logs_battery() {
        let mut m = HealthMonitor::with_defaults();
        m.update(1.0, 13.1, true, 0.0);
        assert_eq!(messages(&m), vec!["Monitor Initialized. Battery at 13.10V"]);
        m.update(1.0, 13.1, true, 0.02);
        assert_eq!(m.event_log().len(), 1);
    }

    #[test]
    fn test_running_extremes() {
        let mut m = HealthMonitor::with_defaults();
        m.update(3.0, 13.0, true, 0.0);
        m.update(15.5, 12.4, true, 1.0);
        m.update(2.0, 12.9, true, 2.0);
        assert_eq!(m.max_current_amps(), 15.5);
        assert_eq!(m.min_voltage(), Some(12.4));
    }

    #[test]
    fn test_brownout_edges_log_once_each() {
        let mut m = HealthMonitor::with_defaults();
        let mut t = 0.0;
        for _ in 0..20 {
            m.update(1.0, 13.0, true, t);
            t += 0.02;
        }
        for _ in 0..50 {
            m.update(20.0, 11.2, true, t);
            t += 0.02;
        }
        assert!(m.is_voltage_low());
        for _ in 0..50 {
            m.update(1.0, 12.6, true, t);
            t += 0.02;
        }
        assert!(!m.is_voltage_low());

        assert_eq!(count_containing(&m, "Brownout"), 1);
        assert_eq!(count_containing(&m, "Recovered"), 1);
    }

    #[test]
    fn test_threshold_voltage_counts_as_ok() {
        let mut m = HealthMonitor::with_defaults();
        m.update(1.0, 11.9, true, 0.0);
        m.update(1.0, 12.0, true, 0.1);
        assert!(!m.is_voltage_low());
        assert_eq!(count_containing(&m, "Recovered: 12.00V"), 1);
    }

    #[test]
    fn test_link_loss_logged_on_falling_edge_only() {
        let mut m = HealthMonitor::with_defaults();
        m.update(1.0, 13.0, true, 0.0);
        for i in 0..30 {
            m.update(1.0, 13.0, false, 0.1 + i as f64 * 0.02);
        }
        assert!(!m.is_link_ok());
        assert_eq!(count_containing(&m, "NOT RESPONDING"), 1);

        m.update(1.0, 13.0, true, 2.0);
        assert!(m.is_link_ok());
        assert_eq!(count_containing(&m, "restored"), 1);
    }

    #[test]
    fn test_log_keeps_capacity_and_timestamps() {
        let mut m = HealthMonitor::new(12.0, 3).unwrap();
        // Alternate across the threshold to generate one event per tick
        for i in 0..8 {
            let v = if i % 2 == 0 { 11.0 } else { 13.0 };
            m.update(1.0, v, true, i as f64);
        }
        assert_eq!(m.event_log().len(), 3);
        let stamps: Vec<f64> = m
            .event_log()
            .newest_first()
            .map(|e| e.timestamp_seconds)
            .collect();
        assert_eq!(stamps, vec![7.0, 6.0, 5.0]);
    }

    #[test]
    fn test_save_summary_success() {
        let mut m = HealthMonitor::with_defaults();
        m.update(4.0, 12.8, true, 0.0);
        m.update(6.0, 11.5, true, 1.5);

        let mut sink = CapturingSink::default();
        assert!(m.save_summary(&mut sink));

        let saved = sink.saved.unwrap();
        assert_eq!(saved.min_voltage, Some(11.5));
        assert_eq!(saved.max_current_amps, 6.0);
        assert_eq!(saved.entries.len(), 2);
        assert!(saved.entries[0].message.starts_with("Monitor Initialized"));
        assert!(saved.entries[1].message.starts_with("Voltage Brownout"));
        assert_eq!(count_containing(&m, "Log SAVED to memory"), 1);
    }

    #[test]
    fn test_save_summary_failure_is_logged_not_raised() {
        let mut m = HealthMonitor::with_defaults();
        m.update(1.0, 13.0, true, 4.0);
        assert!(!m.save_summary(&mut FailingSink));
        let newest = m.event_log().newest_first().next().unwrap();
        assert_eq!(newest.message, "FAILED to save log!");
        assert_eq!(newest.timestamp_seconds, 4.0);
    }
}
