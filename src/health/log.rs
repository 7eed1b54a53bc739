// Bounded, time-stamped event log
//
// Stored oldest-first so eviction is a pop from the front; displayed
// newest-first.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One log line with the match-elapsed time it was created at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp_seconds: f64,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ {:.1}s ] {}", self.timestamp_seconds, self.message)
    }
}

#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl EventLog {
    /// `capacity` must be non-zero; `HealthMonitor::new` checks this
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn push(&mut self, timestamp_seconds: f64, message: impl Into<String>) {
        self.entries.push_back(LogEntry {
            timestamp_seconds,
            message: message.into(),
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Display order
    pub fn newest_first(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().rev()
    }

    /// Storage order, used for the saved summary
    pub fn oldest_first(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest() {
        let mut log = EventLog::with_capacity(3);
        for i in 0..5 {
            log.push(i as f64, format!("event {}", i));
        }
        assert_eq!(log.len(), 3);
        let oldest: Vec<&str> = log.oldest_first().map(|e| e.message.as_str()).collect();
        assert_eq!(oldest, vec!["event 2", "event 3", "event 4"]);
        let newest: Vec<&str> = log.newest_first().map(|e| e.message.as_str()).collect();
        assert_eq!(newest, vec!["event 4", "event 3", "event 2"]);
    }

    #[test]
    fn test_entry_format() {
        let entry = LogEntry {
            timestamp_seconds: 12.34,
            message: "Voltage Brownout: 11.80V".to_string(),
        };
        assert_eq!(entry.to_string(), "[ 12.3s ] Voltage Brownout: 11.80V");
    }
}
