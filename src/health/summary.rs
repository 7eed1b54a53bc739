// Match summary and the sinks it can be exported to

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::HealthError;
use super::log::LogEntry;

/// End-of-match snapshot of the health record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub min_voltage: Option<f64>,
    pub max_current_amps: f64,
    /// Oldest first
    pub entries: Vec<LogEntry>,
}

impl MatchSummary {
    /// Plain-text report, log lines oldest to newest
    pub fn render(&self) -> String {
        let mut out = String::from("--- Match Log ---\n");
        match self.min_voltage {
            Some(v) => out.push_str(&format!("Summary - Min Voltage: {:.2}V\n", v)),
            None => out.push_str("Summary - Min Voltage: n/a\n"),
        }
        out.push_str(&format!(
            "Summary - Max Current: {:.2}A\n\n",
            self.max_current_amps
        ));
        for entry in &self.entries {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out
    }
}

/// Destination for the end-of-match summary
pub trait SummarySink {
    /// Write the summary, returning a short description of where it went
    fn write_summary(&mut self, summary: &MatchSummary) -> Result<String, HealthError>;
}

/// Same-millisecond collisions get a numeric suffix instead of overwriting
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Writes `MatchLog_<date>_<time>-<millis>.txt` into a directory, never
/// replacing an existing log
#[derive(Debug, Clone)]
pub struct FileSummarySink {
    dir: PathBuf,
}

impl FileSummarySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SummarySink for FileSummarySink {
    fn write_summary(&mut self, summary: &MatchSummary) -> Result<String, HealthError> {
        let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S-%3f");
        let text = summary.render();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let filename = match attempt {
                0 => format!("MatchLog_{}.txt", stamp),
                n => format!("MatchLog_{}_{}.txt", stamp, n),
            };
            let path = self.dir.join(&filename);
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(HealthError::Io { path, source }),
            };
            debug!("Writing match summary to {}", path.display());
            file.write_all(text.as_bytes())
                .map_err(|source| HealthError::Io { path, source })?;
            return Ok(filename);
        }

        Err(HealthError::Io {
            path: self.dir.clone(),
            source: std::io::Error::new(
                ErrorKind::AlreadyExists,
                "no free match log name for this timestamp",
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn summary() -> MatchSummary {
        MatchSummary {
            min_voltage: Some(11.456),
            max_current_amps: 14.0,
            entries: vec![
                LogEntry {
                    timestamp_seconds: 0.0,
                    message: "first".to_string(),
                },
                LogEntry {
                    timestamp_seconds: 3.31,
                    message: "second".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_render_layout() {
        let text = summary().render();
        assert_eq!(
            text,
            "--- Match Log ---\n\
             Summary - Min Voltage: 11.46V\n\
             Summary - Max Current: 14.00A\n\n\
             [ 0.0s ] first\n\
             [ 3.3s ] second\n"
        );
    }

    #[test]
    fn test_file_sink_writes_into_dir() {
        let dir = std::env::temp_dir().join(format!("mecanum_station_summary_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let mut sink = FileSummarySink::new(&dir);
        let name = sink.write_summary(&summary()).unwrap();
        assert!(name.starts_with("MatchLog_") && name.ends_with(".txt"));
        let written = fs::read_to_string(dir.join(&name)).unwrap();
        assert!(written.contains("[ 3.3s ] second"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_back_to_back_saves_keep_both_logs() {
        let dir = std::env::temp_dir().join(format!(
            "mecanum_station_summary_twice_{}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        let mut sink = FileSummarySink::new(&dir);

        let first = sink.write_summary(&summary()).unwrap();
        let second = sink.write_summary(&summary()).unwrap();
        assert_ne!(first, second);
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 2);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_file_sink_missing_dir_fails() {
        let mut sink = FileSummarySink::new("/nonexistent/mecanum_station/dir");
        assert!(matches!(
            sink.write_summary(&summary()),
            Err(HealthError::Io { .. })
        ));
    }
}
