// Key-value configuration store for runtime overrides
//
// Values are read once at actuator init with a compiled default as fallback.
// Reads never fail: a missing file, malformed JSON, a missing key or a
// non-numeric value all resolve to the default.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Number, Value};
use tracing::{debug, info, warn};

/// Error types for persisting configuration
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error writing {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Cannot store non-finite value {value} for '{key}'")]
    NonFinite { key: String, value: f64 },
}

pub type Result<T> = std::result::Result<T, StoreError>;

pub trait ConfigStore {
    /// Stored value for `key`, or `default` if absent, unreadable or not finite
    fn get_f64(&self, key: &str, default: f64) -> f64;

    /// Persist every entry or none of them
    fn set_many(&mut self, entries: &[(&str, f64)]) -> Result<()>;

    /// Persist `value` under `key`
    fn set_f64(&mut self, key: &str, value: f64) -> Result<()> {
        self.set_many(&[(key, value)])
    }
}

/// JSON object file mapping keys to numbers
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
    values: Map<String, Value>,
}

impl FileConfigStore {
    /// Load the store from `path`. Problems are logged and leave the store
    /// empty so every getter falls back to its default.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => {
                    info!("Loaded {} config overrides from {}", map.len(), path.display());
                    map
                }
                Ok(other) => {
                    warn!(
                        "Config file {} is not a JSON object (found {}), using defaults",
                        path.display(),
                        other
                    );
                    Map::new()
                }
                Err(e) => {
                    warn!("Malformed config file {}: {}, using defaults", path.display(), e);
                    Map::new()
                }
            },
            Err(e) => {
                debug!("No config file at {} ({}), using defaults", path.display(), e);
                Map::new()
            }
        };
        Self { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn get_f64(&self, key: &str, default: f64) -> f64 {
        let Some(raw) = self.values.get(key) else {
            return default;
        };
        let parsed = match raw {
            Value::Number(n) => n.as_f64(),
            // Hand-edited files sometimes quote numbers
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(value) if value.is_finite() => value,
            _ => {
                debug!("Config '{}' = {} is not a finite number, using default", key, raw);
                default
            }
        }
    }

    fn set_many(&mut self, entries: &[(&str, f64)]) -> Result<()> {
        // Only commit in memory once the whole batch is on disk
        let mut updated = self.values.clone();
        for &(key, value) in entries {
            let number = Number::from_f64(value).ok_or_else(|| StoreError::NonFinite {
                key: key.to_string(),
                value,
            })?;
            updated.insert(key.to_string(), Value::Number(number));
        }
        let text = serde_json::to_string_pretty(&updated)?;
        fs::write(&self.path, text).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        self.values = updated;
        debug!("Saved {} config values to {}", entries.len(), self.path.display());
        Ok(())
    }
}

/// Volatile store, for tests and for running without a settings file
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    values: BTreeMap<String, f64>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.values.get(key).copied().unwrap_or(default)
    }

    fn set_many(&mut self, entries: &[(&str, f64)]) -> Result<()> {
        if let Some(&(key, value)) = entries.iter().find(|(_, v)| !v.is_finite()) {
            return Err(StoreError::NonFinite {
                key: key.to_string(),
                value,
            });
        }
        for &(key, value) in entries {
            self.values.insert(key.to_string(), value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn temp_path(tag: &str) -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "mecanum_station_{}_{}_{}.json",
            tag,
            std::process::id(),
            n
        ))
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let store = FileConfigStore::load(temp_path("missing"));
        assert_eq!(store.get_f64("ARM_P", 10.0), 10.0);
    }

    #[test]
    fn test_malformed_file_uses_defaults() {
        let path = temp_path("malformed");
        fs::write(&path, "ARM_P = 3.0 {").unwrap();
        let store = FileConfigStore::load(&path);
        assert_eq!(store.get_f64("ARM_P", 10.0), 10.0);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_malformed_values_use_defaults() {
        let path = temp_path("values");
        fs::write(
            &path,
            r#"{"ARM_P": 3.5, "ARM_I": "0.25", "ARM_D": "abc", "ARM_F": [1],
                "ARM_STALL_THRESHOLD_AMPS": "NaN", "ARM_POWER_LIMIT": "inf",
                "DRIVE_SLOW_MODE_MULTIPLIER": "-infinity"}"#,
        )
        .unwrap();
        let store = FileConfigStore::load(&path);
        assert_eq!(store.get_f64("ARM_STALL_THRESHOLD_AMPS", 9.0), 9.0);
        assert_eq!(store.get_f64("ARM_POWER_LIMIT", 0.7), 0.7);
        assert_eq!(store.get_f64("DRIVE_SLOW_MODE_MULTIPLIER", 0.5), 0.5);
        assert_eq!(store.get_f64("ARM_P", 10.0), 3.5);
        assert_eq!(store.get_f64("ARM_I", 0.0), 0.25);
        assert_eq!(store.get_f64("ARM_D", 1.0), 1.0);
        assert_eq!(store.get_f64("ARM_F", 0.5), 0.5);
        assert_eq!(store.get_f64("MISSING", 7.0), 7.0);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_saved_values_survive_reload() {
        let path = temp_path("save");
        let mut store = FileConfigStore::load(&path);
        store.set_f64("ARM_P", 12.5).unwrap();
        store.set_f64("ARM_D", 0.75).unwrap();

        let reloaded = FileConfigStore::load(&path);
        assert_eq!(reloaded.get_f64("ARM_P", 0.0), 12.5);
        assert_eq!(reloaded.get_f64("ARM_D", 0.0), 0.75);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_failed_write_keeps_previous_value() {
        // A directory path cannot be written as a file
        let dir = std::env::temp_dir();
        let mut store = FileConfigStore::load(&dir);
        let err = store.set_f64("ARM_P", 1.0).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert_eq!(store.get_f64("ARM_P", 10.0), 10.0);
    }

    #[test]
    fn test_batch_with_bad_value_writes_nothing() {
        let path = temp_path("batch");
        let mut store = FileConfigStore::load(&path);
        store.set_f64("ARM_P", 10.0).unwrap();

        let err = store
            .set_many(&[("ARM_P", 15.0), ("ARM_I", f64::INFINITY), ("ARM_D", 2.0)])
            .unwrap_err();
        assert!(matches!(err, StoreError::NonFinite { .. }));
        assert_eq!(store.get_f64("ARM_P", 0.0), 10.0);

        let reloaded = FileConfigStore::load(&path);
        assert_eq!(reloaded.get_f64("ARM_P", 0.0), 10.0);
        assert_eq!(reloaded.get_f64("ARM_D", 1.0), 1.0);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut store = MemoryConfigStore::new();
        assert!(store.set_f64("ARM_P", f64::NAN).is_err());
        assert!(store.set_many(&[("ARM_I", 1.0), ("ARM_D", f64::NAN)]).is_err());
        assert_eq!(store.get_f64("ARM_P", 10.0), 10.0);
        assert_eq!(store.get_f64("ARM_I", 0.0), 0.0);
    }
}
