//! Runtime configuration.
//!
//! Loaded from an optional JSON file; any field left out takes its default.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::dedup::{DedupTracker, DEFAULT_CAPACITY, DEFAULT_RETENTION_FACTOR};
use crate::error::ConfigError;
use crate::plate_detection::DEFAULT_MIN_AREA;
use crate::plate_number::{PlateValidator, DEFAULT_COUNTRY_CODE};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    /// Haar cascade trained for plates.
    pub cascade_path: PathBuf,
    pub scale_factor: f64,
    pub min_neighbors: i32,
    /// Regions must be strictly larger than this many pixels.
    pub min_area: i64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            cascade_path: PathBuf::from("model/haarcascade_russian_plate_number.xml"),
            scale_factor: 1.1,
            min_neighbors: 4,
            min_area: DEFAULT_MIN_AREA,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Tesseract data directory. `None` uses the system default.
    pub data_path: Option<PathBuf>,
    pub language: String,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            language: "eng".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    pub database_path: PathBuf,
    pub camera_index: i32,
    pub detector: DetectorConfig,
    pub recognizer: RecognizerConfig,
    /// Two-letter prefix of the country plate format.
    pub country_code: String,
    /// Repeat sightings of a plate within this window are not processed again,
    /// neither by the in-memory tracker nor by the arrival log.
    pub debounce_secs: u64,
    pub dedup_capacity: usize,
    /// Tracker entries older than `debounce_secs * dedup_retention_factor` are swept.
    pub dedup_retention_factor: u32,
    pub tick_ms: u64,
    /// Iterations slower than this are reported.
    pub frame_deadline_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("parking.db"),
            camera_index: 0,
            detector: DetectorConfig::default(),
            recognizer: RecognizerConfig::default(),
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            debounce_secs: 30,
            dedup_capacity: DEFAULT_CAPACITY,
            dedup_retention_factor: DEFAULT_RETENTION_FACTOR,
            tick_ms: 100,
            frame_deadline_ms: 2000,
        }
    }
}

impl GateConfig {
    /// Reads `path` when given, otherwise returns the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let contents = fs::read_to_string(path)?;
                let config: GateConfig = serde_json::from_str(&contents)?;
                info!("Config loaded from {}", path.display());
                config
            }
            None => {
                info!("No config file given, using defaults");
                GateConfig::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        PlateValidator::new(&self.country_code)?;
        if self.debounce_secs == 0 {
            return Err(ConfigError::Invalid("debounce_secs must be positive".into()));
        }
        if self.debounce_secs > 24 * 60 * 60 {
            return Err(ConfigError::Invalid("debounce_secs must be at most a day".into()));
        }
        if self.dedup_capacity == 0 {
            return Err(ConfigError::Invalid("dedup_capacity must be positive".into()));
        }
        if self.dedup_retention_factor == 0 {
            return Err(ConfigError::Invalid(
                "dedup_retention_factor must be positive".into(),
            ));
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::Invalid("tick_ms must be positive".into()));
        }
        if self.detector.scale_factor <= 1.0 {
            return Err(ConfigError::Invalid(
                "detector.scale_factor must be greater than 1.0".into(),
            ));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn frame_deadline(&self) -> Duration {
        Duration::from_millis(self.frame_deadline_ms)
    }

    pub fn plate_validator(&self) -> Result<PlateValidator, ConfigError> {
        PlateValidator::new(&self.country_code)
    }

    pub fn dedup_tracker(&self) -> DedupTracker {
        DedupTracker::with_bounds(
            self.debounce(),
            self.dedup_capacity,
            self.dedup_retention_factor,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GateConfig::default();
        config.validate().unwrap();
        assert_eq!(config.debounce(), Duration::from_secs(30));
        assert_eq!(config.tick(), Duration::from_millis(100));
        assert_eq!(config.detector.min_area, 500);
        assert_eq!(config.dedup_tracker().interval(), config.debounce());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"debounce_secs": 45, "detector": {{"min_neighbors": 6}}, "country_code": "ru"}}"#
        )
        .unwrap();

        let config = GateConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.debounce_secs, 45);
        assert_eq!(config.detector.min_neighbors, 6);
        assert_eq!(config.detector.scale_factor, 1.1);
        assert_eq!(config.database_path, PathBuf::from("parking.db"));
        assert!(config.plate_validator().unwrap().parse("ru123abc45").is_some());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = GateConfig {
            country_code: "KAZ".into(),
            ..GateConfig::default()
        };
        assert!(config.validate().is_err());

        let config = GateConfig {
            debounce_secs: 0,
            ..GateConfig::default()
        };
        assert!(config.validate().is_err());

        let config = GateConfig {
            tick_ms: 0,
            ..GateConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = GateConfig::load(Some(&dir.path().join("absent.json")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            GateConfig::load(Some(file.path())),
            Err(ConfigError::Parse(_))
        ));
    }
}
