//! Session configuration: detection thresholds/timings plus loop and asset settings.
//! Loaded from JSON; every key is optional and falls back to the built-in defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::sink::AssetCatalog;

/// Tunables for the detection state machine and display timers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Smoothed probability at or above which a class counts as observed.
    pub confidence_threshold: f32,
    /// How long a class must stay confident before it is confirmed.
    pub hold_time_ms: u64,
    /// Minimum spacing between two confirmations of the same class.
    pub cooldown_ms: u64,
    /// Number of recent probabilities averaged per class.
    pub buffer_size: usize,
    /// How long a confirmed class stays on display before returning to neutral.
    pub display_hold_duration_ms: u64,
    /// Delay before the "Completed" image replaces the class image.
    pub completed_delay_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.75,
            hold_time_ms: 2000,
            cooldown_ms: 3000,
            buffer_size: 5,
            display_hold_duration_ms: 5000,
            completed_delay_ms: 500,
        }
    }
}

impl DetectionConfig {
    pub fn hold_time(&self) -> Duration {
        Duration::from_millis(self.hold_time_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn display_hold_duration(&self) -> Duration {
        Duration::from_millis(self.display_hold_duration_ms)
    }

    pub fn completed_delay(&self) -> Duration {
        Duration::from_millis(self.completed_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::Invalid("buffer_size must be > 0".into()));
        }
        Ok(())
    }
}

/// Everything a session needs beyond its collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub detection: DetectionConfig,
    /// Target spacing between frame ticks.
    pub frame_interval_ms: u64,
    /// Keypoints below this score are not forwarded to the overlay.
    pub min_part_confidence: f32,
    pub assets: AssetCatalog,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            frame_interval_ms: 33,
            min_part_confidence: 0.5,
            assets: AssetCatalog::default(),
        }
    }
}

impl SessionConfig {
    /// Load and validate a JSON config file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detection.validate()?;
        if self.frame_interval_ms == 0 {
            return Err(ConfigError::Invalid("frame_interval_ms must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config IO error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_reference_constants() {
        let c = DetectionConfig::default();
        assert_eq!(c.confidence_threshold, 0.75);
        assert_eq!(c.hold_time(), Duration::from_millis(2000));
        assert_eq!(c.cooldown(), Duration::from_millis(3000));
        assert_eq!(c.buffer_size, 5);
        assert_eq!(c.display_hold_duration(), Duration::from_millis(5000));
        assert_eq!(c.completed_delay(), Duration::from_millis(500));
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"detection": {{"hold_time_ms": 1500}}, "frame_interval_ms": 50}}"#).unwrap();

        let config = SessionConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.detection.hold_time_ms, 1500);
        assert_eq!(config.detection.cooldown_ms, 3000);
        assert_eq!(config.frame_interval_ms, 50);
        assert_eq!(config.min_part_confidence, 0.5);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"detection": {{"confidence_threshold": 1.5}}}}"#).unwrap();

        let err = SessionConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_buffer_and_zero_interval() {
        let mut c = SessionConfig::default();
        c.detection.buffer_size = 0;
        assert!(c.validate().is_err());

        let mut c = SessionConfig::default();
        c.frame_interval_ms = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let err = SessionConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = SessionConfig::load_from_file(Path::new("/nonexistent/posecue.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
