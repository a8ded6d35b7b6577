//! Application configuration.
//!
//! Loaded from `config.toml` in the platform data directory; a missing file
//! means defaults.

use crate::training::types::TrainingConfig;
use crate::treadmill::simulated::HeartRateModelSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application version
    pub version: String,
    /// Data directory path
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Heart-rate controller settings
    pub training: TrainingConfig,
    /// Simulated treadmill and heart-rate feed
    pub simulation: SimulationSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: PathBuf::new(),
            training: TrainingConfig::default(),
            simulation: SimulationSettings::default(),
        }
    }
}

/// Settings for the simulated session run by the binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Interval between simulated heart-rate samples in milliseconds
    pub sample_interval_ms: u64,
    /// Belt speed at session start (km/h)
    pub initial_speed_kmh: f64,
    /// Incline at session start (percent)
    pub initial_incline_percent: f64,
    /// Artificial command latency in milliseconds
    pub command_latency_ms: u64,
    /// Heart-rate response model
    pub heart_rate_model: HeartRateModelSettings,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1_000,
            initial_speed_kmh: 6.0,
            initial_incline_percent: 1.0,
            command_latency_ms: 150,
            heart_rate_model: HeartRateModelSettings::default(),
        }
    }
}

/// Get the application data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "treadpace", "TreadPace")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

/// Load application configuration from the default location.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let mut config = load_config_from(&get_config_path())?;
    config.data_dir = get_data_dir();
    Ok(config)
}

/// Load application configuration from `path`, falling back to defaults when
/// the file does not exist.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        tracing::info!("No config at {}, using defaults", path.display());
        return Ok(AppConfig::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    let config: AppConfig =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config
        .training
        .validate()
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;

    Ok(config)
}

/// Save application configuration to the default location.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(&get_config_path(), config)
}

/// Save application configuration to `path`.
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::types::TargetZone;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.training, TrainingConfig::default());
        assert_eq!(config.simulation.sample_interval_ms, 1_000);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.training.target_zone = TargetZone::new(125.0, 145.0);
        config.training.speed_control = true;
        save_config_to(&path, &config).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.training, config.training);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[training]\nspeed_control = true\n\n[training.target_zone]\nmin = 130.0\nmax = 150.0\n",
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        assert!(config.training.speed_control);
        assert_eq!(config.training.target_zone, TargetZone::new(130.0, 150.0));
        assert_eq!(config.training.tolerance, 5.0);
        assert_eq!(config.simulation.command_latency_ms, 150);
    }

    #[test]
    fn test_invalid_training_section_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[training.target_zone]\nmin = 160.0\nmax = 120.0\n",
        )
        .unwrap();

        assert!(matches!(
            load_config_from(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_garbage_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "training = [not toml").unwrap();

        assert!(matches!(
            load_config_from(&path),
            Err(ConfigError::ParseError(_))
        ));
    }
}
