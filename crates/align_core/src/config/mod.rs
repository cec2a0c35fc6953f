//! Runtime configuration: settings structs and file management.

mod settings;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use settings::{
    AudioSettings, BoundarySettings, DtwSettings, GranularitySettings, LevelSettings,
    LimitSettings, MfccSettings, PathSettings, RuntimeConfig, VadSettings,
};

/// Errors that can occur during config operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Manages the engine configuration file.
///
/// Handles loading, validation, and atomic saves (write to a temp file
/// in the same directory, then rename).
pub struct ConfigManager {
    /// Path to the config file.
    config_path: PathBuf,
    /// Current configuration loaded in memory.
    config: RuntimeConfig,
}

impl ConfigManager {
    /// Create a new config manager with the given config file path.
    ///
    /// Does not load the config - call `load()` or `load_or_create()`
    /// after.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            config: RuntimeConfig::default(),
        }
    }

    /// Get the config file path.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Get a reference to the current configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Get a mutable reference to the current configuration.
    ///
    /// Changes made here are only in memory until `save()` is called.
    pub fn config_mut(&mut self) -> &mut RuntimeConfig {
        &mut self.config
    }

    /// Load config from file.
    ///
    /// Returns an error if the file does not exist or fails validation.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }
        let content = fs::read_to_string(&self.config_path)?;
        let config: RuntimeConfig = toml::from_str(&content)?;
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Load config from file, creating it with defaults if it does not
    /// exist.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.config_path.exists() {
            self.load()
        } else {
            if let Some(parent) = self.config_path.parent() {
                fs::create_dir_all(parent)?;
            }
            self.config = RuntimeConfig::default();
            self.save()
        }
    }

    /// Save the current configuration atomically.
    pub fn save(&self) -> ConfigResult<()> {
        let content = toml::to_string_pretty(&self.config)?;
        let temp_path = self.config_path.with_extension("toml.tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.config_path)?;
        tracing::debug!("Saved config to {}", self.config_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("align.toml");
        let mut manager = ConfigManager::new(&path);
        manager.load_or_create().unwrap();
        assert!(path.exists());
        assert_eq!(manager.config().audio.sample_rate, 16000);
    }

    #[test]
    fn save_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("align.toml");
        let mut manager = ConfigManager::new(&path);
        manager.load_or_create().unwrap();
        manager.config_mut().audio.sample_rate = 22050;
        manager.save().unwrap();

        let mut reloaded = ConfigManager::new(&path);
        reloaded.load().unwrap();
        assert_eq!(reloaded.config().audio.sample_rate, 22050);
    }

    #[test]
    fn load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = ConfigManager::new(dir.path().join("absent.toml"));
        assert!(matches!(manager.load(), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("align.toml");
        fs::write(&path, "[vad]\nlog_energy_threshold = 2.0\n").unwrap();
        let mut manager = ConfigManager::new(&path);
        assert!(matches!(manager.load(), Err(ConfigError::Invalid(_))));
    }
}
