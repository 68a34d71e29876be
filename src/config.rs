//! Configuration system for the Area shell core
//!
//! Loads configuration from TOML file at `~/.config/area/shellcore.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::modal::ActionMode;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub deferred: DeferredConfig,
    pub modal: ModalConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            // Auto-generate default config file
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load and validate configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .context("Failed to parse config file")?;
        config.modal.default_action_mode()?;

        info!("Configuration loaded from {:?}", path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("area");

        Ok(config_dir.join("shellcore.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string)
            .context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }
}

/// Deferred work configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeferredConfig {
    /// Seconds before hidden pending work is flushed anyway
    pub idle_timeout_secs: u64,
}

impl Default for DeferredConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 20,
        }
    }
}

impl DeferredConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Modal stack configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModalConfig {
    /// Action mode installed by pushes that don't name one, e.g. "NONE" or
    /// "NORMAL | OVERVIEW"
    pub default_action_mode: String,
}

impl Default for ModalConfig {
    fn default() -> Self {
        Self {
            default_action_mode: "NONE".to_string(),
        }
    }
}

impl ModalConfig {
    /// Parsed `default_action_mode`
    pub fn default_action_mode(&self) -> Result<ActionMode> {
        ActionMode::parse(&self.default_action_mode)
            .context("Invalid modal.default_action_mode")
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing filter used when RUST_LOG is not set
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "area_shellcore=debug,info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[deferred]\nidle_timeout_secs = 5\n").unwrap();
        assert_eq!(config.deferred.idle_timeout(), Duration::from_secs(5));
        assert_eq!(config.modal.default_action_mode().unwrap(), ActionMode::NONE);
        assert_eq!(config.logging.filter, "area_shellcore=debug,info");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shellcore.toml");
        fs::write(
            &path,
            "[modal]\ndefault_action_mode = \"NORMAL | OVERVIEW\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(
            config.modal.default_action_mode().unwrap(),
            ActionMode::NORMAL | ActionMode::OVERVIEW
        );
        assert_eq!(config.deferred.idle_timeout_secs, 20);
    }

    #[test]
    fn test_invalid_action_mode_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shellcore.toml");
        fs::write(&path, "[modal]\ndefault_action_mode = \"SOMETIMES\"\n").unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_default_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("shellcore.toml");
        Config::save_default(&path).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.deferred.idle_timeout_secs, 20);
        assert_eq!(config.modal.default_action_mode, "NONE");
    }
}
