//! Configuration manager for TOML file operations
//!
//! This module provides the `ConfigManager` which loads and saves the
//! application settings and the persisted UI state.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{ConfigError, ConfigResult};
use crate::models::ObjectPath;

use super::settings::{AppSettings, UiState};

/// File names for configuration files
const CONFIG_FILE: &str = "config.toml";
const STATE_FILE: &str = "state.toml";

/// Directory name under the user configuration directory
const APP_DIR: &str = "keepsecret";

/// Configuration manager for `KeepSecret`
///
/// Configuration is stored in `~/.config/keepsecret/` by default.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    /// Base directory for configuration files
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Creates a new `ConfigManager` with the default configuration directory
    ///
    /// # Errors
    ///
    /// Returns an error if the user configuration directory cannot be
    /// determined.
    pub fn new() -> ConfigResult<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::NotFound(PathBuf::from("~/.config")))?
            .join(APP_DIR);
        Ok(Self { config_dir })
    }

    /// Creates a new `ConfigManager` with a custom configuration directory
    #[must_use]
    pub const fn with_config_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// Returns the configuration directory path
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Ensures the configuration directory exists
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn ensure_config_dir(&self) -> ConfigResult<()> {
        if !self.config_dir.exists() {
            fs::create_dir_all(&self.config_dir).map_err(|e| {
                ConfigError::Write(format!(
                    "Failed to create config directory {}: {}",
                    self.config_dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    // ========== Settings ==========

    /// Loads application settings, or defaults if the file doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_settings(&self) -> ConfigResult<AppSettings> {
        Self::load_toml_file(&self.config_dir.join(CONFIG_FILE))
    }

    /// Saves application settings
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_settings(&self, settings: &AppSettings) -> ConfigResult<()> {
        self.ensure_config_dir()?;
        Self::save_toml_file(&self.config_dir.join(CONFIG_FILE), settings)
    }

    // ========== UI state ==========

    /// Loads the persisted UI state, or defaults if the file doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_state(&self) -> ConfigResult<UiState> {
        Self::load_toml_file(&self.config_dir.join(STATE_FILE))
    }

    /// Saves the UI state
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_state(&self, state: &UiState) -> ConfigResult<()> {
        self.ensure_config_dir()?;
        Self::save_toml_file(&self.config_dir.join(STATE_FILE), state)
    }

    /// Collection selected in the previous run, empty if none
    ///
    /// Unreadable state is logged and treated as empty.
    #[must_use]
    pub fn current_collection_path(&self) -> ObjectPath {
        match self.load_state() {
            Ok(state) => state.main_window.current_collection_path,
            Err(e) => {
                warn!(error = %e, "Failed to load UI state");
                ObjectPath::empty()
            }
        }
    }

    /// Remembers the selected collection
    ///
    /// Failures are logged and otherwise ignored.
    pub fn store_current_collection_path(&self, path: &ObjectPath) {
        let mut state = self.load_state().unwrap_or_default();
        if &state.main_window.current_collection_path == path {
            return;
        }
        state.main_window.current_collection_path = path.clone();
        if let Err(e) = self.save_state(&state) {
            warn!(error = %e, "Failed to persist current collection");
        }
    }

    // ========== Generic TOML Operations ==========

    /// Loads and parses a TOML file, returning the default if it is missing
    fn load_toml_file<T>(path: &Path) -> ConfigResult<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        if !path.exists() {
            return Ok(T::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("Failed to read {}: {}", path.display(), e)))?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Saves data to a TOML file
    fn save_toml_file<T>(path: &Path, data: &T) -> ConfigResult<()>
    where
        T: serde::Serialize,
    {
        let content = toml::to_string_pretty(data)
            .map_err(|e| ConfigError::Serialize(format!("Failed to serialize: {e}")))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::Write(format!("Failed to write {}: {}", path.display(), e)))
    }
}
