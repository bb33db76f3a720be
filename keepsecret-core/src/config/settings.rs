//! Application settings and persisted UI state
//!
//! `AppSettings` is stored in config.toml and `UiState` in state.toml.

use serde::{Deserialize, Serialize};

use crate::models::ObjectPath;
use crate::store::{DEFAULT_ALIAS, SECRET_SERVICE_BUS_NAME};

/// Application-wide settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Secret Service settings
    #[serde(default)]
    pub service: ServiceSettings,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Secret Service settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Bus name of the Secret Service provider
    #[serde(default = "default_bus_name")]
    pub bus_name: String,
    /// Alias resolved as the default collection
    #[serde(default = "default_alias")]
    pub default_alias: String,
}

fn default_bus_name() -> String {
    SECRET_SERVICE_BUS_NAME.to_string()
}

fn default_alias() -> String {
    DEFAULT_ALIAS.to_string()
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            bus_name: default_bus_name(),
            default_alias: default_alias(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `tracing` filter directive used when `RUST_LOG` is not set
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

/// UI state that survives restarts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiState {
    /// Main window state
    #[serde(default)]
    pub main_window: MainWindowState,
}

/// Main window state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainWindowState {
    /// Collection selected when the application last ran
    #[serde(default, skip_serializing_if = "ObjectPath::is_empty")]
    pub current_collection_path: ObjectPath,
}
