//! Configuration management for `KeepSecret`
//!
//! This module provides the `ConfigManager` for loading and saving the
//! application settings and the persisted UI state in TOML format.

mod manager;
pub mod settings;

pub use manager::ConfigManager;
pub use settings::{AppSettings, LoggingSettings, MainWindowState, ServiceSettings, UiState};
