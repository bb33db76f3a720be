//! Logging initialisation

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

/// Builds the filter from `RUST_LOG`, falling back to the configured directive
///
/// An unparsable configured directive falls back to `info`.
#[must_use]
pub fn env_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global fmt subscriber
///
/// Returns false if a subscriber was already installed, in which case the
/// existing one stays in place.
pub fn init(settings: &LoggingSettings) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(settings))
        .try_init()
        .is_ok()
}
