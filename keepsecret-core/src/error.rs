//! Error types for `KeepSecret`
//!
//! This module defines the error types used by the core library: failures
//! reported by the secret store collaborator, configuration file errors, and a
//! top-level error that wraps both.
//!
//! Controllers never propagate `StoreError` to their callers. Each failure is
//! translated into an [`ErrorKind`](crate::tracker::ErrorKind) and a message
//! and written to the shared operation tracker instead.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for `KeepSecret` operations
#[derive(Debug, Error)]
pub enum KeepSecretError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Secret store errors
    #[error("Secret store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a secret store implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The Secret Service provider is not running or cannot be activated
    #[error("Secret Service provider unavailable: {0}")]
    ServiceUnavailable(String),

    /// The connection handle was issued before the service owner changed
    #[error("Connection handle is no longer valid")]
    InvalidHandle,

    /// No collection or item exists at the given object path
    #[error("No such object: {0}")]
    NoSuchObject(String),

    /// The object must be unlocked before this operation
    #[error("Object is locked: {0}")]
    Locked(String),

    /// The user dismissed an unlock or confirmation prompt
    #[error("Prompt dismissed by the user")]
    PromptDismissed,

    /// The provider does not support the requested operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Any other transport-level failure
    #[error("{0}")]
    Transport(String),
}

/// Errors related to configuration and state file operations
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to parse a configuration file
    #[error("Failed to parse {}: {reason}", path.display())]
    Parse {
        /// The file that failed to parse
        path: PathBuf,
        /// The parser message
        reason: String,
    },

    /// Configuration directory could not be determined
    #[error("Configuration directory not found: {0}")]
    NotFound(PathBuf),

    /// Failed to read a configuration file
    #[error("Failed to read configuration: {0}")]
    Read(String),

    /// Failed to write a configuration file
    #[error("Failed to write configuration: {0}")]
    Write(String),

    /// Failed to serialize configuration
    #[error("Failed to serialize configuration: {0}")]
    Serialize(String),
}

/// Result type alias for `KeepSecret` operations
pub type Result<T> = std::result::Result<T, KeepSecretError>;

/// Result type alias for secret store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
