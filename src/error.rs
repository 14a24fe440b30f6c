//! Error types for PlugHost
//!
//! This module defines all error types used throughout the plugin host.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use thiserror::Error;

/// The primary error type for PlugHost operations.
#[derive(Error, Debug)]
pub enum HostError {
    /// Configuration-related errors (unreadable config, bad search paths, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Plugin manifest errors (missing keys, malformed lines, invalid names)
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Native module could not be opened or a required symbol is missing
    #[error("Load error: {0}")]
    Load(String),

    /// Version negotiation or activation was rejected by the plugin
    #[error("Negotiation error: {0}")]
    Negotiation(String),

    /// A lifecycle hook was invoked out of order
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// Security violations (path components in plugin filenames, etc.)
    #[error("Security violation: {0}")]
    SecurityViolation(String),

    /// The external helper for a plugin is not running
    #[error("Helper unavailable: {0}")]
    HelperUnavailable(String),

    /// IPC framing or channel errors
    #[error("IPC error: {0}")]
    Ipc(String),

    /// A plugin name is already taken by an active plugin
    #[error("Plugin conflict: {0}")]
    Conflict(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for PlugHost operations.
pub type Result<T> = std::result::Result<T, HostError>;
