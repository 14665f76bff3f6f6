use std::{fmt, path::PathBuf};

use thiserror::Error;

/// Errors raised while loading, validating or distributing daemon configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration validation error
    #[error("configuration validation failed for '{component}': {details}")]
    ConfigValidation {
        /// Component that failed validation
        component: String,
        /// Validation error details
        details: String,
    },

    /// A device match spec could not be parsed
    #[error("invalid match spec '{spec}': {reason}")]
    InvalidMatchSpec {
        /// The offending spec
        spec: String,
        /// Reason why the spec is invalid
        reason: String,
    },

    /// I/O operation error
    #[error("I/O error on '{path}': {details}")]
    IoError {
        /// Path where I/O error occurred
        path: PathBuf,
        /// I/O error details
        details: String,
    },

    /// TOML parsing error with location context
    #[error("failed to parse TOML at '{location}': {details}")]
    TomlParseError {
        /// Location of TOML being parsed (file path or "string")
        location: String,
        /// Parse error details
        details: String,
    },

    /// Error occurred while acquiring locks for thread-safe access
    #[error("failed to acquire {lock_type} lock: {details}")]
    LockError {
        /// Type of lock that failed (read, write)
        lock_type: String,
        /// Lock error details
        details: String,
    },

    /// A required service is unavailable
    #[error("{service} service unavailable: {details}")]
    ServiceUnavailable {
        /// Name of the service that is unavailable
        service: String,
        /// Details about why the service is unavailable
        details: String,
    },
}

impl ConfigError {
    /// Creates a TOML parse error with file context.
    pub fn toml_parse(error: impl fmt::Display, path: Option<&std::path::Path>) -> Self {
        Self::TomlParseError {
            location: path.map_or_else(|| "string".to_string(), |p| p.display().to_string()),
            details: error.to_string(),
        }
    }

    /// Creates an I/O error with file context.
    pub fn io(error: impl fmt::Display, path: &std::path::Path) -> Self {
        Self::IoError {
            path: path.to_path_buf(),
            details: error.to_string(),
        }
    }
}
