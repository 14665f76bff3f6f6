use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

/// Logging level for the daemon.
///
/// Controls the verbosity of log output, from critical errors only
/// to detailed trace information.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only failures that break networking.
    Error,

    /// Warnings and errors.
    Warn,

    /// Device and connection state changes (default level).
    #[default]
    Info,

    /// Every transition and backend call.
    Debug,

    /// Very verbose.
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

/// Output format of the console log layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset.
    #[serde(default)]
    pub level: LogLevel,
    /// Console output format; `NETCORED_LOG_FORMAT` overrides it.
    #[serde(default)]
    pub format: LogFormat,
    /// Write daily-rotated log files into this directory as well.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}
