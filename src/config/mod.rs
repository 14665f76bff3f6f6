//! Daemon configuration schema.
//!
//! The TOML file is deserialized into [`Config`]; [`ConfigData`] is the
//! immutable snapshot derived from it that the rest of the daemon consults.

mod data;
mod error;
mod loading;
mod logging;
mod match_spec;
mod paths;

#[cfg(test)]
mod tests;

use std::path::PathBuf;

pub use data::{ConfigChangeFlags, ConfigData, ConnectivitySettings};
pub use error::ConfigError;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use match_spec::{MatchSpec, MatchSpecList};
pub use paths::ConfigPaths;
use serde::{Deserialize, Serialize};

use crate::services::settings::ConnectionProfile;

/// Main configuration structure.
///
/// Every section has defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Device policy and backend selection.
    #[serde(default)]
    pub main: MainConfig,

    /// Connectivity checking.
    #[serde(default)]
    pub connectivity: ConnectivityConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Device state machine tuning.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Bus transport.
    #[serde(default)]
    pub bus: BusConfig,

    /// Connection profiles seeded into the settings store.
    #[serde(default, rename = "connection")]
    pub connections: Vec<ConnectionProfile>,
}

/// Session tracking backend selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionTracking {
    /// logind when systemd seats exist, else ConsoleKit.
    #[default]
    Auto,
    /// systemd-logind over D-Bus.
    Logind,
    /// The ConsoleKit session database.
    Consolekit,
    /// Every uid has an active local session.
    Fake,
    /// No uid ever has a session.
    None,
}

/// `[main]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct MainConfig {
    /// Devices that never get an automatic default wired profile.
    #[serde(default)]
    pub no_auto_default: Vec<String>,
    /// Devices whose carrier state is ignored.
    #[serde(default)]
    pub ignore_carrier: Vec<String>,
    /// Devices left unmanaged.
    #[serde(default)]
    pub unmanaged_devices: Vec<String>,
    /// DNS processing mode.
    #[serde(default)]
    pub dns: Option<String>,
    /// resolv.conf management mode.
    #[serde(default)]
    pub rc_manager: Option<String>,
    /// Use polkit for authorization; the local policy applies otherwise.
    #[serde(default = "default_true")]
    pub auth_polkit: bool,
    /// Session backend.
    #[serde(default)]
    pub session_tracking: SessionTracking,
}

impl Default for MainConfig {
    fn default() -> Self {
        Self {
            no_auto_default: Vec::new(),
            ignore_carrier: Vec::new(),
            unmanaged_devices: Vec::new(),
            dns: None,
            rc_manager: None,
            auth_polkit: true,
            session_tracking: SessionTracking::default(),
        }
    }
}

/// `[connectivity]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub struct ConnectivityConfig {
    /// URI fetched by the connectivity check.
    #[serde(default)]
    pub uri: Option<String>,
    /// Seconds between checks. Missing means 300, negative or oversized disables checking.
    #[serde(default)]
    pub interval: Option<i64>,
    /// Expected body prefix of the check response.
    #[serde(default)]
    pub response: Option<String>,
}

/// `[device]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceConfig {
    /// Time a failed device stays in `failed` before returning to `disconnected`.
    #[serde(default = "default_failed_cooldown_ms")]
    pub failed_cooldown_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            failed_cooldown_ms: default_failed_cooldown_ms(),
        }
    }
}

/// `[bus]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct BusConfig {
    /// Listening path of the private peer-to-peer socket.
    #[serde(default = "default_private_socket")]
    pub private_socket: Option<PathBuf>,
    /// Delay between reconnection attempts after losing the system bus.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            private_socket: default_private_socket(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_failed_cooldown_ms() -> u64 {
    1000
}

fn default_reconnect_interval_ms() -> u64 {
    3000
}

fn default_private_socket() -> Option<PathBuf> {
    Some(ConfigPaths::private_socket())
}
