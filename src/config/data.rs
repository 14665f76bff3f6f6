use std::{path::PathBuf, time::Duration};

use bitflags::bitflags;

use super::{Config, ConfigError, MatchSpecList};

/// Default connectivity check interval in seconds.
const DEFAULT_CONNECTIVITY_INTERVAL: u32 = 300;

bitflags! {
    /// What changed between two configuration snapshots.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ConfigChangeFlags: u32 {
        /// Any configuration value changed.
        const VALUES = 1 << 0;
        /// The set of loaded files changed.
        const CONFIG_FILES = 1 << 1;
        /// Connectivity check settings changed.
        const CONNECTIVITY = 1 << 2;
        /// `no-auto-default` changed.
        const NO_AUTO_DEFAULT = 1 << 3;
        /// `ignore-carrier` changed.
        const IGNORE_CARRIER = 1 << 4;
        /// `unmanaged-devices` changed.
        const UNMANAGED_DEVICES = 1 << 5;
        /// DNS mode changed.
        const DNS_MODE = 1 << 6;
        /// resolv.conf manager changed.
        const RC_MANAGER = 1 << 7;
    }
}

/// Effective connectivity check settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivitySettings {
    /// URI to fetch, if checking is configured.
    pub uri: Option<String>,
    /// Seconds between checks; 0 disables checking.
    pub interval: u32,
    /// Expected response.
    pub response: Option<String>,
}

/// Immutable configuration snapshot.
///
/// Built once per (re)load and replaced wholesale; never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigData {
    config_files: Vec<PathBuf>,
    config: Config,
    connectivity: ConnectivitySettings,
    no_auto_default: MatchSpecList,
    ignore_carrier: MatchSpecList,
    unmanaged_devices: MatchSpecList,
}

impl ConfigData {
    /// Build a snapshot from a parsed configuration and the files it came from.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidMatchSpec` when a device list cannot be parsed.
    pub fn new(config: Config, config_files: Vec<PathBuf>) -> Result<Self, ConfigError> {
        let connectivity = ConnectivitySettings {
            uri: config.connectivity.uri.clone().filter(|uri| !uri.is_empty()),
            interval: match config.connectivity.interval {
                None => DEFAULT_CONNECTIVITY_INTERVAL,
                Some(secs) => u32::try_from(secs).unwrap_or(0),
            },
            response: config.connectivity.response.clone(),
        };

        Ok(Self {
            no_auto_default: MatchSpecList::parse(&config.main.no_auto_default)?,
            ignore_carrier: MatchSpecList::parse(&config.main.ignore_carrier)?,
            unmanaged_devices: MatchSpecList::parse(&config.main.unmanaged_devices)?,
            connectivity,
            config_files,
            config,
        })
    }

    /// Snapshot of the built-in defaults.
    pub fn with_defaults() -> Self {
        Self {
            config_files: Vec::new(),
            config: Config::default(),
            connectivity: ConnectivitySettings {
                uri: None,
                interval: DEFAULT_CONNECTIVITY_INTERVAL,
                response: None,
            },
            no_auto_default: MatchSpecList::default(),
            ignore_carrier: MatchSpecList::default(),
            unmanaged_devices: MatchSpecList::default(),
        }
    }

    /// The parsed configuration this snapshot was built from.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Files merged into this snapshot, in precedence order.
    pub fn config_files(&self) -> &[PathBuf] {
        &self.config_files
    }

    /// Connectivity check settings.
    pub fn connectivity(&self) -> &ConnectivitySettings {
        &self.connectivity
    }

    /// Devices excluded from automatic default wired profiles.
    pub fn no_auto_default(&self) -> &MatchSpecList {
        &self.no_auto_default
    }

    /// Devices whose carrier is ignored.
    pub fn ignore_carrier(&self) -> &MatchSpecList {
        &self.ignore_carrier
    }

    /// Devices left unmanaged.
    pub fn unmanaged_devices(&self) -> &MatchSpecList {
        &self.unmanaged_devices
    }

    /// DNS processing mode.
    pub fn dns_mode(&self) -> Option<&str> {
        self.config.main.dns.as_deref()
    }

    /// resolv.conf management mode.
    pub fn rc_manager(&self) -> Option<&str> {
        self.config.main.rc_manager.as_deref()
    }

    /// Whether the carrier of `iface` should be ignored.
    pub fn is_ignore_carrier(&self, iface: &str, hw_address: Option<&str>) -> bool {
        self.ignore_carrier.matches(iface, hw_address)
    }

    /// Cool-down a failed device waits before it may be used again.
    pub fn failed_cooldown(&self) -> Duration {
        Duration::from_millis(self.config.device.failed_cooldown_ms)
    }

    /// Compute which aspects differ between two snapshots.
    pub fn diff(old: &ConfigData, new: &ConfigData) -> ConfigChangeFlags {
        let mut flags = ConfigChangeFlags::empty();

        if old.config_files != new.config_files {
            flags |= ConfigChangeFlags::CONFIG_FILES;
        }
        if old.config != new.config {
            flags |= ConfigChangeFlags::VALUES;
        }
        if old.connectivity != new.connectivity {
            flags |= ConfigChangeFlags::CONNECTIVITY;
        }
        if old.no_auto_default != new.no_auto_default {
            flags |= ConfigChangeFlags::NO_AUTO_DEFAULT;
        }
        if old.ignore_carrier != new.ignore_carrier {
            flags |= ConfigChangeFlags::IGNORE_CARRIER;
        }
        if old.unmanaged_devices != new.unmanaged_devices {
            flags |= ConfigChangeFlags::UNMANAGED_DEVICES;
        }
        if old.dns_mode() != new.dns_mode() {
            flags |= ConfigChangeFlags::DNS_MODE;
        }
        if old.rc_manager() != new.rc_manager() {
            flags |= ConfigChangeFlags::RC_MANAGER;
        }

        flags
    }
}

impl Default for ConfigData {
    fn default() -> Self {
        Self::with_defaults()
    }
}
