use std::{env, path::PathBuf};

/// Well-known locations of the daemon's files.
///
/// Every location can be redirected through an environment variable so the
/// daemon and its tests can run without touching system directories.
pub struct ConfigPaths;

impl ConfigPaths {
    /// Environment variable overriding the main configuration file.
    pub const CONFIG_ENV: &str = "NETCORED_CONFIG";

    /// Environment variable overriding the runtime directory.
    pub const RUN_DIR_ENV: &str = "NETCORED_RUN_DIR";

    /// Returns the path to the main configuration file
    ///
    /// `NETCORED_CONFIG` wins, else `/etc/netcored/netcored.toml`.
    pub fn main_config() -> PathBuf {
        env::var_os(Self::CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/etc/netcored/netcored.toml"))
    }

    /// Directory of drop-in files merged over the main configuration file.
    ///
    /// Lives next to the main file as `conf.d/`.
    pub fn drop_in_dir(main_config: &std::path::Path) -> PathBuf {
        main_config
            .parent()
            .map(|dir| dir.join("conf.d"))
            .unwrap_or_else(|| PathBuf::from("conf.d"))
    }

    /// Runtime state directory.
    pub fn run_dir() -> PathBuf {
        env::var_os(Self::RUN_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/run/netcored"))
    }

    /// Default location of the private peer-to-peer bus socket.
    pub fn private_socket() -> PathBuf {
        Self::run_dir().join("private")
    }

    /// systemd seat directory; its presence enables the logind session backend.
    pub fn systemd_seats_dir() -> PathBuf {
        PathBuf::from("/run/systemd/seats/")
    }

    /// ConsoleKit session database.
    pub fn consolekit_database() -> PathBuf {
        PathBuf::from("/var/run/ConsoleKit/database")
    }
}
