//! Unit tests for config module
//!
//! Schema defaults, snapshot derivation and diffing. No filesystem
//! dependencies - all in-memory.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]

use crate::config::{Config, ConfigChangeFlags, ConfigData, LogLevel, SessionTracking};

fn data(toml_str: &str) -> ConfigData {
    let config: Config = toml::from_str(toml_str).unwrap();
    ConfigData::new(config, Vec::new()).unwrap()
}

#[test]
fn config_empty_toml() {
    let config: Config = toml::from_str("").unwrap();

    assert_eq!(config, Config::default());
    assert!(config.main.auth_polkit);
    assert_eq!(config.main.session_tracking, SessionTracking::Auto);
    assert_eq!(config.device.failed_cooldown_ms, 1000);
    assert_eq!(config.bus.reconnect_interval_ms, 3000);
    assert!(config.connections.is_empty());
}

#[test]
fn config_deserialize_toml() {
    let config: Config = toml::from_str(
        r#"
        [main]
        no-auto-default = ["interface-name:eth1"]
        ignore-carrier = ["*"]
        dns = "none"
        auth-polkit = false
        session-tracking = "fake"

        [logging]
        level = "debug"

        [[connection]]
        id = "Wired"
        type = "ethernet"
        interface-name = "eth0"
        "#,
    )
    .unwrap();

    assert_eq!(config.main.no_auto_default, vec!["interface-name:eth1"]);
    assert!(!config.main.auth_polkit);
    assert_eq!(config.main.session_tracking, SessionTracking::Fake);
    assert_eq!(config.logging.level, LogLevel::Debug);
    assert_eq!(config.connections.len(), 1);
    assert_eq!(config.connections[0].interface_name.as_deref(), Some("eth0"));
}

#[test]
fn config_rejects_unknown_log_level() {
    let result = toml::from_str::<Config>(
        r#"
        [logging]
        level = "loud"
        "#,
    );
    assert!(result.is_err());
}

#[test]
fn connectivity_interval_defaults_to_300() {
    let snapshot = data("[connectivity]\nuri = \"http://example.com/check\"\n");

    assert_eq!(snapshot.connectivity().interval, 300);
    assert_eq!(
        snapshot.connectivity().uri.as_deref(),
        Some("http://example.com/check")
    );
}

#[test]
fn connectivity_invalid_interval_disables_checking() {
    assert_eq!(data("[connectivity]\ninterval = -5\n").connectivity().interval, 0);
    assert_eq!(
        data("[connectivity]\ninterval = 99999999999\n")
            .connectivity()
            .interval,
        0
    );
    assert_eq!(data("[connectivity]\ninterval = 60\n").connectivity().interval, 60);
}

#[test]
fn identical_snapshots_have_empty_diff() {
    let a = data("[main]\ndns = \"default\"\n");
    let b = data("[main]\ndns = \"default\"\n");

    assert!(ConfigData::diff(&a, &b).is_empty());
}

#[test]
fn diff_reports_each_changed_aspect() {
    let old = data("");
    let new = data(
        r#"
        [main]
        dns = "none"
        ignore-carrier = ["eth0"]
        "#,
    );

    let flags = ConfigData::diff(&old, &new);

    assert!(flags.contains(ConfigChangeFlags::VALUES));
    assert!(flags.contains(ConfigChangeFlags::DNS_MODE));
    assert!(flags.contains(ConfigChangeFlags::IGNORE_CARRIER));
    assert!(!flags.contains(ConfigChangeFlags::RC_MANAGER));
    assert!(!flags.contains(ConfigChangeFlags::NO_AUTO_DEFAULT));
    assert!(!flags.contains(ConfigChangeFlags::CONNECTIVITY));
}

#[test]
fn diff_reports_connectivity_and_files() {
    let old = data("");
    let config: Config = toml::from_str("[connectivity]\ninterval = 10\n").unwrap();
    let new = ConfigData::new(config, vec!["/etc/netcored/netcored.toml".into()]).unwrap();

    let flags = ConfigData::diff(&old, &new);

    assert!(flags.contains(ConfigChangeFlags::CONNECTIVITY));
    assert!(flags.contains(ConfigChangeFlags::CONFIG_FILES));
}

#[test]
fn invalid_match_spec_fails_snapshot() {
    let config: Config = toml::from_str("[main]\nunmanaged-devices = [\"mac:\"]\n").unwrap();
    assert!(ConfigData::new(config, Vec::new()).is_err());
}

#[test]
fn default_snapshot_equals_empty_config_snapshot() {
    assert_eq!(ConfigData::with_defaults(), data(""));
}
