//! Integration tests for loading and reloading configuration files.

#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::{fs, path::PathBuf, time::Duration};

use netcored::{
    config::{ConfigChangeFlags, ConfigError},
    config_store::ConfigStore,
};
use tempfile::TempDir;

fn setup_test_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let main = temp_dir.path().join("netcored.toml");
    (temp_dir, main)
}

fn create_drop_in(temp_dir: &TempDir, filename: &str, content: &str) {
    let dir = temp_dir.path().join("conf.d");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(filename), content).unwrap();
}

mod loading {
    use super::*;

    #[test]
    fn missing_main_file_yields_defaults() {
        let (_temp, main) = setup_test_dir();

        let store = ConfigStore::load(&main).unwrap();
        let config = store.get_current();

        assert!(config.config_files().is_empty());
        assert_eq!(config.failed_cooldown(), Duration::from_millis(1000));
        assert!(!config.unmanaged_devices().matches("eth0", None));
    }

    #[test]
    fn loads_main_file() {
        let (_temp, main) = setup_test_dir();
        fs::write(
            &main,
            r#"
[main]
unmanaged-devices = ["interface-name:docker*", "mac:00:11:22:33:44:55"]
ignore-carrier = ["eth1"]

[device]
failed-cooldown-ms = 250
"#,
        )
        .unwrap();

        let config = ConfigStore::load(&main).unwrap().get_current();

        assert_eq!(config.config_files(), [main.clone()]);
        assert!(config.unmanaged_devices().matches("docker0", None));
        assert!(
            config
                .unmanaged_devices()
                .matches("eth9", Some("00:11:22:33:44:55"))
        );
        assert!(!config.unmanaged_devices().matches("eth0", None));
        assert!(config.is_ignore_carrier("eth1", None));
        assert_eq!(config.failed_cooldown(), Duration::from_millis(250));
    }

    #[test]
    fn drop_ins_override_in_lexical_order() {
        let (temp, main) = setup_test_dir();
        fs::write(&main, "[main]\nrc-manager = \"symlink\"\ndns = \"default\"\n").unwrap();
        create_drop_in(&temp, "20-late.toml", "[main]\nrc-manager = \"file\"\n");
        create_drop_in(&temp, "10-early.toml", "[main]\nrc-manager = \"unmanaged\"\n");
        create_drop_in(&temp, "ignored.conf", "[main]\ndns = \"none\"\n");

        let config = ConfigStore::load(&main).unwrap().get_current();

        assert_eq!(config.rc_manager(), Some("file"));
        assert_eq!(config.dns_mode(), Some("default"));
        assert_eq!(config.config_files().len(), 3);
    }

    #[test]
    fn connection_profiles_accumulate_across_files() {
        let (temp, main) = setup_test_dir();
        fs::write(
            &main,
            "[[connection]]\nid = \"Office\"\ntype = \"ethernet\"\ninterface-name = \"eth0\"\n",
        )
        .unwrap();
        create_drop_in(
            &temp,
            "50-lab.toml",
            "[[connection]]\nid = \"Lab\"\ntype = \"ethernet\"\nautoconnect = false\n",
        );

        let config = ConfigStore::load(&main).unwrap().get_current();
        let ids: Vec<&str> = config
            .config()
            .connections
            .iter()
            .map(|profile| profile.id.as_str())
            .collect();

        assert_eq!(ids, ["Office", "Lab"]);
        assert!(!config.config().connections[1].autoconnect);
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let (_temp, main) = setup_test_dir();
        fs::write(&main, "[main\nunmanaged-devices = ").unwrap();

        let err = ConfigStore::load(&main).err().unwrap();

        assert!(matches!(err, ConfigError::TomlParseError { .. }));
    }

    #[test]
    fn bad_match_spec_fails_loading() {
        let (_temp, main) = setup_test_dir();
        fs::write(&main, "[main]\nunmanaged-devices = [\"mac:\"]\n").unwrap();

        assert!(ConfigStore::load(&main).is_err());
    }
}

mod reloading {
    use super::*;

    #[tokio::test]
    async fn reload_reports_changed_aspects() {
        let (_temp, main) = setup_test_dir();
        fs::write(&main, "[main]\nno-auto-default = [\"eth0\"]\n").unwrap();
        let store = ConfigStore::load(&main).unwrap();

        fs::write(
            &main,
            "[main]\nno-auto-default = [\"eth1\"]\nunmanaged-devices = [\"wlan0\"]\n",
        )
        .unwrap();
        let flags = store.reload().await.unwrap();

        assert!(flags.contains(ConfigChangeFlags::VALUES));
        assert!(flags.contains(ConfigChangeFlags::NO_AUTO_DEFAULT));
        assert!(flags.contains(ConfigChangeFlags::UNMANAGED_DEVICES));
        assert!(!flags.contains(ConfigChangeFlags::IGNORE_CARRIER));
        assert!(store.get_current().no_auto_default().matches("eth1", None));
    }

    #[tokio::test]
    async fn unchanged_file_reloads_silently() {
        let (_temp, main) = setup_test_dir();
        fs::write(&main, "[main]\ndns = \"default\"\n").unwrap();
        let store = ConfigStore::load(&main).unwrap();
        let mut sub = store.subscribe(ConfigChangeFlags::all()).await.unwrap();

        let flags = store.reload().await.unwrap();

        assert!(flags.is_empty());
        let received = tokio::time::timeout(Duration::from_millis(50), sub.recv()).await;
        assert!(received.is_err());
    }

    #[tokio::test]
    async fn new_drop_in_changes_config_files() {
        let (temp, main) = setup_test_dir();
        fs::write(&main, "").unwrap();
        let store = ConfigStore::load(&main).unwrap();
        let mut sub = store
            .subscribe(ConfigChangeFlags::CONFIG_FILES)
            .await
            .unwrap();

        create_drop_in(&temp, "10-extra.toml", "");
        let flags = store.reload().await.unwrap();

        assert!(flags.contains(ConfigChangeFlags::CONFIG_FILES));
        let change = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.old.config_files().len(), 1);
        assert_eq!(change.new.config_files().len(), 2);
    }

    #[tokio::test]
    async fn failed_reload_keeps_current_snapshot() {
        let (_temp, main) = setup_test_dir();
        fs::write(&main, "[main]\nignore-carrier = [\"eth0\"]\n").unwrap();
        let store = ConfigStore::load(&main).unwrap();
        let before = store.get_current();

        fs::write(&main, "[main\n").unwrap();
        assert!(store.reload().await.is_err());

        assert_eq!(*store.get_current(), *before);
        assert!(store.get_current().is_ignore_carrier("eth0", None));
    }

    #[tokio::test]
    async fn subscription_stream_yields_changes() {
        use futures::StreamExt;

        let (_temp, main) = setup_test_dir();
        fs::write(&main, "").unwrap();
        let store = ConfigStore::load(&main).unwrap();
        let stream = store
            .subscribe(ConfigChangeFlags::IGNORE_CARRIER)
            .await
            .unwrap()
            .into_stream();
        let mut stream = Box::pin(stream);

        fs::write(&main, "[main]\nignore-carrier = [\"*\"]\n").unwrap();
        store.reload().await.unwrap();

        let change = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert!(change.new.is_ignore_carrier("anything", None));
    }
}
