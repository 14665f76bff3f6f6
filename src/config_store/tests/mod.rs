//! Unit tests for config_store module
//! No filesystem dependencies.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use crate::{
    config::{Config, ConfigChangeFlags, ConfigData},
    config_store::ConfigStore,
};

fn data(toml_str: &str) -> ConfigData {
    let config: Config = toml::from_str(toml_str).unwrap();
    ConfigData::new(config, Vec::new()).unwrap()
}

#[tokio::test]
async fn replace_with_identical_snapshot_is_silent() {
    let store = ConfigStore::with_defaults();
    let mut sub = store.subscribe(ConfigChangeFlags::all()).await.unwrap();

    let flags = store.replace(ConfigData::with_defaults()).await.unwrap();
    assert!(flags.is_empty());

    let received = tokio::time::timeout(Duration::from_millis(50), sub.recv()).await;
    assert!(received.is_err());
}

#[tokio::test]
async fn subscribers_receive_matching_changes() {
    let store = ConfigStore::with_defaults();
    let mut carrier = store
        .subscribe(ConfigChangeFlags::IGNORE_CARRIER)
        .await
        .unwrap();
    let mut dns = store.subscribe(ConfigChangeFlags::DNS_MODE).await.unwrap();

    store
        .replace(data("[main]\nignore-carrier = [\"eth0\"]\n"))
        .await
        .unwrap();

    let change = tokio::time::timeout(Duration::from_secs(1), carrier.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(change.flags.contains(ConfigChangeFlags::IGNORE_CARRIER));
    assert!(change.new.is_ignore_carrier("eth0", None));
    assert!(!change.old.is_ignore_carrier("eth0", None));

    let unrelated = tokio::time::timeout(Duration::from_millis(50), dns.recv()).await;
    assert!(unrelated.is_err());
}

#[tokio::test]
async fn replace_swaps_snapshot_wholesale() {
    let store = ConfigStore::with_defaults();
    let before = store.get_current();

    store.replace(data("[main]\nrc-manager = \"file\"\n")).await.unwrap();

    assert_eq!(before.rc_manager(), None);
    assert_eq!(store.get_current().rc_manager(), Some("file"));
}

#[tokio::test]
async fn reload_without_backing_file_is_noop() {
    let store = ConfigStore::with_defaults();
    assert!(store.reload().await.unwrap().is_empty());
}

#[test]
fn store_is_built_outside_a_runtime() {
    let store = ConfigStore::with_defaults();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let mut sub = store.subscribe(ConfigChangeFlags::all()).await.unwrap();
        store
            .replace(data("[main]\nignore-carrier = [\"eth0\"]\n"))
            .await
            .unwrap();
        let change = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(change.flags.contains(ConfigChangeFlags::IGNORE_CARRIER));
    });
}

#[tokio::test]
async fn slow_subscriber_sees_every_change() {
    let store = ConfigStore::with_defaults();
    let mut sub = store.subscribe(ConfigChangeFlags::all()).await.unwrap();

    for round in 0..40 {
        let iface = format!("eth{round}");
        store
            .replace(data(&format!("[main]\nignore-carrier = [\"{iface}\"]\n")))
            .await
            .unwrap();
    }

    for round in 0..40 {
        let change = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(change.new.is_ignore_carrier(&format!("eth{round}"), None));
    }
}
