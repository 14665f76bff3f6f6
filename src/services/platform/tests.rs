#![allow(clippy::unwrap_used)]

use std::{collections::HashMap, fs, path::Path};

use tempfile::TempDir;

use super::{SysfsPlatform, sysfs::diff_links, *};

fn write_link(root: &Path, name: &str, attrs: &[(&str, &str)]) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    for (attr, value) in attrs {
        fs::write(dir.join(attr), format!("{value}\n")).unwrap();
    }
}

fn sysfs() -> TempDir {
    let root = TempDir::new().unwrap();
    let path = root.path();

    write_link(path, "lo", &[("ifindex", "1"), ("type", "772"), ("carrier", "1")]);
    write_link(
        path,
        "eth0",
        &[
            ("ifindex", "2"),
            ("type", "1"),
            ("carrier", "1"),
            ("operstate", "up"),
            ("address", "52:54:00:12:34:56"),
        ],
    );
    fs::create_dir_all(path.join("eth0/device")).unwrap();

    write_link(path, "wlan0", &[("ifindex", "3"), ("type", "1"), ("carrier", "0")]);
    fs::create_dir_all(path.join("wlan0/wireless")).unwrap();
    fs::create_dir_all(path.join("wlan0/device")).unwrap();

    write_link(path, "bond0", &[("ifindex", "4"), ("type", "1")]);
    fs::create_dir_all(path.join("bond0/bonding")).unwrap();

    write_link(
        path,
        "eth0.10",
        &[("ifindex", "5"), ("type", "1"), ("uevent", "DEVTYPE=vlan")],
    );

    root
}

#[test]
fn scan_classifies_links() {
    let root = sysfs();
    let links = SysfsPlatform::scan(root.path()).unwrap();
    let by_name: HashMap<_, _> = links.iter().map(|l| (l.name.as_str(), l)).collect();

    assert_eq!(links.len(), 5);
    assert_eq!(by_name["lo"].device_type, DeviceType::Loopback);
    assert!(!by_name["lo"].software);

    let eth0 = by_name["eth0"];
    assert_eq!(eth0.device_type, DeviceType::Ethernet);
    assert!(!eth0.software);
    assert!(eth0.carrier);
    assert!(eth0.up);
    assert_eq!(eth0.hw_address.as_deref(), Some("52:54:00:12:34:56"));

    assert_eq!(by_name["wlan0"].device_type, DeviceType::Wifi);
    assert!(!by_name["wlan0"].carrier);

    assert_eq!(by_name["bond0"].device_type, DeviceType::Bond);
    assert!(by_name["bond0"].software);
    assert_eq!(by_name["eth0.10"].device_type, DeviceType::Vlan);
}

#[test]
fn scan_skips_entries_without_ifindex() {
    let root = sysfs();
    fs::create_dir_all(root.path().join("bonding_masters")).unwrap();

    assert_eq!(SysfsPlatform::scan(root.path()).unwrap().len(), 5);
}

#[test]
fn diff_reports_changes_in_order() {
    let root = sysfs();
    let before: HashMap<_, _> = SysfsPlatform::scan(root.path())
        .unwrap()
        .into_iter()
        .map(|l| (l.ifindex, l))
        .collect();

    fs::write(root.path().join("eth0/carrier"), "0\n").unwrap();
    fs::remove_dir_all(root.path().join("eth0.10")).unwrap();
    write_link(root.path(), "dummy0", &[("ifindex", "9"), ("uevent", "DEVTYPE=dummy")]);

    let after: HashMap<_, _> = SysfsPlatform::scan(root.path())
        .unwrap()
        .into_iter()
        .map(|l| (l.ifindex, l))
        .collect();

    let events = diff_links(&before, &after);

    assert_eq!(events[0], PlatformEvent::LinkRemoved { ifindex: 5 });
    assert_eq!(
        events[1],
        PlatformEvent::CarrierChanged {
            ifindex: 2,
            carrier: false
        }
    );
    assert!(matches!(&events[2], PlatformEvent::LinkAdded(link) if link.name == "dummy0"));
    assert_eq!(events.len(), 3);
}
