use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::{LinkInfo, Platform, PlatformError, PlatformEvent};
use crate::{
    services::settings::{IpMethod, IpSettings},
    types::DeviceType,
};

const ARPHRD_ETHER: u32 = 1;
const ARPHRD_LOOPBACK: u32 = 772;
const ARPHRD_NONE: u32 = 65534;

/// Platform reading links from sysfs and changing them with `ip(8)`.
#[derive(Debug, Clone)]
pub struct SysfsPlatform {
    root: PathBuf,
    poll_interval: Duration,
    ip_binary: PathBuf,
}

impl Default for SysfsPlatform {
    fn default() -> Self {
        Self::new(PathBuf::from("/sys/class/net"), Duration::from_secs(1))
    }
}

impl SysfsPlatform {
    /// Platform reading `root` (normally `/sys/class/net`) every `poll_interval`.
    pub fn new(root: PathBuf, poll_interval: Duration) -> Self {
        Self {
            root,
            poll_interval,
            ip_binary: PathBuf::from("ip"),
        }
    }

    /// Read all links below the sysfs root.
    ///
    /// # Errors
    /// Returns `PlatformError::Io` if the root cannot be listed.
    pub fn scan(root: &Path) -> Result<Vec<LinkInfo>, PlatformError> {
        let entries = fs::read_dir(root).map_err(|e| PlatformError::Io {
            path: root.to_path_buf(),
            details: e.to_string(),
        })?;

        let mut links: Vec<LinkInfo> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                read_link(&entry.path(), name)
            })
            .collect();
        links.sort_by_key(|link| link.ifindex);
        Ok(links)
    }

    async fn ip(&self, args: &[&str]) -> Result<(), PlatformError> {
        let command = format!("ip {}", args.join(" "));
        debug!(%command, "Running link command");

        let output = Command::new(&self.ip_binary)
            .args(args)
            .output()
            .await
            .map_err(|e| PlatformError::CommandFailed {
                command: command.clone(),
                details: e.to_string(),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(PlatformError::CommandFailed {
                command,
                details: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            })
        }
    }
}

fn read_attr(dir: &Path, attr: &str) -> Option<String> {
    fs::read_to_string(dir.join(attr))
        .ok()
        .map(|s| s.trim().to_string())
}

fn read_link(dir: &Path, name: String) -> Option<LinkInfo> {
    let ifindex = read_attr(dir, "ifindex")?.parse().ok()?;
    let arp_type: u32 = read_attr(dir, "type")
        .and_then(|t| t.parse().ok())
        .unwrap_or(0);
    let devtype = read_attr(dir, "uevent").and_then(|uevent| {
        uevent
            .lines()
            .find_map(|l| l.strip_prefix("DEVTYPE=").map(str::to_string))
    });

    let device_type = if arp_type == ARPHRD_LOOPBACK {
        DeviceType::Loopback
    } else if dir.join("wireless").exists() || devtype.as_deref() == Some("wlan") {
        DeviceType::Wifi
    } else if dir.join("bonding").exists() || devtype.as_deref() == Some("bond") {
        DeviceType::Bond
    } else if dir.join("bridge").exists() || devtype.as_deref() == Some("bridge") {
        DeviceType::Bridge
    } else {
        match devtype.as_deref() {
            Some("vlan") => DeviceType::Vlan,
            Some("team") => DeviceType::Team,
            Some("veth") => DeviceType::Veth,
            Some("dummy") => DeviceType::Dummy,
            _ if dir.join("tun_flags").exists() || arp_type == ARPHRD_NONE => DeviceType::Tun,
            _ if arp_type == ARPHRD_ETHER => DeviceType::Ethernet,
            _ => DeviceType::Generic,
        }
    };

    let hardware = dir.join("device").exists();
    let driver = fs::read_link(dir.join("device").join("driver"))
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_default();
    let hw_address = read_attr(dir, "address")
        .filter(|a| !a.is_empty() && a != "00:00:00:00:00:00");
    let operstate = read_attr(dir, "operstate").unwrap_or_default();
    let flags = read_attr(dir, "flags")
        .and_then(|f| u32::from_str_radix(f.trim_start_matches("0x"), 16).ok())
        .unwrap_or(0);

    Some(LinkInfo {
        ifindex,
        name,
        device_type,
        driver,
        hw_address,
        software: !hardware && device_type != DeviceType::Loopback,
        carrier: read_attr(dir, "carrier").as_deref() == Some("1"),
        up: flags & 0x1 != 0 || operstate == "up",
    })
}

/// Events turning `old` into `new`.
pub(super) fn diff_links(old: &HashMap<u32, LinkInfo>, new: &HashMap<u32, LinkInfo>) -> Vec<PlatformEvent> {
    let mut events = Vec::new();

    let mut removed: Vec<u32> = old.keys().filter(|i| !new.contains_key(i)).copied().collect();
    removed.sort_unstable();
    events.extend(removed.into_iter().map(|ifindex| PlatformEvent::LinkRemoved { ifindex }));

    let mut current: Vec<&LinkInfo> = new.values().collect();
    current.sort_by_key(|l| l.ifindex);
    for link in current {
        match old.get(&link.ifindex) {
            None => events.push(PlatformEvent::LinkAdded(link.clone())),
            Some(previous) => {
                if previous.up != link.up {
                    events.push(PlatformEvent::LinkStateChanged {
                        ifindex: link.ifindex,
                        up: link.up,
                    });
                }
                if previous.carrier != link.carrier {
                    events.push(PlatformEvent::CarrierChanged {
                        ifindex: link.ifindex,
                        carrier: link.carrier,
                    });
                }
            }
        }
    }

    events
}

fn index(links: Vec<LinkInfo>) -> HashMap<u32, LinkInfo> {
    links.into_iter().map(|l| (l.ifindex, l)).collect()
}

#[async_trait]
impl Platform for SysfsPlatform {
    async fn links(&self) -> Result<Vec<LinkInfo>, PlatformError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || Self::scan(&root))
            .await
            .map_err(|e| PlatformError::Io {
                path: self.root.clone(),
                details: e.to_string(),
            })?
    }

    fn events(&self) -> BoxStream<'static, PlatformEvent> {
        let root = self.root.clone();
        let poll_interval = self.poll_interval;

        async_stream::stream! {
            let mut known = index(Self::scan(&root).unwrap_or_default());
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let scanned = match Self::scan(&root) {
                    Ok(links) => index(links),
                    Err(err) => {
                        warn!(error = %err, "Failed to scan links");
                        continue;
                    }
                };
                for event in diff_links(&known, &scanned) {
                    yield event;
                }
                known = scanned;
            }
        }
        .boxed()
    }

    #[instrument(skip(self))]
    async fn link_set_up(&self, iface: &str) -> Result<(), PlatformError> {
        self.ip(&["link", "set", "dev", iface, "up"]).await
    }

    #[instrument(skip(self))]
    async fn link_set_down(&self, iface: &str) -> Result<(), PlatformError> {
        self.ip(&["link", "set", "dev", iface, "down"]).await
    }

    #[instrument(skip(self))]
    async fn link_enslave(&self, iface: &str, master: &str) -> Result<(), PlatformError> {
        self.ip(&["link", "set", "dev", iface, "master", master]).await
    }

    #[instrument(skip(self))]
    async fn link_release(&self, iface: &str) -> Result<(), PlatformError> {
        self.ip(&["link", "set", "dev", iface, "nomaster"]).await
    }

    #[instrument(skip(self, ipv4, ipv6))]
    async fn configure_ip(
        &self,
        iface: &str,
        ipv4: &IpSettings,
        ipv6: &IpSettings,
    ) -> Result<(), PlatformError> {
        for (family, settings) in [("-4", ipv4), ("-6", ipv6)] {
            if settings.method != IpMethod::Manual {
                debug!(iface, family, method = %settings.method, "Addressing left to external client");
                continue;
            }
            for address in &settings.addresses {
                self.ip(&[family, "addr", "replace", address, "dev", iface])
                    .await?;
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn deconfigure_ip(&self, iface: &str) -> Result<(), PlatformError> {
        self.ip(&["addr", "flush", "dev", iface]).await
    }

    #[instrument(skip(self))]
    async fn link_delete(&self, iface: &str) -> Result<(), PlatformError> {
        if !self.root.join(iface).exists() {
            return Err(PlatformError::LinkNotFound(iface.to_string()));
        }
        self.ip(&["link", "delete", "dev", iface]).await
    }
}
