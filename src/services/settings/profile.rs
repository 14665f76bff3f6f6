use std::{
    collections::hash_map::DefaultHasher,
    fmt,
    hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};

use crate::types::{AddressFamily, DeviceType};

/// Addressing method of one IP family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IpMethod {
    /// DHCP / router advertisements.
    #[default]
    Auto,
    /// Static addresses only.
    Manual,
    /// Link-local addressing only.
    LinkLocal,
    /// Share this connection to other hosts (NAT).
    Shared,
    /// Family disabled on the link (IPv4).
    Disabled,
    /// Family left untouched (IPv6).
    Ignore,
}

impl IpMethod {
    /// Whether this method configures anything at all.
    pub fn is_enabled(self) -> bool {
        !matches!(self, Self::Disabled | Self::Ignore)
    }
}

impl fmt::Display for IpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::LinkLocal => "link-local",
            Self::Shared => "shared",
            Self::Disabled => "disabled",
            Self::Ignore => "ignore",
        };
        f.write_str(name)
    }
}

/// Per-family IP settings of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IpSettings {
    /// Addressing method.
    #[serde(default)]
    pub method: IpMethod,
    /// Never install a default route through this connection.
    #[serde(default)]
    pub never_default: bool,
    /// Metric of the default route; per-type default when unset.
    #[serde(default)]
    pub route_metric: Option<u32>,
    /// Static addresses in CIDR notation.
    #[serde(default)]
    pub addresses: Vec<String>,
}

/// Wireless security settings. Only their presence is relevant to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WifiSecurity {
    /// Key management scheme ("wpa-psk", "sae", "none" for WEP, ...).
    pub key_mgmt: String,
}

/// Type-specific part of a connection profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ConnectionKind {
    /// Wired ethernet.
    Ethernet,
    /// 802.11 wireless.
    Wifi {
        /// Network name.
        ssid: String,
        /// Wireless security setting, absent for open networks.
        #[serde(default)]
        security: Option<WifiSecurity>,
    },
    /// Bond master.
    Bond,
    /// Bridge master.
    Bridge,
    /// Team master.
    Team,
    /// 802.1Q VLAN.
    Vlan {
        /// Parent interface name.
        parent: String,
        /// VLAN id.
        id: u16,
    },
    /// VPN handled by an external plugin.
    Vpn {
        /// Plugin service type.
        #[serde(rename = "service-type")]
        service_type: String,
    },
}

impl ConnectionKind {
    /// Device type this profile can be activated on, `None` for VPNs.
    pub fn device_type(&self) -> Option<DeviceType> {
        match self {
            Self::Ethernet => Some(DeviceType::Ethernet),
            Self::Wifi { .. } => Some(DeviceType::Wifi),
            Self::Bond => Some(DeviceType::Bond),
            Self::Bridge => Some(DeviceType::Bridge),
            Self::Team => Some(DeviceType::Team),
            Self::Vlan { .. } => Some(DeviceType::Vlan),
            Self::Vpn { .. } => None,
        }
    }

    /// Setting name used on the bus ("802-3-ethernet", "vpn", ...).
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Ethernet => "802-3-ethernet",
            Self::Wifi { .. } => "802-11-wireless",
            Self::Bond => "bond",
            Self::Bridge => "bridge",
            Self::Team => "team",
            Self::Vlan { .. } => "vlan",
            Self::Vpn { .. } => "vpn",
        }
    }
}

/// An immutable named bundle of settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConnectionProfile {
    /// Human readable name.
    pub id: String,
    /// Stable unique identifier. Derived from `id` when left empty.
    #[serde(default)]
    pub uuid: String,
    /// Type-specific settings.
    #[serde(flatten)]
    pub kind: ConnectionKind,
    /// Restrict the profile to one interface.
    #[serde(default)]
    pub interface_name: Option<String>,
    /// Whether the policy may activate this profile on its own.
    #[serde(default = "default_autoconnect")]
    pub autoconnect: bool,
    /// Higher values are preferred by autoconnect.
    #[serde(default)]
    pub autoconnect_priority: i32,
    /// Interface name of the controlling bond/bridge/team.
    #[serde(default)]
    pub master: Option<String>,
    /// IPv4 settings.
    #[serde(default)]
    pub ipv4: IpSettings,
    /// IPv6 settings.
    #[serde(default)]
    pub ipv6: IpSettings,
    /// Uids allowed to use the profile; empty means everyone.
    #[serde(default)]
    pub permissions: Vec<u32>,
}

fn default_autoconnect() -> bool {
    true
}

impl ConnectionProfile {
    /// A DHCP ethernet profile, the shape of automatically created wired defaults.
    pub fn ethernet(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            uuid: derive_uuid(&id),
            id,
            kind: ConnectionKind::Ethernet,
            interface_name: None,
            autoconnect: true,
            autoconnect_priority: 0,
            master: None,
            ipv4: IpSettings::default(),
            ipv6: IpSettings::default(),
            permissions: Vec::new(),
        }
    }

    /// Fill in derived fields left empty in configuration files.
    pub fn normalize(mut self) -> Self {
        if self.uuid.is_empty() {
            self.uuid = derive_uuid(&self.id);
        }
        if self.master.is_some() {
            self.ipv4.method = IpMethod::Disabled;
            self.ipv6.method = IpMethod::Ignore;
        }
        self
    }

    /// Whether this profile is a VPN.
    pub fn is_vpn(&self) -> bool {
        matches!(self.kind, ConnectionKind::Vpn { .. })
    }

    /// Whether this profile enslaves its device to a master.
    pub fn is_port(&self) -> bool {
        self.master.is_some()
    }

    /// Settings of one address family.
    pub fn ip(&self, family: AddressFamily) -> &IpSettings {
        match family {
            AddressFamily::Inet => &self.ipv4,
            AddressFamily::Inet6 => &self.ipv6,
        }
    }

    /// Whether the wireless setting carries a security setting.
    pub fn has_wireless_security(&self) -> Option<bool> {
        match &self.kind {
            ConnectionKind::Wifi { security, .. } => Some(security.is_some()),
            _ => None,
        }
    }

    /// Whether the profile can be activated on a device of this type and name.
    pub fn is_compatible_with(&self, device_type: DeviceType, iface: &str) -> bool {
        if self.kind.device_type() != Some(device_type) {
            return false;
        }
        self.interface_name
            .as_deref()
            .is_none_or(|name| name == iface)
    }

    /// Whether the profile may ever own a default route for `family`.
    pub fn may_own_default(&self, family: AddressFamily) -> bool {
        let ip = self.ip(family);
        !self.is_port() && ip.method.is_enabled() && !ip.never_default
    }
}

/// Derive a stable RFC 4122 shaped identifier from arbitrary seed text.
pub fn derive_uuid(seed: &str) -> String {
    let mut high = DefaultHasher::new();
    seed.hash(&mut high);
    let a = high.finish();

    let mut low = DefaultHasher::new();
    (seed, a).hash(&mut low);
    let b = low.finish();

    format!(
        "{:08x}-{:04x}-4{:03x}-{:04x}-{:012x}",
        (a >> 32) as u32,
        (a >> 16) as u16,
        a as u16 & 0x0fff,
        ((b >> 48) as u16 & 0x3fff) | 0x8000,
        b & 0xffff_ffff_ffff
    )
}
