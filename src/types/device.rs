//! Device types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Values indicating the type of hardware represented by a device object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceType {
    /// unknown device
    #[default]
    Unknown = 0,
    /// a wired ethernet device
    Ethernet = 1,
    /// an 802.11 Wi-Fi device
    Wifi = 2,
    /// a bond master interface
    Bond = 10,
    /// an 802.1Q VLAN interface
    Vlan = 11,
    /// a bridge master interface
    Bridge = 13,
    /// generic support for unrecognized device types
    Generic = 14,
    /// a team master interface
    Team = 15,
    /// a TUN or TAP interface
    Tun = 16,
    /// a VETH interface
    Veth = 20,
    /// a dummy interface
    Dummy = 22,
    /// the loopback interface
    Loopback = 32,
}

impl DeviceType {
    /// Convert from D-Bus u32 representation
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Ethernet,
            2 => Self::Wifi,
            10 => Self::Bond,
            11 => Self::Vlan,
            13 => Self::Bridge,
            14 => Self::Generic,
            15 => Self::Team,
            16 => Self::Tun,
            20 => Self::Veth,
            22 => Self::Dummy,
            32 => Self::Loopback,
            _ => Self::Unknown,
        }
    }

    /// Whether devices of this type can act as a master for enslaved ports.
    pub fn is_master_type(self) -> bool {
        matches!(self, Self::Bond | Self::Bridge | Self::Team)
    }

    /// Default route metric used when a profile does not set one.
    pub fn default_route_metric(self) -> u32 {
        match self {
            Self::Ethernet | Self::Veth => 100,
            Self::Bond | Self::Bridge | Self::Team => 300,
            Self::Vlan => 400,
            Self::Wifi => 600,
            _ => 950,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Ethernet => "ethernet",
            Self::Wifi => "wifi",
            Self::Bond => "bond",
            Self::Vlan => "vlan",
            Self::Bridge => "bridge",
            Self::Generic => "generic",
            Self::Team => "team",
            Self::Tun => "tun",
            Self::Veth => "veth",
            Self::Dummy => "dummy",
            Self::Loopback => "loopback",
        };
        f.write_str(name)
    }
}

/// IP address family used for default-route arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// IPv4
    Inet,
    /// IPv6
    Inet6,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inet => f.write_str("ipv4"),
            Self::Inet6 => f.write_str("ipv6"),
        }
    }
}
