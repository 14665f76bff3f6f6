//! Typed snapshots of the objects the daemon exports.
//!
//! The core writes these into [`Property`] cells as it changes state; the
//! transport adapter only ever reads them.

use crate::{
    services::common::{ObjectPath, Property},
    types::{
        ActiveConnectionState, ActiveConnectionStateReason, DeviceCapabilities, DeviceState,
        DeviceStateReason, DeviceType,
    },
};

/// Exported view of a device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceProperties {
    /// Object path.
    pub path: ObjectPath,
    /// Interface name.
    pub interface: String,
    /// Kernel driver.
    pub driver: String,
    /// Hardware address.
    pub hw_address: Option<String>,
    /// Device type.
    pub device_type: DeviceType,
    /// Current state.
    pub state: DeviceState,
    /// Reason for the last state change.
    pub state_reason: DeviceStateReason,
    /// Whether the device is managed.
    pub managed: bool,
    /// Whether autoconnect is allowed.
    pub autoconnect: bool,
    /// Capability flags.
    pub capabilities: DeviceCapabilities,
    /// Path of the bound active connection.
    pub active_connection: Option<ObjectPath>,
}

/// Exported view of an active connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActiveConnectionProperties {
    /// Object path.
    pub path: ObjectPath,
    /// Profile id.
    pub id: String,
    /// Profile uuid.
    pub uuid: String,
    /// Profile type name.
    pub connection_type: String,
    /// Bound device paths.
    pub devices: Vec<ObjectPath>,
    /// Current state.
    pub state: ActiveConnectionState,
    /// Reason for the last state change.
    pub state_reason: ActiveConnectionStateReason,
    /// Owns the IPv4 default route.
    pub default: bool,
    /// Owns the IPv6 default route.
    pub default6: bool,
    /// Is a VPN connection.
    pub vpn: bool,
    /// Master device path.
    pub master: Option<ObjectPath>,
    /// Specific object requested at activation.
    pub specific_object: Option<ObjectPath>,
}

/// An object registered with the bus manager.
#[derive(Debug, Clone)]
pub enum ExportedObject {
    /// `org.freedesktop.NetworkManager.Device`
    Device(Property<DeviceProperties>),
    /// `org.freedesktop.NetworkManager.Connection.Active`
    ActiveConnection(Property<ActiveConnectionProperties>),
}

impl ExportedObject {
    /// D-Bus interface name of the object.
    pub fn interface_name(&self) -> &'static str {
        match self {
            Self::Device(_) => "org.freedesktop.NetworkManager.Device",
            Self::ActiveConnection(_) => "org.freedesktop.NetworkManager.Connection.Active",
        }
    }
}
