/// D-Bus object path reference.
///
/// Represents a D-Bus object path as a string (e.g., "/org/freedesktop/NetworkManager/Devices/3").
/// Devices and active connections keep their exported path in this form; the bus
/// adapter converts at the transport boundary.
pub type ObjectPath = String;

/// Object path prefix for exported devices.
pub const DEVICE_PATH_PREFIX: &str = "/org/freedesktop/NetworkManager/Devices";

/// Object path prefix for exported active connections.
pub const ACTIVE_CONNECTION_PATH_PREFIX: &str = "/org/freedesktop/NetworkManager/ActiveConnection";
