//! Device, active-connection and overall networking states.
//!
//! Numeric values are part of the outward D-Bus contract and must never change.

use std::fmt;

/// Overall networking state of the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NMState {
    /// Networking state is unknown.
    #[default]
    Unknown = 0,
    /// Networking is not enabled, the system is being suspended or resumed from suspend.
    Asleep = 10,
    /// No active network connection.
    Disconnected = 20,
    /// Network connections are being cleaned up.
    Disconnecting = 30,
    /// A network connection is being started.
    Connecting = 40,
    /// Only local IPv4 and/or IPv6 connectivity, but no default route.
    ConnectedLocal = 50,
    /// Site-wide IPv4 and/or IPv6 connectivity only.
    ConnectedSite = 60,
    /// Global IPv4 and/or IPv6 Internet connectivity.
    ConnectedGlobal = 70,
}

impl NMState {
    /// Convert from D-Bus u32 representation
    pub fn from_u32(value: u32) -> Self {
        match value {
            10 => Self::Asleep,
            20 => Self::Disconnected,
            30 => Self::Disconnecting,
            40 => Self::Connecting,
            50 => Self::ConnectedLocal,
            60 => Self::ConnectedSite,
            70 => Self::ConnectedGlobal,
            _ => Self::Unknown,
        }
    }
}

/// Device-specific states.
///
/// Ordering follows the activation pipeline, so `state >= DeviceState::Prepare`
/// style comparisons are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum DeviceState {
    /// the device's state is unknown
    #[default]
    Unknown = 0,
    /// the device is recognized, but not managed
    Unmanaged = 10,
    /// the device is managed, but is not available for use (no carrier, missing firmware,
    /// switched off)
    Unavailable = 20,
    /// the device can be activated, but is currently idle and not connected to a network.
    Disconnected = 30,
    /// Device is preparing the connection to the network (link up, MAC changes).
    Prepare = 40,
    /// Device is connecting to the requested network (enslaving, associating).
    Config = 50,
    /// Device requires more information to continue connecting. Kept for numeric
    /// stability; secret agents are not handled by this core.
    NeedAuth = 60,
    /// the device is requesting IPv4 and/or IPv6 addresses and routing information.
    IpConfig = 70,
    /// Device is checking whether further action is required for the requested network.
    IpCheck = 80,
    /// the device is waiting for secondary connections to activate.
    Secondaries = 90,
    /// the device has a network connection, either local or global.
    Activated = 100,
    /// a disconnection from the current network connection was requested.
    Deactivating = 110,
    /// the device failed to connect to the requested network and is cleaning up.
    Failed = 120,
}

impl DeviceState {
    /// Convert from D-Bus u32 representation
    pub fn from_u32(value: u32) -> Self {
        match value {
            10 => Self::Unmanaged,
            20 => Self::Unavailable,
            30 => Self::Disconnected,
            40 => Self::Prepare,
            50 => Self::Config,
            60 => Self::NeedAuth,
            70 => Self::IpConfig,
            80 => Self::IpCheck,
            90 => Self::Secondaries,
            100 => Self::Activated,
            110 => Self::Deactivating,
            120 => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// States in which a device may carry an active connection.
    pub fn may_hold_active_connection(self) -> bool {
        matches!(
            self,
            Self::Prepare
                | Self::Config
                | Self::NeedAuth
                | Self::IpConfig
                | Self::IpCheck
                | Self::Secondaries
                | Self::Activated
                | Self::Deactivating
        )
    }

    /// True while the forward activation pipeline is running.
    pub fn is_activating(self) -> bool {
        self >= Self::Prepare && self < Self::Activated
    }

    /// The next stage of the forward pipeline, if any.
    pub fn next_stage(self) -> Option<Self> {
        match self {
            Self::Prepare => Some(Self::Config),
            Self::Config => Some(Self::IpConfig),
            Self::IpConfig => Some(Self::IpCheck),
            Self::IpCheck => Some(Self::Secondaries),
            Self::Secondaries => Some(Self::Activated),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Unmanaged => "unmanaged",
            Self::Unavailable => "unavailable",
            Self::Disconnected => "disconnected",
            Self::Prepare => "prepare",
            Self::Config => "config",
            Self::NeedAuth => "need-auth",
            Self::IpConfig => "ip-config",
            Self::IpCheck => "ip-check",
            Self::Secondaries => "secondaries",
            Self::Activated => "activated",
            Self::Deactivating => "deactivating",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State of a connection to a specific network while it is starting, connected, or
/// disconnecting from that network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ActiveConnectionState {
    /// the state of the connection is unknown
    #[default]
    Unknown = 0,
    /// a network connection is being prepared
    Activating = 1,
    /// there is a connection to the network
    Activated = 2,
    /// the network connection is being torn down and cleaned up
    Deactivating = 3,
    /// the network connection is disconnected and will be removed
    Deactivated = 4,
}

impl ActiveConnectionState {
    /// Convert from D-Bus u32 representation
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Activating,
            2 => Self::Activated,
            3 => Self::Deactivating,
            4 => Self::Deactivated,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ActiveConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Deactivating => "deactivating",
            Self::Deactivated => "deactivated",
        };
        f.write_str(name)
    }
}

/// Device state change reason codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceStateReason {
    /// No reason given
    #[default]
    None = 0,
    /// Unknown error
    Unknown = 1,
    /// Device is now managed
    NowManaged = 2,
    /// Device is now unmanaged
    NowUnmanaged = 3,
    /// The device could not be readied for configuration
    ConfigFailed = 4,
    /// IP configuration could not be reserved (no available address, timeout, etc)
    IpConfigUnavailable = 5,
    /// The IP config is no longer valid
    IpConfigExpired = 6,
    /// The device was removed
    Removed = 36,
    /// The device's active connection disappeared
    ConnectionRemoved = 38,
    /// Device disconnected by user or client
    UserRequested = 39,
    /// Carrier/link changed
    Carrier = 40,
    /// A dependency of the connection failed
    DependencyFailed = 50,
    /// New connection activation was enqueued
    NewActivation = 60,
}

impl DeviceStateReason {
    /// Convert from D-Bus u32 representation
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::None,
            2 => Self::NowManaged,
            3 => Self::NowUnmanaged,
            4 => Self::ConfigFailed,
            5 => Self::IpConfigUnavailable,
            6 => Self::IpConfigExpired,
            36 => Self::Removed,
            38 => Self::ConnectionRemoved,
            39 => Self::UserRequested,
            40 => Self::Carrier,
            50 => Self::DependencyFailed,
            60 => Self::NewActivation,
            _ => Self::Unknown,
        }
    }
}

/// Active connection state reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ActiveConnectionStateReason {
    /// The reason for the active connection state change is unknown.
    #[default]
    Unknown = 0,
    /// No reason was given for the active connection state change.
    None = 1,
    /// The active connection changed state because the user disconnected it.
    UserDisconnected = 2,
    /// The active connection changed state because the device it was using was
    /// disconnected.
    DeviceDisconnected = 3,
    /// The service providing the VPN connection was stopped.
    ServiceStopped = 4,
    /// The IP config of the active connection was invalid.
    IpConfigInvalid = 5,
    /// The connection attempt to the VPN service timed out.
    ConnectTimeout = 6,
    /// A timeout occurred while starting the service providing the VPN connection.
    ServiceStartTimeout = 7,
    /// Starting the service providing the VPN connection failed.
    ServiceStartFailed = 8,
    /// Necessary secrets for the connection were not provided.
    NoSecrets = 9,
    /// Authentication to the server failed.
    LoginFailed = 10,
    /// The connection was deleted from settings.
    ConnectionRemoved = 11,
    /// Master connection of this connection failed to activate.
    DependencyFailed = 12,
    /// Could not create the software device link.
    DeviceRealizeFailed = 13,
    /// The device this connection depended on disappeared.
    DeviceRemoved = 14,
}

impl ActiveConnectionStateReason {
    /// Maps the reason a device left its active connection to the reason reported on
    /// the active connection itself.
    pub fn from_device_reason(reason: DeviceStateReason) -> Self {
        match reason {
            DeviceStateReason::UserRequested => Self::UserDisconnected,
            DeviceStateReason::DependencyFailed => Self::DependencyFailed,
            DeviceStateReason::Removed => Self::DeviceRemoved,
            DeviceStateReason::ConnectionRemoved => Self::ConnectionRemoved,
            DeviceStateReason::IpConfigUnavailable | DeviceStateReason::IpConfigExpired => {
                Self::IpConfigInvalid
            }
            DeviceStateReason::None => Self::None,
            _ => Self::DeviceDisconnected,
        }
    }
}
