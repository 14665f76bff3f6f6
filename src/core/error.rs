use crate::{
    config::ConfigError,
    services::{
        auth::AuthError, bus::BusError, platform::PlatformError, session::SessionError,
    },
    types::DeviceStateReason,
};

/// Errors surfaced by the connection activation core.
///
/// Authorization and state-precondition failures are returned to the caller
/// immediately and never retried.
#[derive(thiserror::Error, Debug)]
pub enum NetworkError {
    /// A permission check resolved to anything other than "yes".
    #[error("{reason}")]
    AuthorizationDenied {
        /// Caller-visible explanation.
        reason: String,
    },

    /// The operation is invalid for the object's current state.
    #[error("cannot {operation} {object} in state '{state}'")]
    WrongState {
        /// The rejected operation.
        operation: &'static str,
        /// Object the operation was aimed at (interface name, AC id, ...).
        object: String,
        /// State the object was in.
        state: String,
    },

    /// Deletion attempted on a hardware-backed device.
    #[error("device '{0}' is not a software device and cannot be deleted")]
    NotSoftware(String),

    /// Policy or session backend could not be reached.
    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable {
        /// Backend name.
        backend: &'static str,
        /// Failure details.
        reason: String,
    },

    /// A forward-pipeline stage failed.
    #[error("activation on '{device}' failed: {reason:?}")]
    PipelineFailure {
        /// Interface the pipeline ran on.
        device: String,
        /// Reason code reported on the device.
        reason: DeviceStateReason,
    },

    /// The system bus connection is currently absent.
    #[error("system bus connection lost")]
    BusDisconnected,

    /// No device with this interface name or object path.
    #[error("device {0} not found")]
    DeviceNotFound(String),

    /// No connection profile with this id or uuid.
    #[error("connection {0} not found")]
    ConnectionNotFound(String),

    /// No active connection with this id or object path.
    #[error("active connection {0} not found")]
    ActiveConnectionNotFound(String),

    /// Profile cannot be activated on the given device.
    #[error("connection '{connection}' is not compatible with device '{device}'")]
    ConnectionIncompatible {
        /// Profile id.
        connection: String,
        /// Interface name.
        device: String,
    },

    /// Master relationship rejected.
    #[error("invalid master: {0}")]
    InvalidMaster(String),

    /// The manager task is no longer running.
    #[error("{0} service unavailable")]
    ServiceUnavailable(&'static str),

    /// Platform (kernel link) operation failed.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Bus transport operation failed.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// Configuration could not be loaded or distributed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl NetworkError {
    /// Outward D-Bus error name for this error.
    pub fn dbus_error_name(&self) -> &'static str {
        match self {
            Self::AuthorizationDenied { .. } => "org.freedesktop.NetworkManager.PermissionDenied",
            Self::WrongState { .. } => "org.freedesktop.NetworkManager.Device.NotAllowed",
            Self::NotSoftware(_) => "org.freedesktop.NetworkManager.Device.NotSoftware",
            Self::DeviceNotFound(_) => "org.freedesktop.NetworkManager.UnknownDevice",
            Self::ConnectionNotFound(_) => "org.freedesktop.NetworkManager.UnknownConnection",
            Self::ActiveConnectionNotFound(_) => {
                "org.freedesktop.NetworkManager.ConnectionNotActive"
            }
            Self::ConnectionIncompatible { .. } => {
                "org.freedesktop.NetworkManager.Device.IncompatibleConnection"
            }
            Self::InvalidMaster(_) => "org.freedesktop.NetworkManager.Device.InvalidArgument",
            Self::PipelineFailure { .. } => "org.freedesktop.NetworkManager.Device.CreationFailed",
            Self::BusDisconnected
            | Self::BackendUnavailable { .. }
            | Self::ServiceUnavailable(_)
            | Self::Platform(_)
            | Self::Bus(_)
            | Self::Config(_) => "org.freedesktop.NetworkManager.Failed",
        }
    }

    pub(crate) fn wrong_state(
        operation: &'static str,
        object: impl Into<String>,
        state: impl ToString,
    ) -> Self {
        Self::WrongState {
            operation,
            object: object.into(),
            state: state.to_string(),
        }
    }
}

impl From<AuthError> for NetworkError {
    fn from(err: AuthError) -> Self {
        Self::BackendUnavailable {
            backend: "policy",
            reason: err.to_string(),
        }
    }
}

impl From<SessionError> for NetworkError {
    fn from(err: SessionError) -> Self {
        Self::BackendUnavailable {
            backend: "session",
            reason: err.to_string(),
        }
    }
}
