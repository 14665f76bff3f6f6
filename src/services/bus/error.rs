use std::path::PathBuf;

/// Bus transport errors.
///
/// None of these are fatal to the daemon: a lost system bus is retried by
/// the [`BusManager`](super::BusManager) and exported objects stay registered.
#[derive(thiserror::Error, Debug)]
pub enum BusError {
    /// No system bus connection is currently established.
    #[error("not connected to the system bus")]
    Disconnected,

    /// Another process already owns the service name.
    #[error("bus name {name} is already owned")]
    NameTaken {
        /// Requested well-known name
        name: String,
    },

    /// The sender is not known to any live connection.
    #[error("unknown sender {0}")]
    UnknownSender(String),

    /// The private socket could not be set up.
    #[error("private socket '{path}': {details}")]
    PrivateSocket {
        /// Socket path
        path: PathBuf,
        /// I/O error details
        details: String,
    },

    /// The transport reported an error.
    #[error("D-Bus error: {0}")]
    Transport(#[from] zbus::Error),

    /// A bus daemon method call failed.
    #[error("D-Bus call failed: {0}")]
    Call(#[from] zbus::fdo::Error),
}
