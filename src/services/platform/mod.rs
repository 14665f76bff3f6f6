//! Kernel link layer seen by the activation core.
//!
//! The core only reacts to link events and issues a handful of link
//! commands; address acquisition itself (DHCP, SLAAC) is an external
//! collaborator.

mod sysfs;

#[cfg(test)]
mod tests;

use std::path::PathBuf;

use async_trait::async_trait;
use futures::stream::BoxStream;

pub use sysfs::SysfsPlatform;

use crate::{services::settings::IpSettings, types::DeviceType};

/// Snapshot of one kernel link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    /// Kernel interface index.
    pub ifindex: u32,
    /// Interface name.
    pub name: String,
    /// Link type.
    pub device_type: DeviceType,
    /// Kernel driver, empty for most software links.
    pub driver: String,
    /// Permanent or current hardware address.
    pub hw_address: Option<String>,
    /// Created by software (bond, bridge, vlan, ...) rather than backed by hardware.
    pub software: bool,
    /// Carrier detected.
    pub carrier: bool,
    /// Administratively up.
    pub up: bool,
}

/// Link change reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    /// A link appeared.
    LinkAdded(LinkInfo),
    /// A link disappeared.
    LinkRemoved {
        /// Index of the removed link.
        ifindex: u32,
    },
    /// Carrier went up or down.
    CarrierChanged {
        /// Link index.
        ifindex: u32,
        /// New carrier state.
        carrier: bool,
    },
    /// Administrative state changed.
    LinkStateChanged {
        /// Link index.
        ifindex: u32,
        /// Whether the link is up.
        up: bool,
    },
}

/// Platform errors.
#[derive(thiserror::Error, Debug)]
pub enum PlatformError {
    /// A link command exited unsuccessfully.
    #[error("'{command}' failed: {details}")]
    CommandFailed {
        /// Command line that failed
        command: String,
        /// Exit status and stderr
        details: String,
    },

    /// sysfs could not be read.
    #[error("I/O error on '{path}': {details}")]
    Io {
        /// Path being read
        path: PathBuf,
        /// I/O error details
        details: String,
    },

    /// No link with this name.
    #[error("link {0} not found")]
    LinkNotFound(String),
}

/// Link layer operations and events.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Links currently present.
    async fn links(&self) -> Result<Vec<LinkInfo>, PlatformError>;

    /// Stream of link changes from now on.
    fn events(&self) -> BoxStream<'static, PlatformEvent>;

    /// Bring a link up.
    async fn link_set_up(&self, iface: &str) -> Result<(), PlatformError>;

    /// Bring a link down.
    async fn link_set_down(&self, iface: &str) -> Result<(), PlatformError>;

    /// Enslave `iface` to `master`.
    async fn link_enslave(&self, iface: &str, master: &str) -> Result<(), PlatformError>;

    /// Release `iface` from its master.
    async fn link_release(&self, iface: &str) -> Result<(), PlatformError>;

    /// Apply static IP configuration of both families.
    async fn configure_ip(
        &self,
        iface: &str,
        ipv4: &IpSettings,
        ipv6: &IpSettings,
    ) -> Result<(), PlatformError>;

    /// Remove all addresses from a link.
    async fn deconfigure_ip(&self, iface: &str) -> Result<(), PlatformError>;

    /// Delete a software link.
    async fn link_delete(&self, iface: &str) -> Result<(), PlatformError>;
}
