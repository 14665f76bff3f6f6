//! VPN plugin seam.
//!
//! Plugin IPC lives outside the daemon core; the core only asks a
//! [`VpnService`] to bring a VPN up over a base interface and to tear it
//! down again.

use async_trait::async_trait;

use crate::services::settings::{ConnectionKind, ConnectionProfile};

/// VPN plugin errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VpnError {
    /// No plugin handles this service type.
    #[error("no VPN plugin for service type '{0}'")]
    PluginUnavailable(String),

    /// The plugin failed to connect.
    #[error("VPN connection failed: {0}")]
    ConnectFailed(String),
}

/// Brings VPN connections up and down.
#[async_trait]
pub trait VpnService: Send + Sync {
    /// Connect `profile` over the base interface `base_iface`.
    async fn connect(&self, profile: &ConnectionProfile, base_iface: &str) -> Result<(), VpnError>;

    /// Disconnect the VPN of profile `uuid`.
    async fn disconnect(&self, uuid: &str) -> Result<(), VpnError>;
}

/// Service used when no plugin is installed: every connect fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVpnService;

#[async_trait]
impl VpnService for NoVpnService {
    async fn connect(&self, profile: &ConnectionProfile, _base_iface: &str) -> Result<(), VpnError> {
        let service_type = match &profile.kind {
            ConnectionKind::Vpn { service_type } => service_type.clone(),
            other => other.type_name().to_string(),
        };
        Err(VpnError::PluginUnavailable(service_type))
    }

    async fn disconnect(&self, _uuid: &str) -> Result<(), VpnError> {
        Ok(())
    }
}
