//! Active connections: one attempt to bring a profile up.
//!
//! An [`ActiveConnection`] is built with its write-once fields (profile,
//! subject, device, master) through [`ActiveConnectionBuilder`], authorized
//! through an [`AuthChain`], exported once its device or VPN parent is known,
//! and then only moves forward until the terminal
//! [`ActiveConnectionState::Deactivated`].


use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    core::{NetworkError, Result},
    device::{DeviceId, device_path},
    services::{
        auth::{AuthChain, AuthSubject, permissions},
        bus::ActiveConnectionProperties,
        common::{ACTIVE_CONNECTION_PATH_PREFIX, ObjectPath, Property},
        settings::ConnectionProfile,
    },
    types::{ActiveConnectionState, ActiveConnectionStateReason, AddressFamily},
};

/// Process-lifetime active connection identifier.
pub type ActiveConnectionId = u64;

/// Object path of the active connection with this id.
pub fn active_connection_path(id: ActiveConnectionId) -> ObjectPath {
    format!("{ACTIVE_CONNECTION_PATH_PREFIX}/{id}")
}

/// Outcome of an accepted state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveConnectionStateChange {
    /// State before the transition.
    pub old: ActiveConnectionState,
    /// State after the transition.
    pub new: ActiveConnectionState,
    /// Reason recorded with the new state.
    pub reason: ActiveConnectionStateReason,
}

impl ActiveConnectionStateChange {
    /// Whether the transition enters or leaves `Activated`, which is when the
    /// profile's last-used timestamp is refreshed.
    pub fn touches_activated(&self) -> bool {
        self.old == ActiveConnectionState::Activated || self.new == ActiveConnectionState::Activated
    }
}

/// Builder carrying the write-once fields of an [`ActiveConnection`].
#[derive(Debug)]
pub struct ActiveConnectionBuilder {
    id: ActiveConnectionId,
    connection: Arc<ConnectionProfile>,
    subject: AuthSubject,
    device: Option<DeviceId>,
    master: Option<DeviceId>,
    specific_object: Option<ObjectPath>,
    parent: Option<ActiveConnectionId>,
}

impl ActiveConnectionBuilder {
    /// Bind to `device`.
    pub fn device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    /// Enslave the device to `master`.
    pub fn master(mut self, master: DeviceId) -> Self {
        self.master = Some(master);
        self
    }

    /// Record the object the activation was requested for.
    pub fn specific_object(mut self, path: impl Into<ObjectPath>) -> Self {
        self.specific_object = Some(path.into());
        self
    }

    /// Mark as a VPN running over the active connection `parent`.
    pub fn vpn(mut self, parent: ActiveConnectionId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Finish building.
    ///
    /// # Errors
    /// Returns `NetworkError::InvalidMaster` when the master is the device itself.
    pub fn build(self) -> Result<ActiveConnection> {
        if let (Some(device), Some(master)) = (self.device, self.master) {
            if device == master {
                return Err(NetworkError::InvalidMaster(format!(
                    "device {device} cannot be its own master"
                )));
            }
        }

        let active = ActiveConnection {
            id: self.id,
            path: active_connection_path(self.id),
            connection: self.connection,
            subject: self.subject,
            device: self.device,
            master: self.master,
            specific_object: self.specific_object,
            parent: self.parent,
            exported: false,
            auth_in_flight: false,
            state: ActiveConnectionState::Unknown,
            reason: ActiveConnectionStateReason::None,
            default4: false,
            default6: false,
            properties: Property::new(ActiveConnectionProperties::default()),
        };
        active.sync_properties();
        Ok(active)
    }
}

/// One activation of a connection profile.
#[derive(Debug)]
pub struct ActiveConnection {
    id: ActiveConnectionId,
    path: ObjectPath,
    connection: Arc<ConnectionProfile>,
    subject: AuthSubject,

    /// Cleared only on entering `Deactivated`.
    device: Option<DeviceId>,

    /// Write-once, never equal to `device`.
    master: Option<DeviceId>,

    specific_object: Option<ObjectPath>,

    /// Base connection of a VPN.
    parent: Option<ActiveConnectionId>,

    exported: bool,
    auth_in_flight: bool,

    state: ActiveConnectionState,
    reason: ActiveConnectionStateReason,

    default4: bool,
    default6: bool,

    properties: Property<ActiveConnectionProperties>,
}

impl ActiveConnection {
    /// Start building active connection `id` of `connection` for `subject`.
    pub fn builder(
        id: ActiveConnectionId,
        connection: Arc<ConnectionProfile>,
        subject: AuthSubject,
    ) -> ActiveConnectionBuilder {
        ActiveConnectionBuilder {
            id,
            connection,
            subject,
            device: None,
            master: None,
            specific_object: None,
            parent: None,
        }
    }

    /// Id.
    pub fn id(&self) -> ActiveConnectionId {
        self.id
    }

    /// Object path, assigned at construction and valid once exported.
    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// The profile being activated.
    pub fn connection(&self) -> &Arc<ConnectionProfile> {
        &self.connection
    }

    /// Who asked for the activation.
    pub fn subject(&self) -> &AuthSubject {
        &self.subject
    }

    /// Bound device.
    pub fn device(&self) -> Option<DeviceId> {
        self.device
    }

    /// Master device.
    pub fn master(&self) -> Option<DeviceId> {
        self.master
    }

    /// Base active connection of a VPN.
    pub fn parent(&self) -> Option<ActiveConnectionId> {
        self.parent
    }

    /// Whether this is a VPN.
    pub fn is_vpn(&self) -> bool {
        self.parent.is_some()
    }

    /// Requested specific object.
    pub fn specific_object(&self) -> Option<&str> {
        self.specific_object.as_deref()
    }

    /// Whether the object has been exported.
    pub fn is_exported(&self) -> bool {
        self.exported
    }

    /// Current state.
    pub fn state(&self) -> ActiveConnectionState {
        self.state
    }

    /// Reason recorded with the current state.
    pub fn state_reason(&self) -> ActiveConnectionStateReason {
        self.reason
    }

    /// Whether this connection owns the default route of `family`.
    pub fn is_default(&self, family: AddressFamily) -> bool {
        match family {
            AddressFamily::Inet => self.default4,
            AddressFamily::Inet6 => self.default6,
        }
    }

    /// Live snapshot cell read by the bus adapter.
    pub fn properties(&self) -> Property<ActiveConnectionProperties> {
        self.properties.clone()
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> ActiveConnectionProperties {
        self.properties.get()
    }

    /// Set the master device after construction.
    ///
    /// # Errors
    /// Returns `NetworkError::WrongState` once exported or when a master is
    /// already set, and `NetworkError::InvalidMaster` when `master` is the
    /// connection's own device.
    pub fn set_master(&mut self, master: DeviceId) -> Result<()> {
        if self.exported || self.master.is_some() {
            return Err(NetworkError::wrong_state(
                "set master of",
                self.describe(),
                if self.exported { "exported" } else { "master set" },
            ));
        }
        if self.device == Some(master) {
            return Err(NetworkError::InvalidMaster(format!(
                "device {master} cannot be its own master"
            )));
        }
        self.master = Some(master);
        self.sync_properties();
        Ok(())
    }

    /// Start an authorization episode.
    ///
    /// The chain always checks network-control, plus the Wi-Fi share
    /// permission when the profile shares its IPv4 connection over Wi-Fi.
    ///
    /// # Errors
    /// Returns `NetworkError::WrongState` while a previous chain is in flight.
    pub fn begin_authorization(&mut self) -> Result<AuthChain> {
        if self.auth_in_flight {
            return Err(NetworkError::wrong_state(
                "authorize",
                self.describe(),
                "authorization pending",
            ));
        }

        let mut chain = AuthChain::new(self.subject.clone());
        chain.add_call(permissions::NETWORK_CONTROL, true);
        if let Some(share) = permissions::wifi_share_permission(&self.connection) {
            chain.add_call(share, true);
        }

        self.auth_in_flight = true;
        debug!(active = self.id, subject = %self.subject, "Authorization started");
        Ok(chain)
    }

    /// Mark the authorization episode as finished.
    pub fn finish_authorization(&mut self) {
        self.auth_in_flight = false;
    }

    /// Whether an authorization chain is in flight.
    pub fn authorization_in_flight(&self) -> bool {
        self.auth_in_flight
    }

    /// Mark the object exported.
    ///
    /// # Errors
    /// Returns `NetworkError::WrongState` when already exported or when
    /// neither a device nor a VPN parent is known.
    pub fn export(&mut self) -> Result<()> {
        if self.exported {
            return Err(NetworkError::wrong_state("export", self.describe(), "exported"));
        }
        if self.device.is_none() && self.parent.is_none() {
            return Err(NetworkError::wrong_state(
                "export",
                self.describe(),
                "without device",
            ));
        }
        self.exported = true;
        Ok(())
    }

    /// Move to `new`.
    ///
    /// Returns `Ok(None)` when nothing changed: the state is already `new` or
    /// the connection is deactivated, which is terminal. Entering
    /// `Deactivated` clears the device and both default flags.
    ///
    /// # Errors
    /// Returns `NetworkError::WrongState` for a backwards transition.
    pub fn set_state(
        &mut self,
        new: ActiveConnectionState,
        reason: ActiveConnectionStateReason,
    ) -> Result<Option<ActiveConnectionStateChange>> {
        let old = self.state;
        if old == ActiveConnectionState::Deactivated || old == new {
            return Ok(None);
        }
        if new < old {
            return Err(NetworkError::wrong_state("move", self.describe(), old));
        }

        self.state = new;
        self.reason = reason;
        if new == ActiveConnectionState::Deactivated {
            self.device = None;
            self.default4 = false;
            self.default6 = false;
        }
        self.sync_properties();

        info!(
            active = self.id,
            connection = %self.connection.id,
            %old,
            %new,
            ?reason,
            "Active connection state changed"
        );
        Ok(Some(ActiveConnectionStateChange { old, new, reason }))
    }

    /// Set the default flag of `family`. Returns whether it changed.
    ///
    /// Uniqueness across connections is enforced by the caller, which clears
    /// the previous holder before setting the new one.
    pub fn set_default(&mut self, family: AddressFamily, default: bool) -> bool {
        let flag = match family {
            AddressFamily::Inet => &mut self.default4,
            AddressFamily::Inet6 => &mut self.default6,
        };
        if *flag == default {
            return false;
        }
        *flag = default;
        self.sync_properties();
        true
    }

    fn describe(&self) -> String {
        format!("active connection {} ({})", self.id, self.connection.id)
    }

    fn sync_properties(&self) {
        self.properties.set(ActiveConnectionProperties {
            path: self.path.clone(),
            id: self.connection.id.clone(),
            uuid: self.connection.uuid.clone(),
            connection_type: self.connection.kind.type_name().to_string(),
            devices: self.device.map(device_path).into_iter().collect(),
            state: self.state,
            state_reason: self.reason,
            default: self.default4,
            default6: self.default6,
            vpn: self.is_vpn(),
            master: self.master.map(device_path),
            specific_object: self.specific_object.clone(),
        });
    }
}
