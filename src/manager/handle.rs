use std::sync::Arc;

use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};

use super::ManagerEvent;
use crate::{
    config::ConfigChangeFlags,
    config_store::ConfigStore,
    core::{NetworkError, Result},
    services::{
        auth::AuthSubject,
        bus::{ActiveConnectionProperties, DeviceProperties},
        common::{ObjectPath, Property},
        connectivity::Connectivity,
    },
    types::{AddressFamily, NMState},
};

type Reply<T> = oneshot::Sender<Result<T>>;

/// Parameters of an activation request.
#[derive(Debug, Clone)]
pub struct ActivationRequest {
    /// Profile id or uuid.
    pub connection: String,
    /// Device path or interface name; the first compatible device when `None`.
    pub device: Option<String>,
    /// Object the activation is aimed at. For VPNs, the base active connection.
    pub specific_object: Option<ObjectPath>,
    /// Who is asking.
    pub subject: AuthSubject,
}

/// Commands processed by the manager task.
pub(crate) enum ManagerCommand {
    Activate {
        request: ActivationRequest,
        reply: Reply<ActiveConnectionProperties>,
    },
    Deactivate {
        active: String,
        subject: AuthSubject,
        reply: Reply<()>,
    },
    DeleteDevice {
        device: String,
        subject: AuthSubject,
        reply: Reply<()>,
    },
    SetManaged {
        device: String,
        managed: bool,
        reply: Reply<()>,
    },
    SetAutoconnect {
        device: String,
        autoconnect: bool,
        reply: Reply<()>,
    },
    SetDefault {
        active: String,
        family: AddressFamily,
        reply: Reply<()>,
    },
    SubjectForSender {
        sender: String,
        reply: Reply<AuthSubject>,
    },
    Devices {
        reply: oneshot::Sender<Vec<DeviceProperties>>,
    },
    Device {
        device: String,
        reply: Reply<DeviceProperties>,
    },
    ActiveConnections {
        reply: oneshot::Sender<Vec<ActiveConnectionProperties>>,
    },
    ActiveConnection {
        active: String,
        reply: Reply<ActiveConnectionProperties>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to the manager task.
///
/// Every method is a message to the task; once the task is gone they fail
/// with `NetworkError::ServiceUnavailable`.
#[derive(Clone)]
pub struct ManagerHandle {
    pub(super) commands: mpsc::UnboundedSender<ManagerCommand>,
    pub(super) events: broadcast::Sender<ManagerEvent>,
    pub(super) state: Property<NMState>,
    pub(super) connectivity: Property<Connectivity>,
    pub(super) config: ConfigStore,
    pub(super) _task: Arc<JoinHandle<()>>,
}

impl ManagerHandle {
    /// Activate `connection` on `device` for `subject`.
    ///
    /// Resolves once authorization finished and the active connection is
    /// exported.
    ///
    /// # Errors
    /// Lookup, compatibility and state errors are returned before
    /// authorization; `NetworkError::AuthorizationDenied` after it.
    pub async fn activate(
        &self,
        connection: &str,
        device: Option<&str>,
        subject: AuthSubject,
    ) -> Result<ActiveConnectionProperties> {
        self.activate_with(ActivationRequest {
            connection: connection.to_string(),
            device: device.map(str::to_string),
            specific_object: None,
            subject,
        })
        .await
    }

    /// Activate with every request parameter spelled out.
    ///
    /// # Errors
    /// See [`activate`](Self::activate).
    pub async fn activate_with(
        &self,
        request: ActivationRequest,
    ) -> Result<ActiveConnectionProperties> {
        self.request(|reply| ManagerCommand::Activate { request, reply })
            .await?
    }

    /// Deactivate an active connection by path, profile uuid or name, or id.
    ///
    /// # Errors
    /// Returns `NetworkError::ActiveConnectionNotFound` or
    /// `NetworkError::AuthorizationDenied`.
    pub async fn deactivate(&self, active: &str, subject: AuthSubject) -> Result<()> {
        let active = active.to_string();
        self.request(|reply| ManagerCommand::Deactivate {
            active,
            subject,
            reply,
        })
        .await?
    }

    /// Delete a software device.
    ///
    /// # Errors
    /// Returns `NetworkError::NotSoftware` for hardware devices, without any
    /// state change.
    pub async fn delete_device(&self, device: &str, subject: AuthSubject) -> Result<()> {
        let device = device.to_string();
        self.request(|reply| ManagerCommand::DeleteDevice {
            device,
            subject,
            reply,
        })
        .await?
    }

    /// Manage or unmanage a device.
    ///
    /// # Errors
    /// Returns `NetworkError::DeviceNotFound`.
    pub async fn set_managed(&self, device: &str, managed: bool) -> Result<()> {
        let device = device.to_string();
        self.request(|reply| ManagerCommand::SetManaged {
            device,
            managed,
            reply,
        })
        .await?
    }

    /// Allow or forbid autoconnect on a device.
    ///
    /// # Errors
    /// Returns `NetworkError::DeviceNotFound`.
    pub async fn set_autoconnect(&self, device: &str, autoconnect: bool) -> Result<()> {
        let device = device.to_string();
        self.request(|reply| ManagerCommand::SetAutoconnect {
            device,
            autoconnect,
            reply,
        })
        .await?
    }

    /// Make an activated connection the default route owner of `family`.
    ///
    /// # Errors
    /// Returns `NetworkError::WrongState` unless the connection is activated
    /// and may own a default for `family`.
    pub async fn set_default(&self, active: &str, family: AddressFamily) -> Result<()> {
        let active = active.to_string();
        self.request(|reply| ManagerCommand::SetDefault {
            active,
            family,
            reply,
        })
        .await?
    }

    /// Resolve the subject behind a bus sender.
    ///
    /// # Errors
    /// Returns `NetworkError::BusDisconnected` while the system bus is gone.
    pub async fn subject_for_sender(&self, sender: &str) -> Result<AuthSubject> {
        let sender = sender.to_string();
        self.request(|reply| ManagerCommand::SubjectForSender { sender, reply })
            .await?
    }

    /// Snapshots of all devices, ordered by id.
    ///
    /// # Errors
    /// Returns `NetworkError::ServiceUnavailable` once the manager stopped.
    pub async fn devices(&self) -> Result<Vec<DeviceProperties>> {
        self.request(|reply| ManagerCommand::Devices { reply }).await
    }

    /// Snapshot of one device by path or interface name.
    ///
    /// # Errors
    /// Returns `NetworkError::DeviceNotFound`.
    pub async fn device(&self, device: &str) -> Result<DeviceProperties> {
        let device = device.to_string();
        self.request(|reply| ManagerCommand::Device { device, reply })
            .await?
    }

    /// Snapshots of all live active connections.
    ///
    /// # Errors
    /// Returns `NetworkError::ServiceUnavailable` once the manager stopped.
    pub async fn active_connections(&self) -> Result<Vec<ActiveConnectionProperties>> {
        self.request(|reply| ManagerCommand::ActiveConnections { reply })
            .await
    }

    /// Snapshot of one active connection by path, profile uuid or name, or id.
    ///
    /// # Errors
    /// Returns `NetworkError::ActiveConnectionNotFound`.
    pub async fn active_connection(&self, active: &str) -> Result<ActiveConnectionProperties> {
        let active = active.to_string();
        self.request(|reply| ManagerCommand::ActiveConnection { active, reply })
            .await?
    }

    /// Subscribe to manager events.
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events.subscribe()
    }

    /// Overall networking state.
    pub fn state(&self) -> Property<NMState> {
        self.state.clone()
    }

    /// Result of the latest connectivity check.
    pub fn connectivity(&self) -> Property<Connectivity> {
        self.connectivity.clone()
    }

    /// Re-read the configuration file. The manager applies the resulting
    /// changes asynchronously.
    ///
    /// # Errors
    /// Propagates configuration errors; the current snapshot stays in place.
    pub async fn reload_config(&self) -> Result<ConfigChangeFlags> {
        Ok(self.config.reload().await?)
    }

    /// Stop the manager, unregistering every bus object. Active connections
    /// are left as they are.
    ///
    /// # Errors
    /// Returns `NetworkError::ServiceUnavailable` if it already stopped.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| ManagerCommand::Shutdown { reply })
            .await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> ManagerCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .map_err(|_| NetworkError::ServiceUnavailable("manager"))?;
        rx.await
            .map_err(|_| NetworkError::ServiceUnavailable("manager"))
    }
}
