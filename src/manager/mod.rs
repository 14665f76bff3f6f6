//! The activation core.
//!
//! One task owns every [`Device`] and [`ActiveConnection`] and processes
//! commands, platform events, configuration changes, bus transport events
//! and the results of its own background work strictly one at a time.
//! Long-running work (authorization, link commands, timers) runs in spawned
//! tasks that report back through an internal channel; results of work that
//! a later state change made obsolete are recognized by a per-device token
//! and dropped.

mod activation;
mod audit;
mod authorization;
mod default_route;
mod devices;
mod events;
mod handle;
mod policy;

#[cfg(test)]
mod tests;

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

pub use audit::{AUDIT_TARGET, AuditOp};
pub use default_route::{DefaultCandidate, VPN_ROUTE_METRIC, choose_default, overall_state};
pub use events::ManagerEvent;
use futures::{StreamExt, stream::BoxStream};
pub use handle::{ActivationRequest, ManagerHandle};
use handle::ManagerCommand;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

use crate::{
    active_connection::{ActiveConnection, ActiveConnectionId},
    config::{ConfigChangeFlags, ConfigData},
    config_store::{ConfigChangeEvent, ConfigStore, Subscription},
    core::{NetworkError, Result},
    device::{Device, DeviceId},
    services::{
        auth::{AuthSubject, PolicyBackend},
        bus::{ActiveConnectionProperties, BusError, BusManager},
        common::Property,
        connectivity::{Connectivity, ConnectivityCheck, ConnectivityMonitor},
        platform::{Platform, PlatformError, PlatformEvent},
        session::SessionMonitor,
        settings::SettingsStore,
        vpn::{VpnError, VpnService},
    },
    types::{ActiveConnectionState, AddressFamily, NMState},
};

const EVENT_CAPACITY: usize = 256;

/// Autoconnect attempts per profile before it is skipped.
pub const AUTOCONNECT_RETRIES: u32 = 4;

/// Collaborators handed to the manager at startup.
pub struct ManagerContext {
    /// Configuration snapshots and reload notifications.
    pub config: ConfigStore,
    /// Connection profiles.
    pub settings: Arc<dyn SettingsStore>,
    /// Kernel link layer.
    pub platform: Arc<dyn Platform>,
    /// Permission checks.
    pub policy: Arc<dyn PolicyBackend>,
    /// Session presence for connection ACLs.
    pub sessions: SessionMonitor,
    /// VPN plugins.
    pub vpn: Arc<dyn VpnService>,
    /// Bus connections and exported objects, already started.
    pub bus: BusManager,
    /// Internet reachability check run while a default route exists.
    pub connectivity: Arc<dyn ConnectivityCheck>,
}

/// An operation that runs once its authorization succeeded.
pub(crate) enum PendingAction {
    Deactivate {
        active: ActiveConnectionId,
        subject: AuthSubject,
        reply: oneshot::Sender<Result<()>>,
    },
    DeleteDevice {
        device: DeviceId,
        subject: AuthSubject,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Results of background work.
pub(crate) enum InternalEvent {
    AuthFinished {
        active: ActiveConnectionId,
        result: Result<()>,
    },
    ActionAuthorized {
        action: PendingAction,
        result: Result<()>,
    },
    StageFinished {
        device: DeviceId,
        token: u64,
        result: std::result::Result<(), PlatformError>,
    },
    DeactivationFinished {
        device: DeviceId,
        token: u64,
    },
    FailedCooldown {
        device: DeviceId,
        token: u64,
    },
    LinkDeleted {
        device: DeviceId,
        subject: AuthSubject,
        result: std::result::Result<(), PlatformError>,
        reply: oneshot::Sender<Result<()>>,
    },
    VpnFinished {
        active: ActiveConnectionId,
        result: std::result::Result<(), VpnError>,
    },
}

/// State owned by the manager task.
pub struct Manager {
    settings: Arc<dyn SettingsStore>,
    platform: Arc<dyn Platform>,
    policy: Arc<dyn PolicyBackend>,
    sessions: SessionMonitor,
    vpn: Arc<dyn VpnService>,
    bus: BusManager,
    connectivity: ConnectivityMonitor,
    config: Arc<ConfigData>,

    devices: BTreeMap<DeviceId, Device>,
    active: BTreeMap<ActiveConnectionId, ActiveConnection>,
    next_device_id: DeviceId,
    next_active_id: ActiveConnectionId,

    /// Bumped on every device state change; stale background results carry an old token.
    tokens: HashMap<DeviceId, u64>,

    /// Activations waiting for their device to reach `Disconnected`.
    queued: HashMap<DeviceId, ActiveConnectionId>,

    /// Activation callers waiting for authorization and export.
    pending_replies: HashMap<ActiveConnectionId, oneshot::Sender<Result<ActiveConnectionProperties>>>,

    /// Devices unmanaged through `set_managed(false)`.
    unmanaged_by_user: HashSet<DeviceId>,

    /// Autoconnect retries left per profile uuid.
    retries: HashMap<String, u32>,

    /// Profiles a user deactivated; autoconnect leaves them alone.
    blocked: HashSet<String>,

    /// Explicit default owners set through `set_default`.
    default_overrides: HashMap<AddressFamily, ActiveConnectionId>,

    /// Current default owner per family.
    default_owners: HashMap<AddressFamily, ActiveConnectionId>,

    internal_tx: mpsc::UnboundedSender<InternalEvent>,
    events: broadcast::Sender<ManagerEvent>,
    state: Property<NMState>,
}

impl Manager {
    /// Start the manager task.
    ///
    /// Subscribes to configuration changes, adopts the links the platform
    /// currently reports and runs one policy pass before accepting commands.
    ///
    /// # Errors
    /// Fails when the configuration broadcast is gone or the platform cannot
    /// list links.
    #[instrument(skip_all)]
    pub async fn spawn(ctx: ManagerContext) -> Result<ManagerHandle> {
        let subscription = ctx
            .config
            .subscribe(
                ConfigChangeFlags::IGNORE_CARRIER
                    | ConfigChangeFlags::UNMANAGED_DEVICES
                    | ConfigChangeFlags::NO_AUTO_DEFAULT,
            )
            .await?;
        let connectivity = ConnectivityMonitor::spawn(&ctx.config, ctx.connectivity).await?;
        let connectivity_changes = connectivity.state().watch().boxed();
        let platform_events = ctx.platform.events();
        let links = ctx.platform.links().await?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state = Property::new(NMState::Disconnected);

        let mut manager = Self {
            settings: ctx.settings,
            platform: ctx.platform,
            policy: ctx.policy,
            sessions: ctx.sessions,
            vpn: ctx.vpn,
            bus: ctx.bus,
            connectivity: connectivity.clone(),
            config: ctx.config.get_current(),
            devices: BTreeMap::new(),
            active: BTreeMap::new(),
            next_device_id: 1,
            next_active_id: 1,
            tokens: HashMap::new(),
            queued: HashMap::new(),
            pending_replies: HashMap::new(),
            unmanaged_by_user: HashSet::new(),
            retries: HashMap::new(),
            blocked: HashSet::new(),
            default_overrides: HashMap::new(),
            default_owners: HashMap::new(),
            internal_tx,
            events: events.clone(),
            state: state.clone(),
        };

        info!(links = links.len(), "Starting manager");
        for link in links {
            manager.add_link(link).await;
        }
        manager.finish_pass().await;

        let task = tokio::spawn(manager.run(
            command_rx,
            internal_rx,
            platform_events,
            subscription,
            connectivity_changes,
        ));

        Ok(ManagerHandle {
            commands: command_tx,
            events,
            state,
            connectivity: connectivity.state(),
            config: ctx.config,
            _task: Arc::new(task),
        })
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ManagerCommand>,
        mut internal: mpsc::UnboundedReceiver<InternalEvent>,
        mut platform_events: BoxStream<'static, PlatformEvent>,
        mut config_changes: Subscription,
        mut connectivity_changes: BoxStream<'static, Connectivity>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(ManagerCommand::Shutdown { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                Some(event) = internal.recv() => self.handle_internal(event).await,
                Some(event) = platform_events.next() => self.handle_platform_event(event).await,
                Some(change) = config_changes.recv() => self.handle_config_change(change),
                Some(connectivity) = connectivity_changes.next() => {
                    debug!(?connectivity, "Connectivity changed");
                }
                Some(event) = self.bus.next_transport_event() => {
                    self.bus.handle_transport_event(event).await;
                }
            }

            self.finish_pass().await;
        }

        info!("Manager stopped");
    }

    async fn shutdown(&mut self) {
        info!(
            devices = self.devices.len(),
            active = self.active.len(),
            "Shutting down, leaving connections in place"
        );
        self.bus.shutdown().await;
    }

    async fn handle_command(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::Activate { request, reply } => self.activate(request, reply),

            ManagerCommand::Deactivate {
                active,
                subject,
                reply,
            } => self.request_deactivation(&active, subject, reply),

            ManagerCommand::DeleteDevice {
                device,
                subject,
                reply,
            } => self.request_device_deletion(&device, subject, reply),

            ManagerCommand::SetManaged {
                device,
                managed,
                reply,
            } => {
                let result = self.find_device(&device).map(|id| {
                    if managed {
                        self.unmanaged_by_user.remove(&id);
                    } else {
                        self.unmanaged_by_user.insert(id);
                    }
                    self.evaluate_management(id);
                });
                let _ = reply.send(result);
            }

            ManagerCommand::SetAutoconnect {
                device,
                autoconnect,
                reply,
            } => {
                let result = self.find_device(&device).map(|id| {
                    if let Some(device) = self.devices.get_mut(&id) {
                        device.set_autoconnect(autoconnect);
                    }
                });
                let _ = reply.send(result);
            }

            ManagerCommand::SetDefault {
                active,
                family,
                reply,
            } => {
                let result = self
                    .find_active(&active)
                    .and_then(|id| self.override_default(id, family));
                let _ = reply.send(result);
            }

            ManagerCommand::SubjectForSender { sender, reply } => {
                let result = match self.bus.caller_info(&sender).await {
                    Ok(caller) => Ok(AuthSubject::new_from_caller(&caller)),
                    Err(BusError::Disconnected) => Err(NetworkError::BusDisconnected),
                    Err(err) => Err(err.into()),
                };
                let _ = reply.send(result);
            }

            ManagerCommand::Devices { reply } => {
                let _ = reply.send(self.devices.values().map(Device::snapshot).collect());
            }

            ManagerCommand::Device { device, reply } => {
                let result = self
                    .find_device(&device)
                    .and_then(|id| self.device_ref(id).map(Device::snapshot));
                let _ = reply.send(result);
            }

            ManagerCommand::ActiveConnections { reply } => {
                let live = self
                    .active
                    .values()
                    .filter(|active| active.is_exported())
                    .map(ActiveConnection::snapshot)
                    .collect();
                let _ = reply.send(live);
            }

            ManagerCommand::ActiveConnection { active, reply } => {
                let result = self
                    .find_active(&active)
                    .and_then(|id| self.active_ref(id).map(ActiveConnection::snapshot));
                let _ = reply.send(result);
            }

            ManagerCommand::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    async fn handle_internal(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::AuthFinished { active, result } => {
                self.authorization_finished(active, result).await;
            }

            InternalEvent::ActionAuthorized { action, result } => {
                self.action_authorized(action, result);
            }

            InternalEvent::StageFinished {
                device,
                token,
                result,
            } => {
                if self.token(device) != token {
                    debug!(device, "Dropping stale stage result");
                    return;
                }
                self.stage_finished(device, result);
            }

            InternalEvent::DeactivationFinished { device, token } => {
                if self.token(device) == token {
                    self.deactivation_finished(device);
                }
            }

            InternalEvent::FailedCooldown { device, token } => {
                if self.token(device) == token {
                    self.cooldown_elapsed(device);
                }
            }

            InternalEvent::LinkDeleted {
                device,
                subject,
                result,
                reply,
            } => {
                let object = self
                    .devices
                    .get(&device)
                    .map_or_else(|| device.to_string(), |d| d.iface().to_string());
                let result = result.map_err(NetworkError::from);
                audit::audit(AuditOp::DeleteDevice, &object, &subject, &result);
                match result {
                    Ok(()) => self.remove_device(device).await,
                    Err(ref err) => warn!(device, error = %err, "Failed to delete link"),
                }
                let _ = reply.send(result);
            }

            InternalEvent::VpnFinished { active, result } => self.vpn_finished(active, result),
        }
    }

    fn handle_config_change(&mut self, change: ConfigChangeEvent) {
        debug!(flags = ?change.flags, "Applying configuration change");
        self.config = change.new.clone();

        if change
            .flags
            .intersects(ConfigChangeFlags::IGNORE_CARRIER | ConfigChangeFlags::UNMANAGED_DEVICES)
        {
            let ids: Vec<DeviceId> = self.devices.keys().copied().collect();
            for id in ids {
                self.evaluate_management(id);
            }
        }
    }

    /// Policy work run after every processed input.
    async fn finish_pass(&mut self) {
        self.update_defaults();
        self.autoconnect();
        self.update_state();
        self.reap_deactivated().await;
    }

    fn emit(&self, event: ManagerEvent) {
        let _ = self.events.send(event);
    }

    fn token(&self, device: DeviceId) -> u64 {
        self.tokens.get(&device).copied().unwrap_or_default()
    }

    fn send_internal(tx: &mpsc::UnboundedSender<InternalEvent>, event: InternalEvent) {
        if tx.send(event).is_err() {
            debug!("Manager gone, dropping background result");
        }
    }

    fn device_ref(&self, id: DeviceId) -> Result<&Device> {
        self.devices
            .get(&id)
            .ok_or_else(|| NetworkError::DeviceNotFound(id.to_string()))
    }

    fn active_ref(&self, id: ActiveConnectionId) -> Result<&ActiveConnection> {
        self.active
            .get(&id)
            .ok_or_else(|| NetworkError::ActiveConnectionNotFound(id.to_string()))
    }

    /// Look a device up by object path or interface name.
    fn find_device(&self, key: &str) -> Result<DeviceId> {
        self.devices
            .values()
            .find(|device| device.path() == key || device.iface() == key)
            .map(Device::id)
            .ok_or_else(|| NetworkError::DeviceNotFound(key.to_string()))
    }

    /// Look an active connection up by object path, profile uuid or name,
    /// or numeric id. Live connections win over deactivated ones of the
    /// same profile.
    fn find_active(&self, key: &str) -> Result<ActiveConnectionId> {
        let by_path = self.active.values().find(|active| active.path() == key);
        let by_profile = || {
            let matching: Vec<&ActiveConnection> = self
                .active
                .values()
                .filter(|active| {
                    let profile = active.connection();
                    profile.uuid == key || profile.id == key
                })
                .collect();
            matching
                .iter()
                .find(|active| active.state() != ActiveConnectionState::Deactivated)
                .or(matching.first())
                .map(|active| active.id())
        };
        let by_id = || {
            key.parse::<ActiveConnectionId>()
                .ok()
                .filter(|id| self.active.contains_key(id))
        };

        by_path
            .map(ActiveConnection::id)
            .or_else(by_profile)
            .or_else(by_id)
            .ok_or_else(|| NetworkError::ActiveConnectionNotFound(key.to_string()))
    }
}
