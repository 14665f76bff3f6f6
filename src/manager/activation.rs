use std::{future::Future, sync::Arc};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{
    AUTOCONNECT_RETRIES, ActivationRequest, InternalEvent, Manager, ManagerEvent, PendingAction,
    audit::{AuditOp, audit},
    authorization::authorize,
};
use crate::{
    active_connection::{ActiveConnection, ActiveConnectionId},
    core::{NetworkError, Result},
    device::{Device, DeviceId},
    services::{
        auth::{AuthChain, AuthSubject, permissions},
        bus::{ActiveConnectionProperties, ExportedObject},
        common::{ACTIVE_CONNECTION_PATH_PREFIX, ObjectPath},
        platform::{Platform, PlatformError},
        settings::ConnectionProfile,
        vpn::VpnError,
    },
    types::{
        ActiveConnectionState, ActiveConnectionStateReason, AddressFamily, DeviceState,
        DeviceStateReason,
    },
};

type ActivationReply = oneshot::Sender<Result<ActiveConnectionProperties>>;

/// What the current pipeline stage of a device needs next.
enum StageStep {
    /// Move on to the next stage right away.
    Advance,
    /// Background work or another device has to report first.
    Pending,
}

/// Readiness of a port's master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MasterStatus {
    Ready,
    Waiting,
    Failed,
}

impl Manager {
    pub(super) fn activate(&mut self, request: ActivationRequest, reply: ActivationReply) {
        match self.new_activation(&request) {
            Ok(active) => self.start_authorization(active, Some(reply)),
            Err(err) => {
                debug!(connection = %request.connection, error = %err, "Activation refused");
                let _ = reply.send(Err(err));
            }
        }
    }

    fn new_activation(&mut self, request: &ActivationRequest) -> Result<ActiveConnection> {
        let profile = self
            .settings
            .connection(&request.connection)
            .ok_or_else(|| NetworkError::ConnectionNotFound(request.connection.clone()))?;

        if profile.is_vpn() {
            return self.new_vpn_activation(profile, request);
        }

        let device = match &request.device {
            Some(key) => self.find_device(key)?,
            None => self
                .devices
                .values()
                .filter(|d| profile.is_compatible_with(d.device_type(), d.iface()))
                .min_by_key(|d| (d.state() != DeviceState::Disconnected, d.id()))
                .map(Device::id)
                .ok_or_else(|| {
                    NetworkError::DeviceNotFound(format!("compatible with '{}'", profile.id))
                })?,
        };

        if request.subject.user_requested() {
            self.blocked.remove(&profile.uuid);
        }
        let id = self.allocate_active_id();
        self.build_device_activation(
            id,
            profile,
            device,
            request.subject.clone(),
            request.specific_object.clone(),
        )
    }

    /// Build an activation of `profile` on `device` after checking that the
    /// two fit and the device can take an activation at all.
    pub(super) fn build_device_activation(
        &self,
        id: ActiveConnectionId,
        profile: Arc<ConnectionProfile>,
        device: DeviceId,
        subject: AuthSubject,
        specific_object: Option<ObjectPath>,
    ) -> Result<ActiveConnection> {
        let target = self.device_ref(device)?;
        if !profile.is_compatible_with(target.device_type(), target.iface()) {
            return Err(NetworkError::ConnectionIncompatible {
                connection: profile.id.clone(),
                device: target.iface().to_string(),
            });
        }
        Self::check_activatable(target)?;

        let master = match &profile.master {
            Some(name) => {
                let master = self.find_device(name)?;
                if !self.device_ref(master)?.device_type().is_master_type() {
                    return Err(NetworkError::InvalidMaster(format!(
                        "'{name}' cannot control ports"
                    )));
                }
                Some(master)
            }
            None => None,
        };

        let mut builder = ActiveConnection::builder(id, profile, subject).device(device);
        if let Some(master) = master {
            builder = builder.master(master);
        }
        if let Some(path) = specific_object {
            builder = builder.specific_object(path);
        }
        builder.build()
    }

    fn new_vpn_activation(
        &mut self,
        profile: Arc<ConnectionProfile>,
        request: &ActivationRequest,
    ) -> Result<ActiveConnection> {
        let base = match &request.specific_object {
            Some(path) => self.find_active(path)?,
            None => self
                .active
                .values()
                .find(|active| active.is_default(AddressFamily::Inet))
                .map(ActiveConnection::id)
                .ok_or_else(|| NetworkError::ActiveConnectionNotFound("default".to_string()))?,
        };
        self.check_vpn_base(base)?;

        let base_path = self.active_ref(base)?.path().clone();
        let id = self.allocate_active_id();
        ActiveConnection::builder(id, profile, request.subject.clone())
            .vpn(base)
            .specific_object(base_path)
            .build()
    }

    fn check_activatable(device: &Device) -> Result<()> {
        if device.state() < DeviceState::Disconnected {
            return Err(NetworkError::wrong_state(
                "activate a connection on",
                device.iface(),
                device.state(),
            ));
        }
        Ok(())
    }

    fn check_vpn_base(&self, base: ActiveConnectionId) -> Result<()> {
        let base = self.active_ref(base)?;
        if base.state() != ActiveConnectionState::Activated {
            return Err(NetworkError::wrong_state(
                "start a VPN over",
                base.path().clone(),
                base.state(),
            ));
        }
        Ok(())
    }

    fn allocate_active_id(&mut self) -> ActiveConnectionId {
        let id = self.next_active_id;
        self.next_active_id += 1;
        id
    }

    /// Register `active` and run its authorization in the background.
    pub(super) fn start_authorization(
        &mut self,
        mut active: ActiveConnection,
        reply: Option<ActivationReply>,
    ) {
        let chain = match active.begin_authorization() {
            Ok(chain) => chain,
            Err(err) => {
                if let Some(reply) = reply {
                    let _ = reply.send(Err(err));
                }
                return;
            }
        };

        let id = active.id();
        let profile = active.connection().clone();
        self.active.insert(id, active);
        if let Some(reply) = reply {
            self.pending_replies.insert(id, reply);
        }

        let policy = self.policy.clone();
        let sessions = self.sessions.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = authorize(chain, Some(profile), policy, sessions).await;
            Self::send_internal(&tx, InternalEvent::AuthFinished { active: id, result });
        });
    }

    pub(super) fn spawn_action_authorization(&self, chain: AuthChain, action: PendingAction) {
        let policy = self.policy.clone();
        let sessions = self.sessions.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = authorize(chain, None, policy, sessions).await;
            Self::send_internal(&tx, InternalEvent::ActionAuthorized { action, result });
        });
    }

    pub(super) async fn authorization_finished(
        &mut self,
        id: ActiveConnectionId,
        result: Result<()>,
    ) {
        let reply = self.pending_replies.remove(&id);
        let Some(active) = self.active.get_mut(&id) else {
            debug!(active = id, "Authorization finished for a discarded activation");
            if let Some(reply) = reply {
                let _ = reply.send(Err(NetworkError::ActiveConnectionNotFound(id.to_string())));
            }
            return;
        };
        active.finish_authorization();
        let subject = active.subject().clone();
        let object = active.connection().id.clone();

        let outcome = result.and_then(|()| self.check_still_activatable(id));
        audit(AuditOp::Activate, &object, &subject, &outcome);
        if let Err(err) = outcome {
            info!(active = id, error = %err, "Activation not authorized");
            self.active.remove(&id);
            if let Some(reply) = reply {
                let _ = reply.send(Err(err));
            }
            return;
        }

        let exported = self.active.get_mut(&id).map(|active| {
            active
                .export()
                .map(|()| (active.path().clone(), active.properties()))
        });
        let (path, properties) = match exported {
            Some(Ok(exported)) => exported,
            Some(Err(err)) => {
                self.active.remove(&id);
                if let Some(reply) = reply {
                    let _ = reply.send(Err(err));
                }
                return;
            }
            None => return,
        };

        self.bus
            .register_object(path.clone(), ExportedObject::ActiveConnection(properties))
            .await;
        self.emit(ManagerEvent::ActiveConnectionAdded { path });

        let (device, is_vpn) = match self.active.get(&id) {
            Some(active) => (active.device(), active.is_vpn()),
            None => return,
        };
        if is_vpn {
            self.start_vpn(id);
        } else if let Some(device) = device {
            self.attach_or_queue(id, device);
        }

        if let Some(reply) = reply {
            let _ = reply.send(self.active_ref(id).map(ActiveConnection::snapshot));
        }
    }

    /// Re-check after authorization what may have changed while it ran.
    fn check_still_activatable(&self, id: ActiveConnectionId) -> Result<()> {
        let active = self.active_ref(id)?;
        if active.state() == ActiveConnectionState::Deactivated {
            return Err(NetworkError::wrong_state(
                "activate",
                active.path().clone(),
                active.state(),
            ));
        }
        if let Some(base) = active.parent() {
            return self.check_vpn_base(base);
        }
        if let Some(device) = active.device() {
            Self::check_activatable(self.device_ref(device)?)?;
        }
        if let Some(master) = active.master() {
            self.device_ref(master)?;
        }
        Ok(())
    }

    pub(super) fn action_authorized(&mut self, action: PendingAction, result: Result<()>) {
        match action {
            PendingAction::Deactivate {
                active,
                subject,
                reply,
            } => {
                let object = self
                    .active
                    .get(&active)
                    .map_or_else(|| active.to_string(), |a| a.path().clone());
                let result = result.map(|()| self.user_deactivate(active));
                audit(AuditOp::Deactivate, &object, &subject, &result);
                let _ = reply.send(result);
            }
            PendingAction::DeleteDevice {
                device,
                subject,
                reply,
            } => match result {
                Ok(()) => self.delete_device(device, subject, reply),
                Err(err) => {
                    let result = Err(err);
                    let object = self
                        .devices
                        .get(&device)
                        .map_or_else(|| device.to_string(), |d| d.iface().to_string());
                    audit(AuditOp::DeleteDevice, &object, &subject, &result);
                    let _ = reply.send(result);
                }
            },
        }
    }

    /// Attach right away when the device is idle; otherwise queue behind the
    /// current activation, which is told to make way.
    fn attach_or_queue(&mut self, id: ActiveConnectionId, device: DeviceId) {
        let Some((state, current)) = self
            .devices
            .get(&device)
            .map(|d| (d.state(), d.active_connection()))
        else {
            self.set_active_state(
                id,
                ActiveConnectionState::Deactivated,
                ActiveConnectionStateReason::DeviceRemoved,
            );
            return;
        };

        if state == DeviceState::Disconnected && current.is_none() {
            self.attach(id, device);
            return;
        }

        debug!(active = id, device, %state, "Queueing activation");
        self.set_active_state(
            id,
            ActiveConnectionState::Activating,
            ActiveConnectionStateReason::None,
        );
        if let Some(previous) = self.queued.insert(device, id) {
            self.set_active_state(
                previous,
                ActiveConnectionState::Deactivated,
                ActiveConnectionStateReason::DeviceDisconnected,
            );
        }
        if current.is_some() && state != DeviceState::Deactivating {
            self.begin_device_deactivation(device, DeviceStateReason::NewActivation);
        }
    }

    pub(super) fn attach(&mut self, id: ActiveConnectionId, device: DeviceId) {
        let attached = match self.devices.get_mut(&device) {
            Some(target) => target.attach(id),
            None => Err(NetworkError::DeviceNotFound(device.to_string())),
        };

        match attached {
            Ok(change) => {
                self.after_device_change(device, change);
                self.set_active_state(
                    id,
                    ActiveConnectionState::Activating,
                    ActiveConnectionStateReason::None,
                );
                self.drive(device);
            }
            Err(err) => {
                warn!(active = id, device, error = %err, "Failed to attach activation");
                self.set_active_state(
                    id,
                    ActiveConnectionState::Deactivated,
                    ActiveConnectionStateReason::DeviceDisconnected,
                );
            }
        }
    }

    /// Run pipeline stages of `device` until one has to wait.
    pub(super) fn drive(&mut self, device: DeviceId) {
        while let StageStep::Advance = self.run_stage(device) {
            if !self.advance(device) {
                return;
            }
        }
    }

    fn run_stage(&mut self, device: DeviceId) -> StageStep {
        let Some(target) = self.devices.get(&device) else {
            return StageStep::Pending;
        };
        let Some(active) = target
            .active_connection()
            .and_then(|id| self.active.get(&id))
        else {
            return StageStep::Pending;
        };

        let state = target.state();
        let iface = target.iface().to_string();
        let profile = active.connection().clone();
        let master = active.master();

        match state {
            DeviceState::Prepare => {
                self.spawn_stage(device, move |platform| async move {
                    platform.link_set_up(&iface).await
                });
                StageStep::Pending
            }

            DeviceState::Config => {
                let Some(master) = master else {
                    return StageStep::Advance;
                };
                match self.devices.get(&master).map(|m| m.iface().to_string()) {
                    Some(master_iface) => {
                        self.spawn_stage(device, move |platform| async move {
                            platform.link_enslave(&iface, &master_iface).await
                        });
                    }
                    None => self.fail_device(device, DeviceStateReason::DependencyFailed, true),
                }
                StageStep::Pending
            }

            DeviceState::IpConfig => {
                if let Some(master) = master {
                    return match self.master_status(master) {
                        MasterStatus::Ready => StageStep::Advance,
                        MasterStatus::Waiting => {
                            debug!(device, master, "Port waiting for its master");
                            StageStep::Pending
                        }
                        MasterStatus::Failed => {
                            self.fail_device(device, DeviceStateReason::DependencyFailed, true);
                            StageStep::Pending
                        }
                    };
                }
                if !profile.ipv4.method.is_enabled() && !profile.ipv6.method.is_enabled() {
                    return StageStep::Advance;
                }
                self.spawn_stage(device, move |platform| async move {
                    platform
                        .configure_ip(&iface, &profile.ipv4, &profile.ipv6)
                        .await
                });
                StageStep::Pending
            }

            DeviceState::IpCheck | DeviceState::Secondaries => StageStep::Advance,

            _ => StageStep::Pending,
        }
    }

    /// Enter the next pipeline stage. Returns whether there is more to run.
    fn advance(&mut self, device: DeviceId) -> bool {
        let Some(next) = self
            .devices
            .get(&device)
            .and_then(|d| d.state().next_stage())
        else {
            return false;
        };

        if let Err(err) = self.set_device_state(device, next, DeviceStateReason::None) {
            warn!(device, error = %err, "Failed to advance activation");
            return false;
        }

        if next != DeviceState::Activated {
            return true;
        }

        let active = self.devices.get(&device).and_then(Device::active_connection);
        if let Some(active) = active {
            self.set_active_state(
                active,
                ActiveConnectionState::Activated,
                ActiveConnectionStateReason::None,
            );
            if let Some(uuid) = self.active.get(&active).map(|a| a.connection().uuid.clone()) {
                self.retries.remove(&uuid);
            }
        }
        false
    }

    fn spawn_stage<F, Fut>(&self, device: DeviceId, work: F)
    where
        F: FnOnce(Arc<dyn Platform>) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<(), PlatformError>> + Send + 'static,
    {
        let token = self.token(device);
        let platform = self.platform.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = work(platform).await;
            Self::send_internal(
                &tx,
                InternalEvent::StageFinished {
                    device,
                    token,
                    result,
                },
            );
        });
    }

    pub(super) fn stage_finished(
        &mut self,
        device: DeviceId,
        result: std::result::Result<(), PlatformError>,
    ) {
        let err = match result {
            Ok(()) => {
                if self.advance(device) {
                    self.drive(device);
                }
                return;
            }
            Err(err) => err,
        };

        let Some(target) = self.devices.get(&device) else {
            return;
        };
        let reason = match target.state() {
            DeviceState::Prepare | DeviceState::Config => DeviceStateReason::ConfigFailed,
            _ => DeviceStateReason::IpConfigUnavailable,
        };
        let failure = NetworkError::PipelineFailure {
            device: target.iface().to_string(),
            reason,
        };
        warn!(error = %failure, details = %err, "Activation stage failed");

        let uuid = target
            .active_connection()
            .and_then(|id| self.active.get(&id))
            .map(|active| active.connection().uuid.clone());
        if let Some(uuid) = uuid {
            let left = self.retries.entry(uuid).or_insert(AUTOCONNECT_RETRIES);
            *left = left.saturating_sub(1);
        }

        self.fail_device(device, reason, true);
    }

    /// Fail the activation on `device`. The device enters `Failed`, which
    /// deactivates its active connection in the same step, and returns to
    /// `Disconnected` after the configured cool-down or right away.
    pub(super) fn fail_device(
        &mut self,
        device: DeviceId,
        reason: DeviceStateReason,
        cooldown: bool,
    ) {
        let holds = self
            .devices
            .get(&device)
            .is_some_and(|d| d.state().may_hold_active_connection());
        if !holds {
            return;
        }
        if let Err(err) = self.set_device_state(device, DeviceState::Failed, reason) {
            warn!(device, error = %err, "Failed to fail device");
            return;
        }

        if !cooldown {
            let _ = self.set_device_state(device, DeviceState::Disconnected, reason);
            return;
        }

        let token = self.token(device);
        let delay = self.config.failed_cooldown();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            Self::send_internal(&tx, InternalEvent::FailedCooldown { device, token });
        });
    }

    /// A device let go of `active`: finish it off.
    pub(super) fn release_active(&mut self, active: ActiveConnectionId, reason: DeviceStateReason) {
        let reason = ActiveConnectionStateReason::from_device_reason(reason);
        self.set_active_state(active, ActiveConnectionState::Deactivating, reason);
        self.set_active_state(active, ActiveConnectionState::Deactivated, reason);
    }

    fn master_status(&self, master: DeviceId) -> MasterStatus {
        match self.devices.get(&master).map(Device::state) {
            None
            | Some(DeviceState::Unmanaged | DeviceState::Failed | DeviceState::Deactivating) => {
                MasterStatus::Failed
            }
            Some(state) if state >= DeviceState::IpConfig && state <= DeviceState::Activated => {
                MasterStatus::Ready
            }
            Some(_) => MasterStatus::Waiting,
        }
    }

    /// React to a state change of `master` on every port attached to it.
    pub(super) fn propagate_to_ports(&mut self, master: DeviceId) {
        let ports: Vec<(ActiveConnectionId, DeviceId)> = self
            .active
            .values()
            .filter(|a| {
                a.master() == Some(master) && a.state() < ActiveConnectionState::Deactivating
            })
            .filter_map(|a| a.device().map(|device| (a.id(), device)))
            .collect();
        if ports.is_empty() {
            return;
        }

        let status = self.master_status(master);
        for (active, port) in ports {
            let Some((state, bound)) = self
                .devices
                .get(&port)
                .map(|d| (d.state(), d.active_connection()))
            else {
                continue;
            };
            if bound != Some(active) {
                continue;
            }

            match status {
                MasterStatus::Failed => {
                    info!(port, master, "Master went away, failing port");
                    self.fail_device(port, DeviceStateReason::DependencyFailed, true);
                }
                MasterStatus::Ready if state == DeviceState::IpConfig => self.drive(port),
                _ => {}
            }
        }
    }

    /// Move an active connection and apply the consequences: the event is
    /// published, the profile timestamp refreshed around `Activated`, and
    /// VPNs running over it are stopped once it goes down.
    pub(super) fn set_active_state(
        &mut self,
        id: ActiveConnectionId,
        new: ActiveConnectionState,
        reason: ActiveConnectionStateReason,
    ) {
        let Some(active) = self.active.get_mut(&id) else {
            return;
        };
        let change = match active.set_state(new, reason) {
            Ok(Some(change)) => change,
            Ok(None) => return,
            Err(err) => {
                warn!(active = id, error = %err, "Rejected active connection transition");
                return;
            }
        };

        let path = active.path().clone();
        let uuid = active.connection().uuid.clone();
        if active.is_exported() {
            self.emit(ManagerEvent::ActiveConnectionStateChanged {
                path,
                state: new,
                reason,
            });
        }
        if change.touches_activated() {
            self.settings.update_timestamp(&uuid, chrono::Utc::now());
        }

        if new >= ActiveConnectionState::Deactivating {
            self.queued.retain(|_, queued| *queued != id);
            let children: Vec<ActiveConnectionId> = self
                .active
                .values()
                .filter(|c| {
                    c.parent() == Some(id) && c.state() < ActiveConnectionState::Deactivating
                })
                .map(ActiveConnection::id)
                .collect();
            for child in children {
                self.stop_vpn(child, ActiveConnectionStateReason::DependencyFailed);
            }
        }
    }

    pub(super) fn request_deactivation(
        &mut self,
        key: &str,
        subject: AuthSubject,
        reply: oneshot::Sender<Result<()>>,
    ) {
        let id = match self.find_active(key) {
            Ok(id) => id,
            Err(_) if self.was_reaped(key) => {
                let _ = reply.send(Ok(()));
                return;
            }
            Err(err) => {
                let _ = reply.send(Err(err));
                return;
            }
        };
        if self
            .active
            .get(&id)
            .is_some_and(|a| a.state() == ActiveConnectionState::Deactivated)
        {
            let _ = reply.send(Ok(()));
            return;
        }

        let mut chain = AuthChain::new(subject.clone());
        chain.add_call(permissions::NETWORK_CONTROL, true);
        self.spawn_action_authorization(
            chain,
            PendingAction::Deactivate {
                active: id,
                subject,
                reply,
            },
        );
    }

    /// An active connection path this manager handed out whose object is
    /// already gone. Only deactivated connections leave the registry.
    fn was_reaped(&self, key: &str) -> bool {
        key.strip_prefix(ACTIVE_CONNECTION_PATH_PREFIX)
            .and_then(|rest| rest.strip_prefix('/'))
            .and_then(|id| id.parse::<ActiveConnectionId>().ok())
            .is_some_and(|id| id < self.next_active_id && !self.active.contains_key(&id))
    }

    fn user_deactivate(&mut self, id: ActiveConnectionId) {
        let Some(active) = self.active.get(&id) else {
            return;
        };
        if active.state() == ActiveConnectionState::Deactivated {
            return;
        }
        let uuid = active.connection().uuid.clone();
        info!(active = id, connection = %active.connection().id, "Deactivation requested");
        self.blocked.insert(uuid);
        self.deactivate_active(
            id,
            ActiveConnectionStateReason::UserDisconnected,
            DeviceStateReason::UserRequested,
        );
    }

    /// Take an active connection down through whatever path its progress
    /// requires.
    pub(super) fn deactivate_active(
        &mut self,
        id: ActiveConnectionId,
        reason: ActiveConnectionStateReason,
        device_reason: DeviceStateReason,
    ) {
        let Some(active) = self.active.get(&id) else {
            return;
        };
        if active.is_vpn() {
            self.stop_vpn(id, reason);
            return;
        }

        let bound = active.device().filter(|device| {
            self.devices
                .get(device)
                .and_then(Device::active_connection)
                == Some(id)
        });
        match bound {
            Some(device) => self.begin_device_deactivation(device, device_reason),
            None => {
                self.queued.retain(|_, queued| *queued != id);
                self.set_active_state(id, ActiveConnectionState::Deactivated, reason);
            }
        }
    }

    /// Start tearing down the activation on `device`; the device reaches
    /// `Disconnected` once its addresses (or port membership) are removed.
    fn begin_device_deactivation(&mut self, device: DeviceId, reason: DeviceStateReason) {
        let Some(target) = self.devices.get(&device) else {
            return;
        };
        let Some(active) = target.active_connection() else {
            return;
        };
        if target.state() == DeviceState::Deactivating {
            return;
        }
        let iface = target.iface().to_string();
        let is_port = self.active.get(&active).is_some_and(|a| a.master().is_some());

        if let Err(err) = self.set_device_state(device, DeviceState::Deactivating, reason) {
            warn!(device, error = %err, "Failed to deactivate device");
            return;
        }
        self.set_active_state(
            active,
            ActiveConnectionState::Deactivating,
            ActiveConnectionStateReason::from_device_reason(reason),
        );

        let token = self.token(device);
        let platform = self.platform.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = if is_port {
                platform.link_release(&iface).await
            } else {
                platform.deconfigure_ip(&iface).await
            };
            if let Err(err) = result {
                warn!(%iface, error = %err, "Cleanup during deactivation failed");
            }
            Self::send_internal(&tx, InternalEvent::DeactivationFinished { device, token });
        });
    }

    pub(super) fn deactivation_finished(&mut self, device: DeviceId) {
        let Some(reason) = self
            .devices
            .get(&device)
            .filter(|d| d.state() == DeviceState::Deactivating)
            .map(Device::state_reason)
        else {
            return;
        };
        let _ = self.set_device_state(device, DeviceState::Disconnected, reason);
    }

    fn start_vpn(&mut self, id: ActiveConnectionId) {
        let Some(active) = self.active.get(&id) else {
            return;
        };
        let profile = active.connection().clone();
        let base_iface = active
            .parent()
            .and_then(|base| self.active.get(&base))
            .and_then(ActiveConnection::device)
            .and_then(|device| self.devices.get(&device))
            .map(|device| device.iface().to_string());

        let Some(base_iface) = base_iface else {
            self.set_active_state(
                id,
                ActiveConnectionState::Deactivated,
                ActiveConnectionStateReason::DependencyFailed,
            );
            return;
        };

        self.set_active_state(
            id,
            ActiveConnectionState::Activating,
            ActiveConnectionStateReason::None,
        );
        let vpn = self.vpn.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = vpn.connect(&profile, &base_iface).await;
            Self::send_internal(&tx, InternalEvent::VpnFinished { active: id, result });
        });
    }

    pub(super) fn vpn_finished(
        &mut self,
        id: ActiveConnectionId,
        result: std::result::Result<(), VpnError>,
    ) {
        let activating = self
            .active
            .get(&id)
            .is_some_and(|a| a.state() == ActiveConnectionState::Activating);
        if !activating {
            return;
        }

        match result {
            Ok(()) => self.set_active_state(
                id,
                ActiveConnectionState::Activated,
                ActiveConnectionStateReason::None,
            ),
            Err(err) => {
                warn!(active = id, error = %err, "VPN failed to start");
                self.set_active_state(
                    id,
                    ActiveConnectionState::Deactivated,
                    ActiveConnectionStateReason::ServiceStartFailed,
                );
            }
        }
    }

    fn stop_vpn(&mut self, id: ActiveConnectionId, reason: ActiveConnectionStateReason) {
        let Some(uuid) = self.active.get(&id).map(|a| a.connection().uuid.clone()) else {
            return;
        };
        let vpn = self.vpn.clone();
        tokio::spawn(async move {
            if let Err(err) = vpn.disconnect(&uuid).await {
                warn!(%uuid, error = %err, "VPN disconnect failed");
            }
        });
        self.set_active_state(id, ActiveConnectionState::Deactivating, reason);
        self.set_active_state(id, ActiveConnectionState::Deactivated, reason);
    }
}
