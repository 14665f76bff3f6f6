use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{InternalEvent, Manager, ManagerEvent, PendingAction};
use crate::{
    core::{NetworkError, Result},
    device::{Device, DeviceId, DeviceStateChange},
    services::{
        auth::{AuthChain, AuthSubject, permissions},
        bus::ExportedObject,
        platform::{LinkInfo, PlatformEvent},
        settings::ConnectionProfile,
    },
    types::{
        ActiveConnectionState, ActiveConnectionStateReason, DeviceState, DeviceStateReason,
        DeviceType,
    },
};

impl Manager {
    pub(super) async fn handle_platform_event(&mut self, event: PlatformEvent) {
        match event {
            PlatformEvent::LinkAdded(link) => self.add_link(link).await,

            PlatformEvent::LinkRemoved { ifindex } => {
                if let Some(id) = self.device_by_ifindex(ifindex) {
                    self.remove_device(id).await;
                }
            }

            PlatformEvent::CarrierChanged { ifindex, carrier } => {
                if let Some(id) = self.device_by_ifindex(ifindex) {
                    self.carrier_changed(id, carrier);
                }
            }

            PlatformEvent::LinkStateChanged { ifindex, up } => {
                let Some(id) = self.device_by_ifindex(ifindex) else {
                    return;
                };
                let state = self.devices.get(&id).map(Device::state);
                if let Some(state) = state {
                    if !up && state.may_hold_active_connection() && state != DeviceState::Prepare {
                        info!(device = id, "Link went down under an active connection");
                        self.unwind_device(id, DeviceStateReason::Carrier);
                    }
                }
            }
        }
    }

    /// Adopt a new link. Links already known by index are ignored.
    pub(super) async fn add_link(&mut self, link: LinkInfo) {
        if self.device_by_ifindex(link.ifindex).is_some() {
            return;
        }

        let id = self.next_device_id;
        self.next_device_id += 1;

        let device = Device::new(id, &link);
        let path = device.path().clone();
        let properties = device.properties();
        self.devices.insert(id, device);

        self.bus
            .register_object(path.clone(), ExportedObject::Device(properties))
            .await;
        info!(device = id, iface = %link.name, device_type = %link.device_type, "Device added");

        self.emit(ManagerEvent::DevicesChanged {
            devices: self.device_paths(),
        });
        self.emit(ManagerEvent::DeviceAdded { path });

        self.evaluate_management(id);
        self.ensure_default_wired(id);
    }

    /// Forget a device: its active connection is deactivated, its ports
    /// fail, and the object is unexported.
    pub(super) async fn remove_device(&mut self, id: DeviceId) {
        if !self.devices.contains_key(&id) {
            return;
        }

        if let Err(err) =
            self.set_device_state(id, DeviceState::Unmanaged, DeviceStateReason::Removed)
        {
            warn!(device = id, error = %err, "Failed to unmanage removed device");
        }
        if let Some(queued) = self.queued.remove(&id) {
            self.set_active_state(
                queued,
                ActiveConnectionState::Deactivated,
                ActiveConnectionStateReason::DeviceRemoved,
            );
        }

        let Some(device) = self.devices.remove(&id) else {
            return;
        };
        self.tokens.remove(&id);
        self.unmanaged_by_user.remove(&id);

        self.bus.unregister_object(device.path()).await;
        info!(device = id, iface = device.iface(), "Device removed");

        self.emit(ManagerEvent::DevicesChanged {
            devices: self.device_paths(),
        });
        self.emit(ManagerEvent::DeviceRemoved {
            path: device.path().clone(),
        });
    }

    /// Apply configuration and user choices about whether `id` is managed,
    /// then reconcile its availability.
    pub(super) fn evaluate_management(&mut self, id: DeviceId) {
        let Some(device) = self.devices.get(&id) else {
            return;
        };

        let should_manage = device.device_type() != DeviceType::Loopback
            && !self
                .config
                .unmanaged_devices()
                .matches(device.iface(), device.hw_address())
            && !self.unmanaged_by_user.contains(&id);
        let managed = device.managed();

        if !should_manage {
            let state = device.state();
            if let Some(queued) = self.queued.remove(&id) {
                self.set_active_state(
                    queued,
                    ActiveConnectionState::Deactivated,
                    ActiveConnectionStateReason::DeviceDisconnected,
                );
            }
            if managed || state != DeviceState::Unmanaged {
                if let Some(device) = self.devices.get_mut(&id) {
                    device.set_managed(false);
                }
                let _ = self.set_device_state(
                    id,
                    DeviceState::Unmanaged,
                    DeviceStateReason::NowUnmanaged,
                );
            }
            return;
        }

        if !managed {
            if let Some(device) = self.devices.get_mut(&id) {
                device.set_managed(true);
            }
            if let Err(err) =
                self.set_device_state(id, DeviceState::Unavailable, DeviceStateReason::NowManaged)
            {
                warn!(device = id, error = %err, "Failed to manage device");
                return;
            }
        }

        self.reconcile_availability(id, DeviceStateReason::Carrier);
    }

    /// Move an idle device between `Unavailable` and `Disconnected` to match
    /// its carrier.
    fn reconcile_availability(&mut self, id: DeviceId, reason: DeviceStateReason) {
        let Some(device) = self.devices.get(&id) else {
            return;
        };
        let available = self.device_available(device);

        let target = match (device.state(), available) {
            (DeviceState::Unavailable, true) => DeviceState::Disconnected,
            (DeviceState::Disconnected, false) => DeviceState::Unavailable,
            _ => return,
        };
        let _ = self.set_device_state(id, target, reason);
    }

    fn carrier_changed(&mut self, id: DeviceId, carrier: bool) {
        let Some(device) = self.devices.get_mut(&id) else {
            return;
        };
        if !device.set_carrier(carrier) {
            return;
        }
        let state = device.state();
        let ignored = self.config.is_ignore_carrier(device.iface(), device.hw_address());

        if !carrier && !ignored && state.may_hold_active_connection() {
            info!(device = id, "Carrier lost under an active connection");
            self.unwind_device(id, DeviceStateReason::Carrier);
        } else {
            self.reconcile_availability(id, DeviceStateReason::Carrier);
        }
    }

    /// Tear an active device down through `Failed` to `Disconnected` in one
    /// pass, without cool-down.
    pub(super) fn unwind_device(&mut self, id: DeviceId, reason: DeviceStateReason) {
        self.fail_device(id, reason, false);
    }

    /// Move `id` to `new` and apply the consequences: the event is published,
    /// pending background work is invalidated, a released active connection
    /// is deactivated, ports react to their master, and a device reaching
    /// `Disconnected` picks up a queued activation.
    pub(super) fn set_device_state(
        &mut self,
        id: DeviceId,
        new: DeviceState,
        reason: DeviceStateReason,
    ) -> Result<DeviceStateChange> {
        let device = self
            .devices
            .get_mut(&id)
            .ok_or_else(|| NetworkError::DeviceNotFound(id.to_string()))?;
        let change = device.set_state(new, reason)?;
        self.after_device_change(id, change);
        Ok(change)
    }

    pub(super) fn after_device_change(&mut self, id: DeviceId, change: DeviceStateChange) {
        if !change.is_change() {
            return;
        }
        *self.tokens.entry(id).or_default() += 1;

        if let Some(device) = self.devices.get(&id) {
            self.emit(ManagerEvent::DeviceStateChanged {
                path: device.path().clone(),
                new: change.new,
                old: change.old,
                reason: change.reason,
            });
        }

        if let Some(released) = change.released {
            self.release_active(released, change.reason);
        }

        self.propagate_to_ports(id);

        if change.new == DeviceState::Disconnected {
            self.after_disconnected(id);
        }
    }

    /// A device just became idle: fall back to `Unavailable` without carrier,
    /// otherwise start the activation queued on it.
    fn after_disconnected(&mut self, id: DeviceId) {
        let available = match self.devices.get(&id) {
            Some(device) => self.device_available(device),
            None => return,
        };

        if !available {
            let _ =
                self.set_device_state(id, DeviceState::Unavailable, DeviceStateReason::Carrier);
            if let Some(queued) = self.queued.remove(&id) {
                self.set_active_state(
                    queued,
                    ActiveConnectionState::Deactivated,
                    ActiveConnectionStateReason::DeviceDisconnected,
                );
            }
            return;
        }

        if let Some(queued) = self.queued.remove(&id) {
            debug!(device = id, active = queued, "Starting queued activation");
            self.attach(queued, id);
        }
    }

    pub(super) fn cooldown_elapsed(&mut self, id: DeviceId) {
        let failed = self
            .devices
            .get(&id)
            .is_some_and(|device| device.state() == DeviceState::Failed);
        if failed {
            let reason = self
                .devices
                .get(&id)
                .map(Device::state_reason)
                .unwrap_or_default();
            let _ = self.set_device_state(id, DeviceState::Disconnected, reason);
        }
    }

    pub(super) fn request_device_deletion(
        &mut self,
        key: &str,
        subject: AuthSubject,
        reply: oneshot::Sender<Result<()>>,
    ) {
        let id = match self.find_device(key).and_then(|id| {
            self.device_ref(id)?.check_deletable()?;
            Ok(id)
        }) {
            Ok(id) => id,
            Err(err) => {
                let _ = reply.send(Err(err));
                return;
            }
        };

        let mut chain = AuthChain::new(subject.clone());
        chain.add_call(permissions::NETWORK_CONTROL, true);
        self.spawn_action_authorization(
            chain,
            PendingAction::DeleteDevice {
                device: id,
                subject,
                reply,
            },
        );
    }

    pub(super) fn delete_device(
        &mut self,
        id: DeviceId,
        subject: AuthSubject,
        reply: oneshot::Sender<Result<()>>,
    ) {
        let Some(device) = self.devices.get(&id) else {
            let _ = reply.send(Err(NetworkError::DeviceNotFound(id.to_string())));
            return;
        };
        let iface = device.iface().to_string();
        let platform = self.platform.clone();
        let tx = self.internal_tx.clone();

        info!(device = id, %iface, "Deleting software device");
        tokio::spawn(async move {
            let result = platform.link_delete(&iface).await;
            Self::send_internal(
                &tx,
                InternalEvent::LinkDeleted {
                    device: id,
                    subject,
                    result,
                    reply,
                },
            );
        });
    }

    /// Create a "Wired connection N" profile for an ethernet device that no
    /// profile fits, unless `no-auto-default` matches it.
    fn ensure_default_wired(&mut self, id: DeviceId) {
        let Some(device) = self.devices.get(&id) else {
            return;
        };
        if device.device_type() != DeviceType::Ethernet || !device.managed() {
            return;
        }
        if self
            .config
            .no_auto_default()
            .matches(device.iface(), device.hw_address())
        {
            return;
        }

        let profiles = self.settings.connections();
        if profiles
            .iter()
            .any(|p| p.is_compatible_with(device.device_type(), device.iface()))
        {
            return;
        }

        let name = (1..)
            .map(|n| format!("Wired connection {n}"))
            .find(|name| profiles.iter().all(|p| &p.id != name))
            .unwrap_or_else(|| format!("Wired connection {}", device.iface()));

        let mut profile = ConnectionProfile::ethernet(name);
        profile.interface_name = Some(device.iface().to_string());
        let profile = self.settings.add_connection(profile);
        info!(device = id, connection = %profile.id, "Created default wired connection");
    }

    pub(super) fn device_available(&self, device: &Device) -> bool {
        device.is_available(
            self.config
                .is_ignore_carrier(device.iface(), device.hw_address()),
        )
    }

    fn device_by_ifindex(&self, ifindex: u32) -> Option<DeviceId> {
        self.devices
            .values()
            .find(|device| device.ifindex() == ifindex)
            .map(Device::id)
    }

    fn device_paths(&self) -> Vec<String> {
        self.devices.values().map(|d| d.path().clone()).collect()
    }
}
