use std::sync::Arc;

use tracing::{debug, info};

use super::{
    AUTOCONNECT_RETRIES, DefaultCandidate, Manager, ManagerEvent, choose_default, overall_state,
};
use crate::{
    active_connection::{ActiveConnection, ActiveConnectionId},
    core::{NetworkError, Result},
    device::{Device, DeviceId},
    services::{auth::AuthSubject, settings::ConnectionProfile},
    types::{ActiveConnectionState, AddressFamily, DeviceState},
};

impl Manager {
    /// Recompute the default owner of both families. At most one active
    /// connection holds the flag per family at any time.
    pub(super) fn update_defaults(&mut self) {
        for family in [AddressFamily::Inet, AddressFamily::Inet6] {
            let candidates: Vec<DefaultCandidate> = self
                .active
                .values()
                .filter_map(|active| {
                    let device_type = active
                        .device()
                        .and_then(|id| self.devices.get(&id))
                        .map(Device::device_type);
                    DefaultCandidate::for_active(active, family, device_type)
                })
                .collect();

            let forced = self
                .default_overrides
                .get(&family)
                .copied()
                .filter(|id| candidates.iter().any(|c| c.id == *id));
            if forced.is_none() {
                self.default_overrides.remove(&family);
            }

            let winner = forced.or_else(|| choose_default(&candidates));
            self.apply_default(family, winner);
        }
    }

    fn apply_default(&mut self, family: AddressFamily, winner: Option<ActiveConnectionId>) {
        let losers: Vec<ActiveConnectionId> = self
            .active
            .values()
            .filter(|active| active.is_default(family) && Some(active.id()) != winner)
            .map(ActiveConnection::id)
            .collect();
        for id in losers {
            if let Some(active) = self.active.get_mut(&id) {
                active.set_default(family, false);
            }
        }
        if let Some(active) = winner.and_then(|id| self.active.get_mut(&id)) {
            active.set_default(family, true);
        }

        let previous = match winner {
            Some(id) => self.default_owners.insert(family, id),
            None => self.default_owners.remove(&family),
        };
        if previous == winner {
            return;
        }

        let path = winner
            .and_then(|id| self.active.get(&id))
            .map(|active| active.path().clone());
        info!(%family, owner = ?path, "Default route owner changed");
        self.emit(ManagerEvent::DefaultChanged { family, path });
    }

    pub(super) fn override_default(
        &mut self,
        id: ActiveConnectionId,
        family: AddressFamily,
    ) -> Result<()> {
        let active = self.active_ref(id)?;
        if active.state() != ActiveConnectionState::Activated
            || !active.connection().may_own_default(family)
        {
            return Err(NetworkError::wrong_state(
                "make default",
                active.path().clone(),
                active.state(),
            ));
        }

        self.default_overrides.insert(family, id);
        self.update_defaults();
        Ok(())
    }

    /// Start an activation on every idle device for which an autoconnect
    /// profile is available.
    pub(super) fn autoconnect(&mut self) {
        let idle: Vec<DeviceId> = self
            .devices
            .values()
            .filter(|device| {
                device.managed()
                    && device.autoconnect()
                    && device.state() == DeviceState::Disconnected
                    && device.active_connection().is_none()
                    && !self.queued.contains_key(&device.id())
                    && !self.active.values().any(|active| {
                        active.device() == Some(device.id())
                            && active.state() < ActiveConnectionState::Deactivating
                    })
            })
            .map(Device::id)
            .collect();

        for device in idle {
            let Some(profile) = self.best_autoconnect_profile(device) else {
                continue;
            };

            let id = self.next_active_id;
            let built = self.build_device_activation(
                id,
                profile.clone(),
                device,
                AuthSubject::new_internal(),
                None,
            );
            match built {
                Ok(active) => {
                    self.next_active_id += 1;
                    info!(device, connection = %profile.id, "Autoconnecting");
                    self.start_authorization(active, None);
                }
                Err(err) => {
                    debug!(device, connection = %profile.id, error = %err, "Autoconnect skipped");
                }
            }
        }
    }

    fn best_autoconnect_profile(&self, device: DeviceId) -> Option<Arc<ConnectionProfile>> {
        let device = self.devices.get(&device)?;
        let mut profiles: Vec<Arc<ConnectionProfile>> = self
            .settings
            .connections()
            .into_iter()
            .filter(|profile| {
                profile.autoconnect
                    && !profile.is_vpn()
                    && profile.is_compatible_with(device.device_type(), device.iface())
                    && !self.blocked.contains(&profile.uuid)
                    && self.retries_left(&profile.uuid) > 0
                    && !self.profile_in_use(&profile.uuid)
            })
            .collect();

        profiles.sort_by(|a, b| {
            b.autoconnect_priority
                .cmp(&a.autoconnect_priority)
                .then_with(|| {
                    self.settings
                        .timestamp(&b.uuid)
                        .cmp(&self.settings.timestamp(&a.uuid))
                })
        });
        profiles.into_iter().next()
    }

    fn retries_left(&self, uuid: &str) -> u32 {
        self.retries.get(uuid).copied().unwrap_or(AUTOCONNECT_RETRIES)
    }

    fn profile_in_use(&self, uuid: &str) -> bool {
        self.active.values().any(|active| {
            active.connection().uuid == uuid
                && active.state() < ActiveConnectionState::Deactivating
        })
    }

    pub(super) fn update_state(&mut self) {
        let has_default = self.active.values().any(|active| {
            active.is_default(AddressFamily::Inet) || active.is_default(AddressFamily::Inet6)
        });
        self.connectivity.set_online(has_default);
        let state = overall_state(
            self.devices.values().map(Device::state),
            has_default,
            self.connectivity.state().get(),
        );
        if self.state.get() != state {
            info!(state = ?state, "Networking state changed");
            self.state.set(state);
            self.emit(ManagerEvent::StateChanged(state));
        }
    }

    /// Drop deactivated connections, unexporting the ones that were
    /// published.
    pub(super) async fn reap_deactivated(&mut self) {
        let finished: Vec<ActiveConnectionId> = self
            .active
            .values()
            .filter(|active| active.state() == ActiveConnectionState::Deactivated)
            .map(ActiveConnection::id)
            .collect();

        for id in finished {
            let Some(active) = self.active.remove(&id) else {
                continue;
            };
            self.queued.retain(|_, queued| *queued != id);

            if let Some(reply) = self.pending_replies.remove(&id) {
                let _ = reply.send(Err(NetworkError::wrong_state(
                    "activate",
                    active.path().clone(),
                    active.state(),
                )));
            }

            if active.is_exported() {
                self.bus.unregister_object(active.path()).await;
                self.emit(ManagerEvent::ActiveConnectionRemoved {
                    path: active.path().clone(),
                });
            }
            debug!(active = id, "Active connection removed");
        }
    }
}
