//! Network devices and their state machine.
//!
//! A [`Device`] validates every transition against the activation pipeline
//! and keeps its active-connection binding consistent with its state: the
//! binding only exists while the state may hold an active connection and is
//! released by the transition that leaves those states.


use tracing::{debug, info};

use crate::{
    active_connection::{ActiveConnectionId, active_connection_path},
    core::{NetworkError, Result},
    services::{
        bus::DeviceProperties,
        common::{DEVICE_PATH_PREFIX, ObjectPath, Property},
        platform::LinkInfo,
    },
    types::{DeviceCapabilities, DeviceState, DeviceStateReason, DeviceType},
};

/// Process-lifetime device identifier, also the last element of its object path.
pub type DeviceId = u32;

/// Object path of the device with this id.
pub fn device_path(id: DeviceId) -> ObjectPath {
    format!("{DEVICE_PATH_PREFIX}/{id}")
}

/// Outcome of an accepted state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStateChange {
    /// State before the transition.
    pub old: DeviceState,
    /// State after the transition.
    pub new: DeviceState,
    /// Reason recorded with the new state.
    pub reason: DeviceStateReason,
    /// Active connection whose binding the transition released.
    pub released: Option<ActiveConnectionId>,
}

impl DeviceStateChange {
    /// Whether the state actually changed.
    pub fn is_change(&self) -> bool {
        self.old != self.new
    }
}

/// One network interface.
#[derive(Debug)]
pub struct Device {
    id: DeviceId,
    path: ObjectPath,

    /// Kernel interface index, stable for the lifetime of the link.
    ifindex: u32,

    /// Interface name.
    iface: String,

    device_type: DeviceType,
    driver: String,
    hw_address: Option<String>,
    capabilities: DeviceCapabilities,

    /// Carrier as last reported by the platform.
    carrier: bool,

    /// Whether the daemon manages this device. Unmanaged devices stay in
    /// [`DeviceState::Unmanaged`].
    managed: bool,

    /// Whether policy may activate connections on its own.
    autoconnect: bool,

    state: DeviceState,
    reason: DeviceStateReason,

    /// Current owner. Only set while `state.may_hold_active_connection()`.
    active_connection: Option<ActiveConnectionId>,

    properties: Property<DeviceProperties>,
}

impl Device {
    /// Create an unmanaged device for a newly reported link.
    pub fn new(id: DeviceId, link: &LinkInfo) -> Self {
        let mut capabilities = DeviceCapabilities::NM_SUPPORTED;
        if link.device_type != DeviceType::Loopback {
            capabilities |= DeviceCapabilities::CARRIER_DETECT;
        }
        if link.software {
            capabilities |= DeviceCapabilities::IS_SOFTWARE;
        }

        let device = Self {
            id,
            path: device_path(id),
            ifindex: link.ifindex,
            iface: link.name.clone(),
            device_type: link.device_type,
            driver: link.driver.clone(),
            hw_address: link.hw_address.clone(),
            capabilities,
            carrier: link.carrier,
            managed: false,
            autoconnect: true,
            state: DeviceState::Unmanaged,
            reason: DeviceStateReason::None,
            active_connection: None,
            properties: Property::new(DeviceProperties::default()),
        };
        device.sync_properties();
        device
    }

    /// Device id.
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Object path.
    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// Kernel interface index.
    pub fn ifindex(&self) -> u32 {
        self.ifindex
    }

    /// Interface name.
    pub fn iface(&self) -> &str {
        &self.iface
    }

    /// Device type.
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Kernel driver.
    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// Hardware address.
    pub fn hw_address(&self) -> Option<&str> {
        self.hw_address.as_deref()
    }

    /// Whether the link was created in software and may be deleted.
    pub fn is_software(&self) -> bool {
        self.capabilities.contains(DeviceCapabilities::IS_SOFTWARE)
    }

    /// Last reported carrier.
    pub fn carrier(&self) -> bool {
        self.carrier
    }

    /// Whether the device is managed.
    pub fn managed(&self) -> bool {
        self.managed
    }

    /// Whether autoconnect is allowed.
    pub fn autoconnect(&self) -> bool {
        self.autoconnect
    }

    /// Current state.
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Reason recorded with the current state.
    pub fn state_reason(&self) -> DeviceStateReason {
        self.reason
    }

    /// Bound active connection.
    pub fn active_connection(&self) -> Option<ActiveConnectionId> {
        self.active_connection
    }

    /// Live snapshot cell read by the bus adapter.
    pub fn properties(&self) -> Property<DeviceProperties> {
        self.properties.clone()
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> DeviceProperties {
        self.properties.get()
    }

    /// Whether the device can be activated given its carrier.
    pub fn is_available(&self, ignore_carrier: bool) -> bool {
        self.carrier || ignore_carrier
    }

    /// Move to `new`.
    ///
    /// Entering [`DeviceState::Prepare`] is only possible through
    /// [`attach`](Self::attach). Leaving the states that may hold an active
    /// connection releases the binding.
    ///
    /// # Errors
    /// Returns `NetworkError::WrongState` for an illegal transition; the
    /// device is left unchanged.
    pub fn set_state(
        &mut self,
        new: DeviceState,
        reason: DeviceStateReason,
    ) -> Result<DeviceStateChange> {
        let old = self.state;
        if old == new {
            return Ok(DeviceStateChange {
                old,
                new,
                reason: self.reason,
                released: None,
            });
        }

        let entering_prepare = new == DeviceState::Prepare;
        if !transition_allowed(old, new) || (entering_prepare && self.active_connection.is_none())
        {
            return Err(NetworkError::wrong_state(
                state_operation(new),
                self.iface.clone(),
                old,
            ));
        }

        let released = if new.may_hold_active_connection() {
            None
        } else {
            self.active_connection.take()
        };

        self.state = new;
        self.reason = reason;
        self.sync_properties();

        info!(iface = %self.iface, %old, %new, ?reason, "Device state changed");
        Ok(DeviceStateChange {
            old,
            new,
            reason,
            released,
        })
    }

    /// Bind `active` and enter [`DeviceState::Prepare`].
    ///
    /// # Errors
    /// Returns `NetworkError::WrongState` unless the device is disconnected
    /// and unbound.
    pub fn attach(&mut self, active: ActiveConnectionId) -> Result<DeviceStateChange> {
        if self.state != DeviceState::Disconnected || self.active_connection.is_some() {
            return Err(NetworkError::wrong_state("attach to", self.iface.clone(), self.state));
        }

        self.active_connection = Some(active);
        match self.set_state(DeviceState::Prepare, DeviceStateReason::None) {
            Ok(change) => Ok(change),
            Err(err) => {
                self.active_connection = None;
                Err(err)
            }
        }
    }

    /// Check that the device may be deleted.
    ///
    /// # Errors
    /// Returns `NetworkError::NotSoftware` for hardware devices.
    pub fn check_deletable(&self) -> Result<()> {
        if self.is_software() {
            Ok(())
        } else {
            Err(NetworkError::NotSoftware(self.iface.clone()))
        }
    }

    /// Record the managed flag. Returns whether it changed.
    pub fn set_managed(&mut self, managed: bool) -> bool {
        if self.managed == managed {
            return false;
        }
        self.managed = managed;
        self.sync_properties();
        true
    }

    /// Record the autoconnect flag. Returns whether it changed.
    pub fn set_autoconnect(&mut self, autoconnect: bool) -> bool {
        if self.autoconnect == autoconnect {
            return false;
        }
        self.autoconnect = autoconnect;
        self.sync_properties();
        true
    }

    /// Record carrier. Returns whether it changed.
    pub fn set_carrier(&mut self, carrier: bool) -> bool {
        if self.carrier == carrier {
            return false;
        }
        debug!(iface = %self.iface, carrier, "Carrier changed");
        self.carrier = carrier;
        true
    }

    fn sync_properties(&self) {
        self.properties.set(DeviceProperties {
            path: self.path.clone(),
            interface: self.iface.clone(),
            driver: self.driver.clone(),
            hw_address: self.hw_address.clone(),
            device_type: self.device_type,
            state: self.state,
            state_reason: self.reason,
            managed: self.managed,
            autoconnect: self.autoconnect,
            capabilities: self.capabilities,
            active_connection: self.active_connection.map(active_connection_path),
        });
    }
}

fn state_operation(target: DeviceState) -> &'static str {
    match target {
        DeviceState::Unavailable | DeviceState::Disconnected => "make available",
        DeviceState::Prepare => "activate",
        DeviceState::Deactivating => "deactivate",
        DeviceState::Failed => "fail",
        _ => "advance",
    }
}

/// Legal edges of the device state machine.
fn transition_allowed(from: DeviceState, to: DeviceState) -> bool {
    use DeviceState::*;

    match (from, to) {
        (_, Unmanaged) | (Unknown, _) => true,
        (Unmanaged, Unavailable) => true,
        (Unavailable, Disconnected) | (Disconnected, Unavailable) => true,
        (Disconnected, Prepare) => true,
        (from, to) if from.next_stage() == Some(to) => true,
        (from, Deactivating) => from.is_activating() || from == Activated,
        (from, Failed) => from.may_hold_active_connection(),
        (Deactivating | Failed, Disconnected) => true,
        (Failed, Unavailable) => true,
        _ => false,
    }
}
