use crate::{
    services::common::ObjectPath,
    types::{
        ActiveConnectionState, ActiveConnectionStateReason, AddressFamily, DeviceState,
        DeviceStateReason, NMState,
    },
};

/// Notifications published by the manager, in the order the underlying
/// state changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    /// The device collection changed. Always delivered before the matching
    /// [`DeviceAdded`](Self::DeviceAdded) or [`DeviceRemoved`](Self::DeviceRemoved).
    DevicesChanged {
        /// Paths of all current devices.
        devices: Vec<ObjectPath>,
    },
    /// A device appeared.
    DeviceAdded {
        /// Device path.
        path: ObjectPath,
    },
    /// A device disappeared.
    DeviceRemoved {
        /// Device path.
        path: ObjectPath,
    },
    /// A device changed state.
    DeviceStateChanged {
        /// Device path.
        path: ObjectPath,
        /// New state.
        new: DeviceState,
        /// Previous state.
        old: DeviceState,
        /// Reason for the change.
        reason: DeviceStateReason,
    },
    /// An active connection was exported.
    ActiveConnectionAdded {
        /// Active connection path.
        path: ObjectPath,
    },
    /// A deactivated active connection was unexported.
    ActiveConnectionRemoved {
        /// Active connection path.
        path: ObjectPath,
    },
    /// An active connection changed state.
    ActiveConnectionStateChanged {
        /// Active connection path.
        path: ObjectPath,
        /// New state.
        state: ActiveConnectionState,
        /// Reason for the change.
        reason: ActiveConnectionStateReason,
    },
    /// The default route owner of a family changed.
    DefaultChanged {
        /// Address family.
        family: AddressFamily,
        /// New owner, `None` when no connection owns the default.
        path: Option<ObjectPath>,
    },
    /// Overall networking state changed.
    StateChanged(NMState),
}
