use futures::StreamExt;
use zbus::{
    interface,
    object_server::InterfaceRef,
    zvariant::{ObjectPath, OwnedObjectPath},
};

use super::{ActiveConnectionProperties, DeviceProperties};
use crate::services::common::Property;

fn object_path(path: Option<&str>) -> OwnedObjectPath {
    path.and_then(|p| OwnedObjectPath::try_from(p).ok())
        .unwrap_or_else(|| OwnedObjectPath::from(ObjectPath::from_static_str_unchecked("/")))
}

/// `org.freedesktop.NetworkManager.Device` backed by a live snapshot.
pub(super) struct DeviceInterface {
    props: Property<DeviceProperties>,
}

impl DeviceInterface {
    pub(super) fn new(props: Property<DeviceProperties>) -> Self {
        Self { props }
    }

    /// Emit PropertiesChanged for every field that changes until the
    /// property cell is dropped.
    pub(super) async fn forward_changes(
        iface: InterfaceRef<Self>,
        props: Property<DeviceProperties>,
    ) {
        let mut changes = Box::pin(props.watch());
        let Some(mut last) = changes.next().await else {
            return;
        };

        while let Some(next) = changes.next().await {
            let emitter = iface.signal_emitter();
            let this = iface.get().await;
            if next.state != last.state {
                let _ = this.state_changed(emitter).await;
            }
            if next.state_reason != last.state_reason || next.state != last.state {
                let _ = this.state_reason_changed(emitter).await;
            }
            if next.active_connection != last.active_connection {
                let _ = this.active_connection_changed(emitter).await;
            }
            if next.managed != last.managed {
                let _ = this.managed_changed(emitter).await;
            }
            if next.autoconnect != last.autoconnect {
                let _ = this.autoconnect_changed(emitter).await;
            }
            drop(this);
            last = next;
        }
    }
}

#[interface(name = "org.freedesktop.NetworkManager.Device")]
impl DeviceInterface {
    #[zbus(property)]
    fn interface(&self) -> String {
        self.props.get().interface
    }

    #[zbus(property)]
    fn driver(&self) -> String {
        self.props.get().driver
    }

    #[zbus(property)]
    fn hw_address(&self) -> String {
        self.props.get().hw_address.unwrap_or_default()
    }

    #[zbus(property)]
    fn state(&self) -> u32 {
        self.props.get().state as u32
    }

    #[zbus(property)]
    fn state_reason(&self) -> (u32, u32) {
        let props = self.props.get();
        (props.state as u32, props.state_reason as u32)
    }

    #[zbus(property)]
    fn device_type(&self) -> u32 {
        self.props.get().device_type as u32
    }

    #[zbus(property)]
    fn managed(&self) -> bool {
        self.props.get().managed
    }

    #[zbus(property)]
    fn autoconnect(&self) -> bool {
        self.props.get().autoconnect
    }

    #[zbus(property)]
    fn capabilities(&self) -> u32 {
        self.props.get().capabilities.bits()
    }

    #[zbus(property)]
    fn active_connection(&self) -> OwnedObjectPath {
        object_path(self.props.get().active_connection.as_deref())
    }
}

/// `org.freedesktop.NetworkManager.Connection.Active` backed by a live snapshot.
pub(super) struct ActiveConnectionInterface {
    props: Property<ActiveConnectionProperties>,
}

impl ActiveConnectionInterface {
    pub(super) fn new(props: Property<ActiveConnectionProperties>) -> Self {
        Self { props }
    }

    pub(super) async fn forward_changes(
        iface: InterfaceRef<Self>,
        props: Property<ActiveConnectionProperties>,
    ) {
        let mut changes = Box::pin(props.watch());
        let Some(mut last) = changes.next().await else {
            return;
        };

        while let Some(next) = changes.next().await {
            let emitter = iface.signal_emitter();
            let this = iface.get().await;
            if next.state != last.state {
                let _ = this.state_changed(emitter).await;
            }
            if next.devices != last.devices {
                let _ = this.devices_changed(emitter).await;
            }
            if next.default != last.default {
                let _ = this.default_changed(emitter).await;
            }
            if next.default6 != last.default6 {
                let _ = this.default6_changed(emitter).await;
            }
            drop(this);
            last = next;
        }
    }
}

#[interface(name = "org.freedesktop.NetworkManager.Connection.Active")]
impl ActiveConnectionInterface {
    #[zbus(property)]
    fn id(&self) -> String {
        self.props.get().id
    }

    #[zbus(property)]
    fn uuid(&self) -> String {
        self.props.get().uuid
    }

    #[zbus(property, name = "Type")]
    fn connection_type(&self) -> String {
        self.props.get().connection_type
    }

    #[zbus(property)]
    fn devices(&self) -> Vec<OwnedObjectPath> {
        self.props
            .get()
            .devices
            .iter()
            .map(|path| object_path(Some(path)))
            .collect()
    }

    #[zbus(property)]
    fn state(&self) -> u32 {
        self.props.get().state as u32
    }

    #[zbus(property)]
    fn default(&self) -> bool {
        self.props.get().default
    }

    #[zbus(property)]
    fn default6(&self) -> bool {
        self.props.get().default6
    }

    #[zbus(property)]
    fn vpn(&self) -> bool {
        self.props.get().vpn
    }

    #[zbus(property)]
    fn master(&self) -> OwnedObjectPath {
        object_path(self.props.get().master.as_deref())
    }

    #[zbus(property)]
    fn specific_object(&self) -> OwnedObjectPath {
        object_path(self.props.get().specific_object.as_deref())
    }
}
