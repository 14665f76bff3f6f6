//! Fakes and a harness for driving the manager without a kernel or a bus.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use futures::{FutureExt, StreamExt, future::BoxFuture, stream::BoxStream};
use netcored::{
    config::{Config, ConfigData, ConnectivitySettings},
    config_store::ConfigStore,
    manager::{Manager, ManagerContext, ManagerHandle},
    services::{
        auth::{AuthCallResult, AuthError, AuthSubject, PolicyBackend},
        bus::{BusConnection, BusConnector, BusError, BusManager, ExportedObject, PrivatePeer},
        connectivity::{Connectivity, ConnectivityCheck},
        platform::{LinkInfo, Platform, PlatformError, PlatformEvent},
        session::SessionMonitor,
        settings::{ConnectionProfile, IpSettings, MemorySettings},
        vpn::{VpnError, VpnService},
    },
    types::DeviceType,
};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

const WAIT: Duration = Duration::from_secs(2);

pub fn ethernet(ifindex: u32, name: &str) -> LinkInfo {
    LinkInfo {
        ifindex,
        name: name.to_string(),
        device_type: DeviceType::Ethernet,
        driver: "e1000e".to_string(),
        hw_address: Some(format!("52:54:00:00:00:{ifindex:02x}")),
        software: false,
        carrier: true,
        up: true,
    }
}

pub fn software(ifindex: u32, name: &str, device_type: DeviceType) -> LinkInfo {
    LinkInfo {
        ifindex,
        name: name.to_string(),
        device_type,
        driver: String::new(),
        hw_address: None,
        software: true,
        carrier: true,
        up: true,
    }
}

pub fn user() -> AuthSubject {
    AuthSubject::new_unix_process(1000, 4242)
}

#[derive(Default)]
struct PlatformState {
    ops: Vec<String>,
    failing: HashSet<String>,
    gates: HashMap<String, watch::Sender<bool>>,
}

/// Platform recording every command. Commands can be made to fail or to
/// wait until released.
#[derive(Clone)]
pub struct FakePlatform {
    links: Arc<Mutex<Vec<LinkInfo>>>,
    state: Arc<Mutex<PlatformState>>,
    events_tx: mpsc::UnboundedSender<PlatformEvent>,
    events_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<PlatformEvent>>>>,
}

impl FakePlatform {
    pub fn new(links: Vec<LinkInfo>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            links: Arc::new(Mutex::new(links)),
            state: Arc::new(Mutex::new(PlatformState::default())),
            events_tx,
            events_rx: Arc::new(Mutex::new(Some(events_rx))),
        }
    }

    pub fn send(&self, event: PlatformEvent) {
        self.events_tx.send(event).unwrap();
    }

    pub fn ops(&self) -> Vec<String> {
        self.state.lock().unwrap().ops.clone()
    }

    /// Make `op` (for example `"configure_ip eth0"`) fail.
    pub fn fail(&self, op: &str) {
        self.state.lock().unwrap().failing.insert(op.to_string());
    }

    /// Make `op` wait until [`release`](Self::release) is called.
    pub fn hold(&self, op: &str) {
        let (tx, _) = watch::channel(false);
        self.state.lock().unwrap().gates.insert(op.to_string(), tx);
    }

    pub fn release(&self, op: &str) {
        if let Some(gate) = self.state.lock().unwrap().gates.get(op) {
            gate.send_replace(true);
        }
    }

    async fn run(&self, op: String) -> Result<(), PlatformError> {
        let gate = {
            let mut state = self.state.lock().unwrap();
            state.ops.push(op.clone());
            state.gates.get(&op).map(watch::Sender::subscribe)
        };
        if let Some(mut gate) = gate {
            let _ = gate.wait_for(|open| *open).await;
        }

        if self.state.lock().unwrap().failing.contains(&op) {
            return Err(PlatformError::CommandFailed {
                command: op,
                details: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn links(&self) -> Result<Vec<LinkInfo>, PlatformError> {
        Ok(self.links.lock().unwrap().clone())
    }

    fn events(&self) -> BoxStream<'static, PlatformEvent> {
        match self.events_rx.lock().unwrap().take() {
            Some(rx) => UnboundedReceiverStream::new(rx).boxed(),
            None => futures::stream::pending().boxed(),
        }
    }

    async fn link_set_up(&self, iface: &str) -> Result<(), PlatformError> {
        self.run(format!("link_set_up {iface}")).await
    }

    async fn link_set_down(&self, iface: &str) -> Result<(), PlatformError> {
        self.run(format!("link_set_down {iface}")).await
    }

    async fn link_enslave(&self, iface: &str, master: &str) -> Result<(), PlatformError> {
        self.run(format!("link_enslave {iface} {master}")).await
    }

    async fn link_release(&self, iface: &str) -> Result<(), PlatformError> {
        self.run(format!("link_release {iface}")).await
    }

    async fn configure_ip(
        &self,
        iface: &str,
        _ipv4: &IpSettings,
        _ipv6: &IpSettings,
    ) -> Result<(), PlatformError> {
        self.run(format!("configure_ip {iface}")).await
    }

    async fn deconfigure_ip(&self, iface: &str) -> Result<(), PlatformError> {
        self.run(format!("deconfigure_ip {iface}")).await
    }

    async fn link_delete(&self, iface: &str) -> Result<(), PlatformError> {
        self.run(format!("link_delete {iface}")).await
    }
}

/// Policy answering from a table; unlisted permissions are granted.
#[derive(Clone, Default)]
pub struct ScriptedPolicy {
    answers: Arc<Mutex<HashMap<String, AuthCallResult>>>,
    asked: Arc<Mutex<Vec<String>>>,
}

impl ScriptedPolicy {
    pub fn answer(&self, permission: &str, result: AuthCallResult) {
        self.answers
            .lock()
            .unwrap()
            .insert(permission.to_string(), result);
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl PolicyBackend for ScriptedPolicy {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn check(
        &self,
        _subject: &AuthSubject,
        permission: &str,
        _allow_interaction: bool,
    ) -> Result<AuthCallResult, AuthError> {
        self.asked.lock().unwrap().push(permission.to_string());
        Ok(self
            .answers
            .lock()
            .unwrap()
            .get(permission)
            .copied()
            .unwrap_or(AuthCallResult::Yes))
    }
}

/// Bus connector whose system bus accepts every export.
#[derive(Clone, Default)]
pub struct FakeConnector {
    exported: Arc<Mutex<HashSet<String>>>,
}

impl FakeConnector {
    pub fn is_exported(&self, path: &str) -> bool {
        self.exported.lock().unwrap().contains(path)
    }
}

struct FakeConnection {
    exported: Arc<Mutex<HashSet<String>>>,
}

#[async_trait]
impl BusConnection for FakeConnection {
    async fn export(&self, path: &str, _object: &ExportedObject) -> Result<(), BusError> {
        self.exported.lock().unwrap().insert(path.to_string());
        Ok(())
    }

    async fn unexport(&self, path: &str, _object: &ExportedObject) -> Result<(), BusError> {
        self.exported.lock().unwrap().remove(path);
        Ok(())
    }

    async fn unix_user(&self, _sender: &str) -> Result<u32, BusError> {
        Ok(1000)
    }

    async fn unix_process_id(&self, _sender: &str) -> Result<u32, BusError> {
        Ok(4242)
    }

    fn closed(&self) -> BoxFuture<'static, ()> {
        futures::future::pending().boxed()
    }
}

#[async_trait]
impl BusConnector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn BusConnection>, BusError> {
        Ok(Box::new(FakeConnection {
            exported: self.exported.clone(),
        }))
    }

    async fn listen_private(
        &self,
        _path: &Path,
    ) -> Result<BoxStream<'static, PrivatePeer>, BusError> {
        Ok(futures::stream::pending().boxed())
    }
}

/// VPN service that connects instantly and records disconnects.
#[derive(Clone, Default)]
pub struct FakeVpn {
    disconnected: Arc<Mutex<Vec<String>>>,
}

impl FakeVpn {
    pub fn disconnected(&self) -> Vec<String> {
        self.disconnected.lock().unwrap().clone()
    }
}

#[async_trait]
impl VpnService for FakeVpn {
    async fn connect(&self, _profile: &ConnectionProfile, _base_iface: &str) -> Result<(), VpnError> {
        Ok(())
    }

    async fn disconnect(&self, uuid: &str) -> Result<(), VpnError> {
        self.disconnected.lock().unwrap().push(uuid.to_string());
        Ok(())
    }
}

/// Connectivity check answering with whatever the test set.
#[derive(Clone, Default)]
pub struct FakeConnectivity {
    result: Arc<Mutex<Connectivity>>,
}

impl FakeConnectivity {
    pub fn set(&self, result: Connectivity) {
        *self.result.lock().unwrap() = result;
    }
}

#[async_trait]
impl ConnectivityCheck for FakeConnectivity {
    async fn check(&self, _settings: &ConnectivitySettings) -> Connectivity {
        *self.result.lock().unwrap()
    }
}

/// A running manager with every collaborator faked.
pub struct Harness {
    pub manager: ManagerHandle,
    pub platform: FakePlatform,
    pub policy: ScriptedPolicy,
    pub bus: FakeConnector,
    pub vpn: FakeVpn,
    pub connectivity: FakeConnectivity,
    pub settings: MemorySettings,
    pub config: ConfigStore,
}

impl Harness {
    /// Start a manager over `links`. `config` is the daemon TOML, including
    /// `[[connection]]` profiles.
    pub async fn start(links: Vec<LinkInfo>, config: &str) -> Self {
        Self::with_platform(FakePlatform::new(links), config).await
    }

    /// Like [`start`](Self::start) over a platform prepared by the test.
    pub async fn with_platform(platform: FakePlatform, config: &str) -> Self {
        let parsed: Config = toml::from_str(config).unwrap();
        let settings = MemorySettings::new(parsed.connections.clone());
        let config = ConfigStore::from_data(None, ConfigData::new(parsed, Vec::new()).unwrap());

        let policy = ScriptedPolicy::default();
        let connector = FakeConnector::default();
        let vpn = FakeVpn::default();
        let connectivity = FakeConnectivity::default();

        let mut bus = BusManager::new(Arc::new(connector.clone()), Duration::from_millis(50));
        bus.start().await;

        let manager = Manager::spawn(ManagerContext {
            config: config.clone(),
            settings: Arc::new(settings.clone()),
            platform: Arc::new(platform.clone()),
            policy: Arc::new(policy.clone()),
            sessions: SessionMonitor::fake(),
            vpn: Arc::new(vpn.clone()),
            bus,
            connectivity: Arc::new(connectivity.clone()),
        })
        .await
        .unwrap();

        Self {
            manager,
            platform,
            policy,
            bus: connector,
            vpn,
            connectivity,
            settings,
            config,
        }
    }

    /// Wait until the device named `iface` satisfies `check`.
    pub async fn wait_device(
        &self,
        iface: &str,
        check: impl Fn(&netcored::services::bus::DeviceProperties) -> bool,
    ) -> netcored::services::bus::DeviceProperties {
        tokio::time::timeout(WAIT, async {
            loop {
                if let Ok(device) = self.manager.device(iface).await {
                    if check(&device) {
                        return device;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap()
    }

    /// Wait until the active connection `key` satisfies `check`, or is gone
    /// when `check` accepts `None`.
    pub async fn wait_active(
        &self,
        key: &str,
        check: impl Fn(Option<&netcored::services::bus::ActiveConnectionProperties>) -> bool,
    ) {
        tokio::time::timeout(WAIT, async {
            loop {
                let active = self.manager.active_connection(key).await.ok();
                if check(active.as_ref()) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}
