use std::{
    collections::{BTreeMap, HashSet},
    path::Path,
    sync::Arc,
    time::Duration,
};

use futures::StreamExt;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, instrument, warn};

use super::{BusConnection, BusConnector, BusError, ExportedObject, PrivatePeer};
use crate::services::{auth::CallerInfo, common::ObjectPath};

const PRIVATE_SENDER_PREFIX: &str = "x:y:";
const EVENT_CAPACITY: usize = 64;

/// Notifications about the set of live connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// The system bus connection was lost or (re)established. On
    /// reconnection every registered object is already exported when this
    /// fires.
    ConnectionChanged {
        /// Whether a system bus connection is now present.
        connected: bool,
    },
    /// A root peer connected to a private socket.
    PrivateConnectionNew {
        /// Server tag.
        tag: String,
        /// Synthetic sender assigned to the peer.
        sender: String,
    },
    /// A private peer went away.
    PrivateConnectionDisconnected {
        /// Server tag.
        tag: String,
        /// Synthetic sender of the peer.
        sender: String,
    },
}

/// Transport activity waiting to be applied by [`BusManager::handle_transport_event`].
pub enum TransportEvent {
    /// The system bus connection of the given generation closed.
    BusClosed {
        /// Connection generation.
        generation: u64,
    },
    /// Time to retry the system bus.
    Reconnect,
    /// A peer connected to a private server.
    PrivatePeer {
        /// Server tag.
        tag: String,
        /// The unverified peer.
        peer: PrivatePeer,
    },
    /// A private peer closed its connection.
    PrivatePeerClosed {
        /// Server tag.
        tag: String,
        /// Synthetic sender of the peer.
        sender: String,
    },
}

struct PrivateClient {
    tag: String,
    pid: u32,
    connection: Arc<dyn BusConnection>,
}

/// Owns the bus connections and the registry of exported objects.
///
/// The registry is the source of truth: objects stay registered while the
/// system bus is gone and are exported again on every new connection,
/// including each accepted private peer.
pub struct BusManager {
    connector: Arc<dyn BusConnector>,
    reconnect_interval: Duration,
    connection: Option<Arc<dyn BusConnection>>,
    generation: u64,
    reconnect_pending: bool,
    servers: HashSet<String>,
    clients: BTreeMap<String, PrivateClient>,
    next_private_id: u64,
    objects: BTreeMap<ObjectPath, ExportedObject>,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    events: broadcast::Sender<BusEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl BusManager {
    /// Create a manager that retries a lost system bus every `reconnect_interval`.
    pub fn new(connector: Arc<dyn BusConnector>, reconnect_interval: Duration) -> Self {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            connector,
            reconnect_interval,
            connection: None,
            generation: 0,
            reconnect_pending: false,
            servers: HashSet::new(),
            clients: BTreeMap::new(),
            next_private_id: 0,
            objects: BTreeMap::new(),
            transport_tx,
            transport_rx,
            events,
            tasks: Vec::new(),
        }
    }

    /// Connect to the system bus. Failure is not fatal; a retry is scheduled.
    pub async fn start(&mut self) {
        self.connect().await;
    }

    /// Start a private peer-to-peer server. A second server with the same
    /// tag is ignored.
    ///
    /// # Errors
    /// Returns `BusError::PrivateSocket` if the socket cannot be bound.
    #[instrument(skip(self))]
    pub async fn private_server_setup(&mut self, tag: &str, path: &Path) -> Result<(), BusError> {
        if !self.servers.insert(tag.to_string()) {
            debug!(tag, "Private server already set up");
            return Ok(());
        }

        let mut peers = match self.connector.listen_private(path).await {
            Ok(peers) => peers,
            Err(err) => {
                self.servers.remove(tag);
                return Err(err);
            }
        };

        let tx = self.transport_tx.clone();
        let tag = tag.to_string();
        info!(%tag, path = %path.display(), "Private server listening");
        self.tasks.push(tokio::spawn(async move {
            while let Some(peer) = peers.next().await {
                let event = TransportEvent::PrivatePeer {
                    tag: tag.clone(),
                    peer,
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
        }));

        Ok(())
    }

    /// Whether a system bus connection is present.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Subscribe to connection changes.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.events.subscribe()
    }

    /// Register an object and export it on every live connection.
    ///
    /// Export failures are logged; the object stays registered and is
    /// exported again on the next connection.
    pub async fn register_object(&mut self, path: ObjectPath, object: ExportedObject) {
        if let Some(previous) = self.objects.remove(&path) {
            warn!(%path, "Object path registered twice, replacing");
            self.unexport_everywhere(&path, &previous).await;
        }

        for connection in self.live_connections() {
            export_logged(connection.as_ref(), &path, &object).await;
        }
        debug!(%path, interface = object.interface_name(), "Object registered");
        self.objects.insert(path, object);
    }

    /// Unregister an object, removing it from every live connection.
    pub async fn unregister_object(&mut self, path: &str) -> Option<ExportedObject> {
        let object = self.objects.remove(path)?;
        self.unexport_everywhere(path, &object).await;
        debug!(%path, "Object unregistered");
        Some(object)
    }

    /// Whether an object is registered at `path`.
    pub fn is_registered(&self, path: &str) -> bool {
        self.objects.contains_key(path)
    }

    /// Registered object paths in order.
    pub fn registered_paths(&self) -> impl Iterator<Item = &ObjectPath> {
        self.objects.keys()
    }

    /// Whether `sender` has the shape of a synthetic private-peer sender.
    pub fn is_private_sender(sender: &str) -> bool {
        sender.starts_with(PRIVATE_SENDER_PREFIX)
    }

    /// Whether `sender` is a currently connected private peer.
    pub fn connection_is_private(&self, sender: &str) -> bool {
        self.clients.contains_key(sender)
    }

    /// Resolve the identity behind a sender.
    ///
    /// Private peers were verified as root on accept.
    ///
    /// # Errors
    /// Returns `BusError::UnknownSender` for a private sender that is gone,
    /// `BusError::Disconnected` without a system bus, or the bus daemon's error.
    pub async fn caller_info(&self, sender: &str) -> Result<CallerInfo, BusError> {
        if let Some(client) = self.clients.get(sender) {
            return Ok(CallerInfo {
                sender: Some(sender.to_string()),
                uid: 0,
                pid: client.pid,
            });
        }
        if Self::is_private_sender(sender) {
            return Err(BusError::UnknownSender(sender.to_string()));
        }

        let connection = self.connection.as_ref().ok_or(BusError::Disconnected)?;
        let uid = connection.unix_user(sender).await?;
        let pid = connection.unix_process_id(sender).await?;

        Ok(CallerInfo {
            sender: Some(sender.to_string()),
            uid,
            pid,
        })
    }

    /// Wait for the next transport event.
    pub async fn next_transport_event(&mut self) -> Option<TransportEvent> {
        self.transport_rx.recv().await
    }

    /// Apply a transport event.
    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::BusClosed { generation } => {
                if generation != self.generation || self.connection.is_none() {
                    return;
                }
                self.connection = None;
                warn!(
                    objects = self.objects.len(),
                    "System bus connection lost, objects kept registered"
                );
                let _ = self.events.send(BusEvent::ConnectionChanged { connected: false });
                self.schedule_reconnect();
            }

            TransportEvent::Reconnect => {
                self.reconnect_pending = false;
                if self.connection.is_none() {
                    self.connect().await;
                }
            }

            TransportEvent::PrivatePeer { tag, peer } => self.accept_private(tag, peer).await,

            TransportEvent::PrivatePeerClosed { tag, sender } => {
                if self.clients.remove(&sender).is_some() {
                    debug!(%tag, %sender, "Private peer disconnected");
                    let _ = self
                        .events
                        .send(BusEvent::PrivateConnectionDisconnected { tag, sender });
                }
            }
        }
    }

    /// Remove every object from every connection and drop the connections.
    pub async fn shutdown(&mut self) {
        let objects = std::mem::take(&mut self.objects);
        for (path, object) in &objects {
            self.unexport_everywhere(path, object).await;
        }
        self.connection = None;
        self.clients.clear();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!(objects = objects.len(), "Bus manager shut down");
    }

    async fn connect(&mut self) {
        let connection: Arc<dyn BusConnection> = match self.connector.connect().await {
            Ok(connection) => Arc::from(connection),
            Err(err) => {
                warn!(
                    error = %err,
                    retry_ms = self.reconnect_interval.as_millis() as u64,
                    "System bus unavailable"
                );
                self.schedule_reconnect();
                return;
            }
        };

        for (path, object) in &self.objects {
            export_logged(connection.as_ref(), path, object).await;
        }

        self.generation += 1;
        let generation = self.generation;
        let closed = connection.closed();
        let tx = self.transport_tx.clone();
        self.prune_tasks();
        self.tasks.push(tokio::spawn(async move {
            closed.await;
            let _ = tx.send(TransportEvent::BusClosed { generation });
        }));

        self.connection = Some(connection);
        info!(objects = self.objects.len(), "Connected to system bus");
        let _ = self.events.send(BusEvent::ConnectionChanged { connected: true });
    }

    fn schedule_reconnect(&mut self) {
        if self.reconnect_pending {
            return;
        }
        self.reconnect_pending = true;

        let tx = self.transport_tx.clone();
        let interval = self.reconnect_interval;
        self.prune_tasks();
        self.tasks.push(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let _ = tx.send(TransportEvent::Reconnect);
        }));
    }

    async fn accept_private(&mut self, tag: String, peer: PrivatePeer) {
        if peer.uid != 0 {
            warn!(%tag, uid = peer.uid, pid = peer.pid, "Rejecting non-root private peer");
            return;
        }

        self.next_private_id += 1;
        let sender = format!("{PRIVATE_SENDER_PREFIX}{}", self.next_private_id);
        let connection: Arc<dyn BusConnection> = Arc::from(peer.connection);

        for (path, object) in &self.objects {
            export_logged(connection.as_ref(), path, object).await;
        }

        let closed = connection.closed();
        let tx = self.transport_tx.clone();
        let (closed_tag, closed_sender) = (tag.clone(), sender.clone());
        self.prune_tasks();
        self.tasks.push(tokio::spawn(async move {
            closed.await;
            let _ = tx.send(TransportEvent::PrivatePeerClosed {
                tag: closed_tag,
                sender: closed_sender,
            });
        }));

        debug!(%tag, %sender, pid = peer.pid, "Private peer connected");
        self.clients.insert(
            sender.clone(),
            PrivateClient {
                tag: tag.clone(),
                pid: peer.pid,
                connection,
            },
        );
        let _ = self
            .events
            .send(BusEvent::PrivateConnectionNew { tag, sender });
    }

    fn live_connections(&self) -> Vec<Arc<dyn BusConnection>> {
        self.connection
            .iter()
            .cloned()
            .chain(self.clients.values().map(|c| c.connection.clone()))
            .collect()
    }

    async fn unexport_everywhere(&self, path: &str, object: &ExportedObject) {
        for connection in self.live_connections() {
            if let Err(err) = connection.unexport(path, object).await {
                debug!(%path, error = %err, "Failed to unexport object");
            }
        }
    }

    fn prune_tasks(&mut self) {
        self.tasks.retain(|task| !task.is_finished());
    }

    /// Tags of private peers currently connected, for diagnostics.
    pub fn private_peers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.clients
            .iter()
            .map(|(sender, client)| (client.tag.as_str(), sender.as_str()))
    }
}

impl Drop for BusManager {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn export_logged(connection: &dyn BusConnection, path: &str, object: &ExportedObject) {
    if let Err(err) = connection.export(path, object).await {
        warn!(%path, error = %err, "Failed to export object");
    }
}
