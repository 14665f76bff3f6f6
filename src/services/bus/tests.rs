#![allow(clippy::unwrap_used)]

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use futures::{FutureExt, StreamExt, future::BoxFuture, stream::BoxStream};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::*;
use crate::services::common::Property;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    Export(usize, String),
    Unexport(usize, String),
}

#[derive(Default)]
struct FakeState {
    next_connection: usize,
    failures_left: usize,
    listens: usize,
    ops: Vec<Op>,
    closers: HashMap<usize, oneshot::Sender<()>>,
    peers: Option<mpsc::UnboundedSender<PrivatePeer>>,
}

#[derive(Default, Clone)]
struct FakeBus {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBus {
    fn failing(failures: usize) -> Self {
        let bus = Self::default();
        bus.state.lock().unwrap().failures_left = failures;
        bus
    }

    fn new_connection(&self) -> FakeConnection {
        let mut state = self.state.lock().unwrap();
        state.next_connection += 1;
        let id = state.next_connection;
        let (tx, rx) = oneshot::channel();
        state.closers.insert(id, tx);
        FakeConnection {
            id,
            bus: self.clone(),
            closed: Mutex::new(Some(rx)),
        }
    }

    fn close(&self, id: usize) {
        self.state.lock().unwrap().closers.remove(&id);
    }

    fn exports_on(&self, id: usize) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::Export(conn, path) if *conn == id => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    fn ops(&self) -> Vec<Op> {
        self.state.lock().unwrap().ops.clone()
    }

    fn connect_peer(&self, uid: u32, pid: u32) -> usize {
        let connection = self.new_connection();
        let id = connection.id;
        let peers = self.state.lock().unwrap().peers.clone().unwrap();
        peers
            .send(PrivatePeer {
                connection: Box::new(connection),
                uid,
                pid,
            })
            .unwrap();
        id
    }
}

struct FakeConnection {
    id: usize,
    bus: FakeBus,
    closed: Mutex<Option<oneshot::Receiver<()>>>,
}

#[async_trait]
impl BusConnection for FakeConnection {
    async fn export(&self, path: &str, _object: &ExportedObject) -> Result<(), BusError> {
        self.bus
            .state
            .lock()
            .unwrap()
            .ops
            .push(Op::Export(self.id, path.to_string()));
        Ok(())
    }

    async fn unexport(&self, path: &str, _object: &ExportedObject) -> Result<(), BusError> {
        self.bus
            .state
            .lock()
            .unwrap()
            .ops
            .push(Op::Unexport(self.id, path.to_string()));
        Ok(())
    }

    async fn unix_user(&self, _sender: &str) -> Result<u32, BusError> {
        Ok(1000)
    }

    async fn unix_process_id(&self, _sender: &str) -> Result<u32, BusError> {
        Ok(77)
    }

    fn closed(&self) -> BoxFuture<'static, ()> {
        let rx = self.closed.lock().unwrap().take();
        async move {
            match rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => futures::future::pending::<()>().await,
            }
        }
        .boxed()
    }
}

#[async_trait]
impl BusConnector for FakeBus {
    async fn connect(&self) -> Result<Box<dyn BusConnection>, BusError> {
        {
            let mut state = self.state.lock().unwrap();
            if state.failures_left > 0 {
                state.failures_left -= 1;
                return Err(BusError::Disconnected);
            }
        }
        Ok(Box::new(self.new_connection()))
    }

    async fn listen_private(
        &self,
        _path: &Path,
    ) -> Result<BoxStream<'static, PrivatePeer>, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().unwrap();
        state.listens += 1;
        state.peers = Some(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

fn device() -> ExportedObject {
    ExportedObject::Device(Property::new(DeviceProperties::default()))
}

fn manager(bus: &FakeBus) -> BusManager {
    BusManager::new(Arc::new(bus.clone()), Duration::from_millis(10))
}

async fn step(manager: &mut BusManager) {
    let event = tokio::time::timeout(Duration::from_secs(5), manager.next_transport_event())
        .await
        .unwrap()
        .unwrap();
    manager.handle_transport_event(event).await;
}

#[tokio::test]
async fn reconnect_reexports_every_object_before_announcing() {
    let bus = FakeBus::default();
    let mut manager = manager(&bus);
    manager.start().await;

    let paths = ["/obj/1", "/obj/2", "/obj/3"];
    for path in paths {
        manager.register_object(path.to_string(), device()).await;
    }
    assert_eq!(bus.exports_on(1), paths);

    let mut events = manager.subscribe();
    bus.close(1);
    step(&mut manager).await;

    assert!(!manager.is_connected());
    assert_eq!(
        events.try_recv().unwrap(),
        BusEvent::ConnectionChanged { connected: false }
    );
    assert_eq!(manager.registered_paths().count(), 3);

    step(&mut manager).await;

    assert!(manager.is_connected());
    let event = events.try_recv().unwrap();
    assert_eq!(event, BusEvent::ConnectionChanged { connected: true });
    assert_eq!(bus.exports_on(2), paths);
}

#[tokio::test]
async fn unavailable_bus_is_retried() {
    let bus = FakeBus::failing(2);
    let mut manager = manager(&bus);

    manager.start().await;
    assert!(!manager.is_connected());

    step(&mut manager).await;
    assert!(!manager.is_connected());

    step(&mut manager).await;
    assert!(manager.is_connected());
}

#[tokio::test]
async fn objects_registered_while_disconnected_are_exported_on_connect() {
    let bus = FakeBus::failing(1);
    let mut manager = manager(&bus);
    manager.start().await;

    manager.register_object("/obj/1".to_string(), device()).await;
    assert!(bus.ops().is_empty());

    step(&mut manager).await;
    assert_eq!(bus.exports_on(1), ["/obj/1"]);
}

#[tokio::test]
async fn private_peers_must_be_root() {
    let bus = FakeBus::default();
    let mut manager = manager(&bus);
    manager.start().await;
    manager.register_object("/obj/1".to_string(), device()).await;
    manager
        .private_server_setup("private", Path::new("/nonexistent"))
        .await
        .unwrap();
    let mut events = manager.subscribe();

    let rejected = bus.connect_peer(1000, 10);
    step(&mut manager).await;
    assert!(bus.exports_on(rejected).is_empty());
    assert!(events.try_recv().is_err());

    let accepted = bus.connect_peer(0, 11);
    step(&mut manager).await;
    assert_eq!(bus.exports_on(accepted), ["/obj/1"]);
    assert_eq!(
        events.try_recv().unwrap(),
        BusEvent::PrivateConnectionNew {
            tag: "private".to_string(),
            sender: "x:y:1".to_string(),
        }
    );

    assert!(BusManager::is_private_sender("x:y:1"));
    assert!(manager.connection_is_private("x:y:1"));
    let caller = manager.caller_info("x:y:1").await.unwrap();
    assert_eq!((caller.uid, caller.pid), (0, 11));

    bus.close(accepted);
    step(&mut manager).await;
    assert!(!manager.connection_is_private("x:y:1"));
    assert!(matches!(
        manager.caller_info("x:y:1").await,
        Err(BusError::UnknownSender(_))
    ));
}

#[tokio::test]
async fn duplicate_private_tag_is_ignored() {
    let bus = FakeBus::default();
    let mut manager = manager(&bus);

    manager
        .private_server_setup("private", Path::new("/a"))
        .await
        .unwrap();
    manager
        .private_server_setup("private", Path::new("/b"))
        .await
        .unwrap();

    assert_eq!(bus.state.lock().unwrap().listens, 1);
}

#[tokio::test]
async fn unregister_removes_from_every_connection() {
    let bus = FakeBus::default();
    let mut manager = manager(&bus);
    manager.start().await;
    manager
        .private_server_setup("private", Path::new("/p"))
        .await
        .unwrap();
    let peer = bus.connect_peer(0, 1);
    step(&mut manager).await;

    manager.register_object("/obj/1".to_string(), device()).await;
    assert!(manager.unregister_object("/obj/1").await.is_some());
    assert!(manager.unregister_object("/obj/1").await.is_none());

    let ops = bus.ops();
    assert!(ops.contains(&Op::Unexport(1, "/obj/1".to_string())));
    assert!(ops.contains(&Op::Unexport(peer, "/obj/1".to_string())));
    assert!(!manager.is_registered("/obj/1"));
}

#[tokio::test]
async fn bus_callers_are_resolved_through_the_bus() {
    let bus = FakeBus::failing(1);
    let mut manager = manager(&bus);
    manager.start().await;

    assert!(matches!(
        manager.caller_info(":1.5").await,
        Err(BusError::Disconnected)
    ));

    step(&mut manager).await;
    let caller = manager.caller_info(":1.5").await.unwrap();
    assert_eq!(caller.sender.as_deref(), Some(":1.5"));
    assert_eq!((caller.uid, caller.pid), (1000, 77));
}
