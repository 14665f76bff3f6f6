use std::{
    collections::HashMap,
    fs,
    path::Path,
    sync::Mutex,
};

use async_trait::async_trait;
use futures::{
    FutureExt, StreamExt,
    future::BoxFuture,
    stream::BoxStream,
};
use tokio::{net::UnixListener, task::JoinHandle};
use tracing::{debug, warn};
use zbus::{
    Connection, Guid, MessageStream, connection,
    fdo::{DBusProxy, RequestNameFlags, RequestNameReply},
    names::BusName,
};

use super::{
    BusConnection, BusConnector, BusError, ExportedObject, PrivatePeer,
    interfaces::{ActiveConnectionInterface, DeviceInterface},
};

/// Well-known name claimed on the system bus.
pub const SERVICE_NAME: &str = "org.freedesktop.NetworkManager";

/// Connector for the real system bus and private unix sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZbusConnector;

#[async_trait]
impl BusConnector for ZbusConnector {
    async fn connect(&self) -> Result<Box<dyn BusConnection>, BusError> {
        let conn = Connection::system().await?;

        let reply = match conn
            .request_name_with_flags(SERVICE_NAME, RequestNameFlags::DoNotQueue.into())
            .await
        {
            Ok(reply) => reply,
            Err(zbus::Error::NameTaken) => {
                return Err(BusError::NameTaken {
                    name: SERVICE_NAME.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };

        match reply {
            RequestNameReply::PrimaryOwner | RequestNameReply::AlreadyOwner => {
                Ok(Box::new(ZbusConnection::new(conn, None)))
            }
            RequestNameReply::InQueue | RequestNameReply::Exists => Err(BusError::NameTaken {
                name: SERVICE_NAME.to_string(),
            }),
        }
    }

    async fn listen_private(
        &self,
        path: &Path,
    ) -> Result<BoxStream<'static, PrivatePeer>, BusError> {
        let socket_error = |e: std::io::Error| BusError::PrivateSocket {
            path: path.to_path_buf(),
            details: e.to_string(),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(socket_error)?;
        }
        if path.exists() {
            fs::remove_file(path).map_err(socket_error)?;
        }
        let listener = UnixListener::bind(path).map_err(socket_error)?;

        Ok(async_stream::stream! {
            loop {
                let stream = match listener.accept().await {
                    Ok((stream, _)) => stream,
                    Err(err) => {
                        warn!(error = %err, "Private socket accept failed");
                        continue;
                    }
                };

                let (uid, pid) = match stream.peer_cred() {
                    Ok(cred) => (
                        cred.uid(),
                        cred.pid().and_then(|pid| u32::try_from(pid).ok()).unwrap_or(0),
                    ),
                    Err(err) => {
                        warn!(error = %err, "Cannot read private peer credentials");
                        continue;
                    }
                };

                let builder = match connection::Builder::unix_stream(stream).server(Guid::generate()) {
                    Ok(builder) => builder.p2p(),
                    Err(err) => {
                        warn!(error = %err, "Cannot set up private peer connection");
                        continue;
                    }
                };

                match builder.build().await {
                    Ok(conn) => {
                        debug!(uid, pid, "Private peer handshake complete");
                        yield PrivatePeer {
                            connection: Box::new(ZbusConnection::new(conn, Some((uid, pid)))),
                            uid,
                            pid,
                        };
                    }
                    Err(err) => warn!(error = %err, "Private peer handshake failed"),
                }
            }
        }
        .boxed())
    }
}

/// One zbus connection plus the tasks forwarding property changes of the
/// objects exported on it.
struct ZbusConnection {
    conn: Connection,
    peer: Option<(u32, u32)>,
    forwarders: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl ZbusConnection {
    fn new(conn: Connection, peer: Option<(u32, u32)>) -> Self {
        Self {
            conn,
            peer,
            forwarders: Mutex::new(HashMap::new()),
        }
    }

    fn track(&self, path: &str, task: JoinHandle<()>) {
        let mut forwarders = match self.forwarders.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = forwarders.insert(path.to_string(), task) {
            previous.abort();
        }
    }

    fn untrack(&self, path: &str) {
        let mut forwarders = match self.forwarders.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(task) = forwarders.remove(path) {
            task.abort();
        }
    }
}

impl Drop for ZbusConnection {
    fn drop(&mut self) {
        let forwarders = match self.forwarders.get_mut() {
            Ok(forwarders) => forwarders,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (_, task) in forwarders.drain() {
            task.abort();
        }
    }
}

#[async_trait]
impl BusConnection for ZbusConnection {
    async fn export(&self, path: &str, object: &ExportedObject) -> Result<(), BusError> {
        let server = self.conn.object_server();

        match object {
            ExportedObject::Device(props) => {
                server.at(path, DeviceInterface::new(props.clone())).await?;
                let iface = server.interface::<_, DeviceInterface>(path).await?;
                let props = props.clone();
                self.track(
                    path,
                    tokio::spawn(DeviceInterface::forward_changes(iface, props)),
                );
            }
            ExportedObject::ActiveConnection(props) => {
                server
                    .at(path, ActiveConnectionInterface::new(props.clone()))
                    .await?;
                let iface = server
                    .interface::<_, ActiveConnectionInterface>(path)
                    .await?;
                let props = props.clone();
                self.track(
                    path,
                    tokio::spawn(ActiveConnectionInterface::forward_changes(iface, props)),
                );
            }
        }

        Ok(())
    }

    async fn unexport(&self, path: &str, object: &ExportedObject) -> Result<(), BusError> {
        self.untrack(path);
        let server = self.conn.object_server();

        match object {
            ExportedObject::Device(_) => {
                server.remove::<DeviceInterface, _>(path).await?;
            }
            ExportedObject::ActiveConnection(_) => {
                server.remove::<ActiveConnectionInterface, _>(path).await?;
            }
        }

        Ok(())
    }

    async fn unix_user(&self, sender: &str) -> Result<u32, BusError> {
        if let Some((uid, _)) = self.peer {
            return Ok(uid);
        }
        let name = BusName::try_from(sender).map_err(zbus::Error::from)?;
        Ok(DBusProxy::new(&self.conn)
            .await?
            .get_connection_unix_user(name)
            .await?)
    }

    async fn unix_process_id(&self, sender: &str) -> Result<u32, BusError> {
        if let Some((_, pid)) = self.peer {
            return Ok(pid);
        }
        let name = BusName::try_from(sender).map_err(zbus::Error::from)?;
        Ok(DBusProxy::new(&self.conn)
            .await?
            .get_connection_unix_process_id(name)
            .await?)
    }

    fn closed(&self) -> BoxFuture<'static, ()> {
        let mut messages = MessageStream::from(&self.conn);
        async move { while messages.next().await.is_some() {} }.boxed()
    }
}
