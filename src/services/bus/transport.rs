use std::path::Path;

use async_trait::async_trait;
use futures::{future::BoxFuture, stream::BoxStream};

use super::{BusError, ExportedObject};

/// A live connection objects can be exported on.
#[async_trait]
pub trait BusConnection: Send + Sync {
    /// Export `object` at `path`.
    async fn export(&self, path: &str, object: &ExportedObject) -> Result<(), BusError>;

    /// Remove the object at `path`.
    async fn unexport(&self, path: &str, object: &ExportedObject) -> Result<(), BusError>;

    /// Unix uid of a bus peer.
    async fn unix_user(&self, sender: &str) -> Result<u32, BusError>;

    /// Process id of a bus peer.
    async fn unix_process_id(&self, sender: &str) -> Result<u32, BusError>;

    /// Resolves once the connection is gone.
    fn closed(&self) -> BoxFuture<'static, ()>;
}

/// A peer accepted on a private socket, before credential checks.
pub struct PrivatePeer {
    /// Connection to the peer.
    pub connection: Box<dyn BusConnection>,
    /// Peer uid from socket credentials.
    pub uid: u32,
    /// Peer pid from socket credentials.
    pub pid: u32,
}

/// Creates bus connections and private listeners.
#[async_trait]
pub trait BusConnector: Send + Sync {
    /// Connect to the system bus and claim the service name.
    async fn connect(&self) -> Result<Box<dyn BusConnection>, BusError>;

    /// Listen on a private socket, yielding every accepted peer.
    async fn listen_private(
        &self,
        path: &Path,
    ) -> Result<BoxStream<'static, PrivatePeer>, BusError>;
}
