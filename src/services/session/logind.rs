//! systemd-logind session backend.

use async_trait::async_trait;
use tracing::instrument;
use zbus::{Connection, proxy, zvariant::OwnedObjectPath};

use super::{SessionBackend, SessionError};

/// logind session manager.
#[proxy(
    default_service = "org.freedesktop.login1",
    interface = "org.freedesktop.login1.Manager",
    default_path = "/org/freedesktop/login1"
)]
pub trait LoginManager {
    /// Lists sessions as (id, uid, user name, seat, object path).
    fn list_sessions(&self) -> zbus::Result<Vec<(String, u32, String, String, OwnedObjectPath)>>;
}

/// One logind session.
#[proxy(
    default_service = "org.freedesktop.login1",
    interface = "org.freedesktop.login1.Session"
)]
pub trait LoginSession {
    /// Whether the session is in the foreground of its seat.
    #[zbus(property)]
    fn active(&self) -> zbus::Result<bool>;

    /// Whether the session is remote.
    #[zbus(property)]
    fn remote(&self) -> zbus::Result<bool>;
}

/// Queries logind on the system bus.
pub struct LogindBackend {
    connection: Connection,
}

impl LogindBackend {
    /// Connects to the system bus.
    ///
    /// # Errors
    /// Returns `SessionError::DbusError` when the system bus is unreachable.
    pub async fn new() -> Result<Self, SessionError> {
        let connection = Connection::system().await?;
        Ok(Self { connection })
    }

    async fn sessions_of(&self, uid: u32) -> Result<Vec<OwnedObjectPath>, SessionError> {
        let manager = LoginManagerProxy::new(&self.connection).await?;
        Ok(manager
            .list_sessions()
            .await?
            .into_iter()
            .filter(|(_, session_uid, ..)| *session_uid == uid)
            .map(|(.., path)| path)
            .collect())
    }
}

#[async_trait]
impl SessionBackend for LogindBackend {
    fn name(&self) -> &'static str {
        "logind"
    }

    #[instrument(skip(self))]
    async fn uid_has_session(&self, uid: u32) -> Result<bool, SessionError> {
        Ok(!self.sessions_of(uid).await?.is_empty())
    }

    #[instrument(skip(self))]
    async fn uid_active(&self, uid: u32) -> Result<bool, SessionError> {
        for path in self.sessions_of(uid).await? {
            let session = LoginSessionProxy::builder(&self.connection)
                .path(path)?
                .build()
                .await?;
            if session.active().await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
