//! polkit policy backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, instrument};
use zbus::{Connection, proxy, zvariant::Value};

use super::{AuthCallResult, AuthError, AuthSubject, PolicyBackend};
use crate::services::bus::BusManager;

const CHECK_ALLOW_USER_INTERACTION: u32 = 0x1;

/// polkit authority.
#[proxy(
    default_service = "org.freedesktop.PolicyKit1",
    interface = "org.freedesktop.PolicyKit1.Authority",
    default_path = "/org/freedesktop/PolicyKit1/Authority"
)]
pub trait PolkitAuthority {
    /// Checks whether `subject` is authorized for `action_id`.
    ///
    /// Returns (is_authorized, is_challenge, details).
    fn check_authorization(
        &self,
        subject: &(&str, HashMap<&str, Value<'_>>),
        action_id: &str,
        details: HashMap<&str, &str>,
        flags: u32,
        cancellation_id: &str,
    ) -> zbus::Result<(bool, bool, HashMap<String, String>)>;
}

/// Asks polkit on the system bus.
pub struct PolkitBackend {
    connection: Connection,
}

impl PolkitBackend {
    /// Backend using an existing system bus connection.
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Backend with its own system bus connection.
    ///
    /// # Errors
    /// Returns `AuthError::BackendUnavailable` when the system bus is unreachable.
    pub async fn connect() -> Result<Self, AuthError> {
        let connection = Connection::system().await.map_err(unavailable)?;
        Ok(Self::new(connection))
    }
}

fn unavailable(err: zbus::Error) -> AuthError {
    AuthError::BackendUnavailable {
        backend: "polkit",
        reason: err.to_string(),
    }
}

fn polkit_subject(subject: &AuthSubject) -> (&'static str, HashMap<&'static str, Value<'_>>) {
    let mut details = HashMap::new();
    match subject
        .dbus_sender()
        .filter(|sender| !BusManager::is_private_sender(sender))
    {
        Some(sender) => {
            details.insert("name", Value::from(sender));
            ("system-bus-name", details)
        }
        None => {
            details.insert("pid", Value::from(subject.pid()));
            details.insert("start-time", Value::from(0u64));
            details.insert("uid", Value::from(subject.uid() as i32));
            ("unix-process", details)
        }
    }
}

#[async_trait]
impl PolicyBackend for PolkitBackend {
    fn name(&self) -> &'static str {
        "polkit"
    }

    #[instrument(skip(self), fields(subject = %subject))]
    async fn check(
        &self,
        subject: &AuthSubject,
        permission: &str,
        allow_interaction: bool,
    ) -> Result<AuthCallResult, AuthError> {
        let authority = PolkitAuthorityProxy::new(&self.connection)
            .await
            .map_err(unavailable)?;

        let flags = if allow_interaction {
            CHECK_ALLOW_USER_INTERACTION
        } else {
            0
        };

        let reply = authority
            .check_authorization(&polkit_subject(subject), permission, HashMap::new(), flags, "")
            .await;

        match reply {
            Ok((true, _, _)) => Ok(AuthCallResult::Yes),
            Ok((false, true, _)) => Ok(AuthCallResult::Unknown),
            Ok((false, false, _)) => Ok(AuthCallResult::No),
            Err(zbus::Error::MethodError(name, message, _)) => {
                debug!(%name, ?message, "polkit rejected the check");
                Ok(AuthCallResult::Error)
            }
            Err(err) => Err(unavailable(err)),
        }
    }
}
