use async_trait::async_trait;
use tracing::{debug, warn};

use super::{AuthCallResult, AuthError, AuthSubject, permissions};
use crate::services::session::SessionMonitor;

/// Decides single permission checks.
///
/// `Err` means the backend itself could not be reached; a reachable backend
/// that fails one particular check answers `Ok(AuthCallResult::Error)`.
#[async_trait]
pub trait PolicyBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Check whether `subject` holds `permission`.
    async fn check(
        &self,
        subject: &AuthSubject,
        permission: &str,
        allow_interaction: bool,
    ) -> Result<AuthCallResult, AuthError>;
}

/// Policy used when polkit is disabled.
///
/// Root may do anything. Other users may control networking while they hold
/// an active session and may not share connections. Session backend errors
/// deny.
pub struct LocalPolicyBackend {
    sessions: SessionMonitor,
}

impl LocalPolicyBackend {
    /// Backend consulting `sessions` for non-root users.
    pub fn new(sessions: SessionMonitor) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl PolicyBackend for LocalPolicyBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn check(
        &self,
        subject: &AuthSubject,
        permission: &str,
        _allow_interaction: bool,
    ) -> Result<AuthCallResult, AuthError> {
        let uid = subject.uid();
        if uid == 0 {
            return Ok(AuthCallResult::Yes);
        }
        if permission != permissions::NETWORK_CONTROL {
            return Ok(AuthCallResult::No);
        }

        match self.sessions.try_uid_active(uid).await {
            Ok(true) => Ok(AuthCallResult::Yes),
            Ok(false) => {
                debug!(uid, permission, "No active session, denying");
                Ok(AuthCallResult::No)
            }
            Err(err) => {
                warn!(uid, error = %err, "Session backend failed, denying");
                Ok(AuthCallResult::No)
            }
        }
    }
}
