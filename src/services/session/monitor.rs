use std::{fmt, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{ConsoleKitBackend, LogindBackend, SessionError};
use crate::config::{ConfigPaths, SessionTracking};

/// Answers session presence queries for one uid.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Whether `uid` has any session.
    async fn uid_has_session(&self, uid: u32) -> Result<bool, SessionError>;

    /// Whether `uid` has an active session.
    async fn uid_active(&self, uid: u32) -> Result<bool, SessionError>;
}

/// Every uid has an active local session.
pub struct FakeSessionBackend;

#[async_trait]
impl SessionBackend for FakeSessionBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn uid_has_session(&self, _uid: u32) -> Result<bool, SessionError> {
        Ok(true)
    }

    async fn uid_active(&self, _uid: u32) -> Result<bool, SessionError> {
        Ok(true)
    }
}

/// No uid ever has a session.
pub struct NoSessionBackend;

#[async_trait]
impl SessionBackend for NoSessionBackend {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn uid_has_session(&self, _uid: u32) -> Result<bool, SessionError> {
        Ok(false)
    }

    async fn uid_active(&self, _uid: u32) -> Result<bool, SessionError> {
        Ok(false)
    }
}

/// Session presence oracle shared by authorization and profile ACL checks.
///
/// Exactly one backend is selected at startup.
#[derive(Clone)]
pub struct SessionMonitor {
    backend: Arc<dyn SessionBackend>,
}

impl SessionMonitor {
    /// Wrap an explicit backend.
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self { backend }
    }

    /// Monitor that reports every uid as logged in and active.
    pub fn fake() -> Self {
        Self::new(Arc::new(FakeSessionBackend))
    }

    /// Monitor that reports no sessions at all.
    pub fn none() -> Self {
        Self::new(Arc::new(NoSessionBackend))
    }

    /// Select the backend configured by `session-tracking`.
    ///
    /// `auto` uses logind when systemd seats exist and ConsoleKit otherwise.
    /// A logind backend that cannot reach the bus degrades to "no sessions".
    pub async fn from_config(tracking: SessionTracking) -> Self {
        let tracking = match tracking {
            SessionTracking::Auto if ConfigPaths::systemd_seats_dir().exists() => {
                SessionTracking::Logind
            }
            SessionTracking::Auto => SessionTracking::Consolekit,
            other => other,
        };

        let monitor = match tracking {
            SessionTracking::Logind => match LogindBackend::new().await {
                Ok(backend) => Self::new(Arc::new(backend)),
                Err(err) => {
                    warn!(error = %err, "logind unavailable, session tracking disabled");
                    Self::none()
                }
            },
            SessionTracking::Consolekit => Self::new(Arc::new(ConsoleKitBackend::new(
                ConfigPaths::consolekit_database(),
            ))),
            SessionTracking::Fake => Self::fake(),
            SessionTracking::None | SessionTracking::Auto => Self::none(),
        };

        info!(backend = monitor.backend_name(), "Session tracking initialized");
        monitor
    }

    /// Name of the active backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Whether `uid` has any session. Backend errors count as "no session".
    pub async fn uid_has_session(&self, uid: u32) -> bool {
        let result = self.try_uid_has_session(uid).await;
        self.flatten(uid, result)
    }

    /// Whether `uid` has an active session. Backend errors count as "no session".
    pub async fn uid_active(&self, uid: u32) -> bool {
        let result = self.try_uid_active(uid).await;
        self.flatten(uid, result)
    }

    /// Like [`uid_has_session`](Self::uid_has_session) but surfaces backend errors.
    ///
    /// # Errors
    /// Returns the backend's error.
    pub async fn try_uid_has_session(&self, uid: u32) -> Result<bool, SessionError> {
        self.backend.uid_has_session(uid).await
    }

    /// Like [`uid_active`](Self::uid_active) but surfaces backend errors.
    ///
    /// # Errors
    /// Returns the backend's error.
    pub async fn try_uid_active(&self, uid: u32) -> Result<bool, SessionError> {
        self.backend.uid_active(uid).await
    }

    fn flatten(&self, uid: u32, result: Result<bool, SessionError>) -> bool {
        match result {
            Ok(value) => value,
            Err(SessionError::NoDatabase(path)) => {
                debug!(uid, path = %path.display(), "No session database");
                false
            }
            Err(err) => {
                warn!(uid, backend = self.backend.name(), error = %err, "Session query failed");
                false
            }
        }
    }
}

impl fmt::Debug for SessionMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionMonitor")
            .field("backend", &self.backend.name())
            .finish()
    }
}
