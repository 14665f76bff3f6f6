use std::{collections::BTreeMap, fmt, sync::Arc};

use tokio::sync::mpsc;
use tracing::{debug, instrument};

use super::{AuthError, AuthSubject, PolicyBackend, permissions};

/// Outcome of one permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthCallResult {
    /// Granted.
    Yes,
    /// Refused.
    No,
    /// Would need interactive authentication.
    Unknown,
    /// The backend failed this particular check.
    Error,
}

impl fmt::Display for AuthCallResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Unknown => "auth",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// One or more permission checks for a subject, aggregated into one decision.
///
/// Consumed by [`run`](Self::run), so the result is produced exactly once.
/// Dropping the future returned by `run` abandons the chain: checks already
/// sent to the backend are allowed to finish and their answers are discarded.
#[derive(Debug, Clone)]
pub struct AuthChain {
    subject: AuthSubject,
    calls: Vec<(String, bool)>,
}

impl AuthChain {
    /// Empty chain for `subject`.
    pub fn new(subject: AuthSubject) -> Self {
        Self {
            subject,
            calls: Vec::new(),
        }
    }

    /// Register a permission check. Repeated permissions are checked once,
    /// with interaction allowed if any registration allowed it.
    pub fn add_call(&mut self, permission: &str, allow_interaction: bool) -> &mut Self {
        match self.calls.iter_mut().find(|(p, _)| p == permission) {
            Some((_, interaction)) => *interaction |= allow_interaction,
            None => self.calls.push((permission.to_string(), allow_interaction)),
        }
        self
    }

    /// The subject being authorized.
    pub fn subject(&self) -> &AuthSubject {
        &self.subject
    }

    /// Registered permissions, in registration order.
    pub fn permissions(&self) -> impl Iterator<Item = &str> {
        self.calls.iter().map(|(p, _)| p.as_str())
    }

    /// Issue every check concurrently and collect the answers.
    ///
    /// Internal and root subjects are granted everything without consulting
    /// the backend. A check answered with [`AuthCallResult::Error`] ends collection
    /// early; the remaining checks drain in the background.
    ///
    /// # Errors
    /// Returns `AuthError::BackendUnavailable` as soon as any check reports the
    /// backend unreachable.
    #[instrument(skip_all, fields(subject = %self.subject))]
    pub async fn run(self, backend: Arc<dyn PolicyBackend>) -> Result<AuthResults, AuthError> {
        let mut results = BTreeMap::new();

        if self.subject.is_internal() || self.subject.uid() == 0 {
            for (permission, _) in &self.calls {
                results.insert(permission.clone(), AuthCallResult::Yes);
            }
            return Ok(AuthResults::new(self, results));
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        for (permission, allow_interaction) in &self.calls {
            let tx = tx.clone();
            let backend = backend.clone();
            let subject = self.subject.clone();
            let permission = permission.clone();
            let allow_interaction = *allow_interaction;
            tokio::spawn(async move {
                let result = backend
                    .check(&subject, &permission, allow_interaction)
                    .await;
                let _ = tx.send((permission, result));
            });
        }
        drop(tx);

        while results.len() < self.calls.len() {
            let Some((permission, result)) = rx.recv().await else {
                let pending = self
                    .calls
                    .iter()
                    .find(|(p, _)| !results.contains_key(p))
                    .map(|(p, _)| p.clone())
                    .unwrap_or_default();
                return Err(AuthError::CheckLost {
                    permission: pending,
                    reason: "check task ended without an answer".to_string(),
                });
            };

            let result = result?;
            debug!(%permission, %result, backend = backend.name(), "Permission check finished");
            results.insert(permission, result);

            if result == AuthCallResult::Error {
                break;
            }
        }

        Ok(AuthResults::new(self, results))
    }
}

/// Aggregated answers of an [`AuthChain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResults {
    subject: AuthSubject,
    requested: Vec<String>,
    results: BTreeMap<String, AuthCallResult>,
}

impl AuthResults {
    fn new(chain: AuthChain, results: BTreeMap<String, AuthCallResult>) -> Self {
        Self {
            subject: chain.subject,
            requested: chain.calls.into_iter().map(|(p, _)| p).collect(),
            results,
        }
    }

    /// The subject that was checked.
    pub fn subject(&self) -> &AuthSubject {
        &self.subject
    }

    /// Answer for one permission; checks that never answered count as `Unknown`.
    pub fn result(&self, permission: &str) -> AuthCallResult {
        self.results
            .get(permission)
            .copied()
            .unwrap_or(AuthCallResult::Unknown)
    }

    /// First requested permission that was not granted.
    pub fn first_denied(&self) -> Option<&str> {
        self.requested
            .iter()
            .find(|p| self.result(p) != AuthCallResult::Yes)
            .map(String::as_str)
    }

    /// Authorized only when every requested check answered `Yes`.
    pub fn is_authorized(&self) -> bool {
        self.first_denied().is_none()
    }

    /// Caller-visible reason for a denial, if any.
    pub fn denial_reason(&self) -> Option<&'static str> {
        self.first_denied().map(permissions::denial_message)
    }
}
