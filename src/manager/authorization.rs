use std::sync::Arc;

use tracing::{debug, instrument};

use crate::{
    core::{NetworkError, Result},
    services::{
        auth::{AuthChain, PolicyBackend},
        session::SessionMonitor,
        settings::ConnectionProfile,
    },
};

/// Run `chain` and fold its answers into one decision.
///
/// When `profile` restricts its users, a user subject must be listed and
/// hold a session before the policy backend is consulted at all.
#[instrument(skip_all, fields(subject = %chain.subject()))]
pub(super) async fn authorize(
    chain: AuthChain,
    profile: Option<Arc<ConnectionProfile>>,
    policy: Arc<dyn PolicyBackend>,
    sessions: SessionMonitor,
) -> Result<()> {
    let subject = chain.subject().clone();

    if let Some(profile) = profile {
        if !subject.is_internal() && !profile.permissions.is_empty() {
            let uid = subject.uid();
            if !profile.permissions.contains(&uid) || !sessions.uid_has_session(uid).await {
                debug!(uid, connection = %profile.id, "Connection not visible to user");
                return Err(NetworkError::AuthorizationDenied {
                    reason: format!("Connection '{}' is not available to user {uid}.", profile.id),
                });
            }
        }
    }

    let results = chain.run(policy).await?;
    match results.denial_reason() {
        Some(reason) => {
            debug!(permission = ?results.first_denied(), "Authorization denied");
            Err(NetworkError::AuthorizationDenied {
                reason: reason.to_string(),
            })
        }
        None => Ok(()),
    }
}
