//! Caller identity and permission checking.

mod backend;
mod chain;
mod error;
pub mod permissions;
mod polkit;
mod subject;

#[cfg(test)]
mod tests;

use std::sync::Arc;

pub use backend::{LocalPolicyBackend, PolicyBackend};
pub use chain::{AuthCallResult, AuthChain, AuthResults};
pub use error::AuthError;
pub use polkit::PolkitBackend;
pub use subject::{AuthSubject, CallerInfo};
use tracing::warn;

use crate::services::session::SessionMonitor;

/// Select the policy backend configured by `auth-polkit`.
///
/// Falls back to the local policy when polkit is requested but the system
/// bus is unreachable.
pub async fn policy_backend(use_polkit: bool, sessions: SessionMonitor) -> Arc<dyn PolicyBackend> {
    if use_polkit {
        match PolkitBackend::connect().await {
            Ok(backend) => return Arc::new(backend),
            Err(err) => warn!(error = %err, "polkit unavailable, using local policy"),
        }
    }
    Arc::new(LocalPolicyBackend::new(sessions))
}
