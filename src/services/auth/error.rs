/// Authorization machinery errors.
///
/// A permission that is simply not granted is a result, not an error.
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    /// The policy backend could not be reached.
    #[error("{backend} policy backend unavailable: {reason}")]
    BackendUnavailable {
        /// Backend name.
        backend: &'static str,
        /// Failure details.
        reason: String,
    },

    /// A check task ended without reporting.
    #[error("authorization check for '{permission}' was lost: {reason}")]
    CheckLost {
        /// Permission being checked.
        permission: String,
        /// Failure details.
        reason: String,
    },
}
