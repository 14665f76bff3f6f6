use std::path::PathBuf;

/// Session backend errors.
///
/// Callers that only need a yes/no answer treat every error as "no session";
/// the variants let stricter callers tell a missing backend from a broken one.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    /// The session database does not exist (yet).
    #[error("session database {0} does not exist")]
    NoDatabase(PathBuf),

    /// The session database could not be read.
    #[error("failed to read session database '{path}': {details}")]
    IoError {
        /// Database path
        path: PathBuf,
        /// I/O error details
        details: String,
    },

    /// The session database contains an unparsable group.
    #[error("malformed session database '{path}': {details}")]
    MalformedDatabase {
        /// Database path
        path: PathBuf,
        /// What was wrong
        details: String,
    },

    /// The session manager could not be queried.
    #[error("session manager query failed: {0}")]
    DbusError(#[from] zbus::Error),
}
