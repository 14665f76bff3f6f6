//! ConsoleKit session database backend.
//!
//! The database is a key file with one `[Session <name>]` group per session.
//! It is re-parsed whenever its modification time changes.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::SystemTime,
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{SessionBackend, SessionError};

/// Merged session state of one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserSessions {
    /// At least one session is active.
    pub active: bool,
    /// At least one session is local.
    pub local: bool,
}

struct Cache {
    mtime: SystemTime,
    users: HashMap<u32, UserSessions>,
}

/// Reads the ConsoleKit database.
pub struct ConsoleKitBackend {
    path: PathBuf,
    cache: Mutex<Option<Cache>>,
}

impl ConsoleKitBackend {
    /// Backend reading the database at `path`.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            cache: Mutex::new(None),
        }
    }

    async fn user(&self, uid: u32) -> Result<Option<UserSessions>, SessionError> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                *self.cache.lock().await = None;
                return Err(SessionError::NoDatabase(self.path.clone()));
            }
            Err(err) => return Err(self.io_error(err)),
        };
        let mtime = metadata.modified().map_err(|e| self.io_error(e))?;

        let mut cache = self.cache.lock().await;
        let stale = cache.as_ref().is_none_or(|c| c.mtime != mtime);
        if stale {
            let content = tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|e| self.io_error(e))?;
            let users = parse_database(&self.path, &content)?;
            debug!(path = %self.path.display(), users = users.len(), "Reloaded ConsoleKit database");
            *cache = Some(Cache { mtime, users });
        }

        Ok(cache.as_ref().and_then(|c| c.users.get(&uid).copied()))
    }

    fn io_error(&self, err: std::io::Error) -> SessionError {
        SessionError::IoError {
            path: self.path.clone(),
            details: err.to_string(),
        }
    }
}

#[async_trait]
impl SessionBackend for ConsoleKitBackend {
    fn name(&self) -> &'static str {
        "consolekit"
    }

    async fn uid_has_session(&self, uid: u32) -> Result<bool, SessionError> {
        Ok(self.user(uid).await?.is_some())
    }

    async fn uid_active(&self, uid: u32) -> Result<bool, SessionError> {
        Ok(self.user(uid).await?.is_some_and(|u| u.active))
    }
}

/// Parse the database and merge sessions per uid.
///
/// Reads only the flat key-file subset ConsoleKit writes: one `key=value`
/// per line inside `[Session ...]` groups. Escape sequences, continuation
/// lines and locale-suffixed keys are not understood; values are taken
/// verbatim after trimming.
///
/// # Errors
/// Returns `SessionError::MalformedDatabase` when a session group lacks a
/// valid `uid` or carries a non-boolean flag.
pub fn parse_database(
    path: &Path,
    content: &str,
) -> Result<HashMap<u32, UserSessions>, SessionError> {
    #[derive(Default)]
    struct Group {
        name: String,
        uid: Option<String>,
        is_active: Option<String>,
        is_local: Option<String>,
    }

    let malformed = |details: String| SessionError::MalformedDatabase {
        path: path.to_path_buf(),
        details,
    };

    let mut groups: Vec<Group> = Vec::new();
    let mut in_session = false;

    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_session = header.starts_with("Session ");
            if in_session {
                groups.push(Group {
                    name: header.to_string(),
                    ..Group::default()
                });
            }
            continue;
        }
        if !in_session {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let Some(group) = groups.last_mut() else {
            continue;
        };
        let value = Some(value.trim().to_string());
        match key.trim() {
            "uid" => group.uid = value,
            "is_active" => group.is_active = value,
            "is_local" => group.is_local = value,
            _ => {}
        }
    }

    let parse_bool = |group: &Group, key: &str, value: &Option<String>| -> Result<bool, SessionError> {
        match value.as_deref() {
            None | Some("false") => Ok(false),
            Some("true") => Ok(true),
            Some(other) => Err(malformed(format!(
                "group '{}': {key} is not a boolean: '{other}'",
                group.name
            ))),
        }
    };

    let mut users: HashMap<u32, UserSessions> = HashMap::new();
    for group in &groups {
        let uid = group
            .uid
            .as_deref()
            .and_then(|uid| uid.parse::<u32>().ok())
            .ok_or_else(|| malformed(format!("group '{}' has no valid uid", group.name)))?;
        let active = parse_bool(group, "is_active", &group.is_active)?;
        let local = parse_bool(group, "is_local", &group.is_local)?;

        let entry = users.entry(uid).or_default();
        entry.active |= active;
        entry.local |= local;
    }

    Ok(users)
}
