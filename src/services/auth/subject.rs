use std::fmt;

/// Identity of a bus caller as resolved by the bus manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerInfo {
    /// Unique bus name, or a synthetic `x:y:<n>` name for private-socket peers.
    pub sender: Option<String>,
    /// Unix user id.
    pub uid: u32,
    /// Unix process id.
    pub pid: u32,
}

/// Who a request is made on behalf of.
///
/// Immutable once constructed; two subjects are never merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSubject {
    /// A unix process, possibly reached over the bus.
    Unix {
        /// User id.
        uid: u32,
        /// Process id.
        pid: u32,
        /// Bus sender the request arrived from.
        dbus_sender: Option<String>,
    },
    /// The daemon itself (autoconnect, dependency handling, ...).
    Internal,
}

impl AuthSubject {
    /// Subject for a resolved bus caller.
    pub fn new_from_caller(caller: &CallerInfo) -> Self {
        Self::Unix {
            uid: caller.uid,
            pid: caller.pid,
            dbus_sender: caller.sender.clone(),
        }
    }

    /// Subject for a local process without a bus sender.
    pub fn new_unix_process(uid: u32, pid: u32) -> Self {
        Self::Unix {
            uid,
            pid,
            dbus_sender: None,
        }
    }

    /// Subject for system-initiated requests; bypasses interactive policy.
    pub fn new_internal() -> Self {
        Self::Internal
    }

    /// Whether this is the daemon itself.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal)
    }

    /// Whether a user (rather than the daemon) asked for the operation.
    pub fn user_requested(&self) -> bool {
        !self.is_internal()
    }

    /// Unix user id; 0 for internal subjects.
    pub fn uid(&self) -> u32 {
        match self {
            Self::Unix { uid, .. } => *uid,
            Self::Internal => 0,
        }
    }

    /// Unix process id; 0 for internal subjects.
    pub fn pid(&self) -> u32 {
        match self {
            Self::Unix { pid, .. } => *pid,
            Self::Internal => 0,
        }
    }

    /// Bus sender, if the request came over the bus.
    pub fn dbus_sender(&self) -> Option<&str> {
        match self {
            Self::Unix { dbus_sender, .. } => dbus_sender.as_deref(),
            Self::Internal => None,
        }
    }
}

impl fmt::Display for AuthSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix {
                uid,
                pid,
                dbus_sender: Some(sender),
            } => write!(f, "unix-process[uid={uid}, pid={pid}, sender={sender}]"),
            Self::Unix { uid, pid, .. } => write!(f, "unix-process[uid={uid}, pid={pid}]"),
            Self::Internal => f.write_str("internal"),
        }
    }
}
