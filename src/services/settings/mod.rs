//! Connection profile storage.

mod memory;
mod profile;


use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use memory::MemorySettings;
pub use profile::{
    ConnectionKind, ConnectionProfile, IpMethod, IpSettings, WifiSecurity, derive_uuid,
};

/// Provides immutable connection profiles and records when they were last used.
pub trait SettingsStore: Send + Sync {
    /// Look up a profile by uuid, then by id.
    fn connection(&self, id_or_uuid: &str) -> Option<Arc<ConnectionProfile>>;

    /// All known profiles.
    fn connections(&self) -> Vec<Arc<ConnectionProfile>>;

    /// Store a profile, replacing one with the same uuid.
    fn add_connection(&self, profile: ConnectionProfile) -> Arc<ConnectionProfile>;

    /// Record that a profile was entered into or left the activated state.
    fn update_timestamp(&self, uuid: &str, timestamp: DateTime<Utc>);

    /// Last time the profile was activated.
    fn timestamp(&self, uuid: &str) -> Option<DateTime<Utc>>;
}
