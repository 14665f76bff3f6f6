use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{ConnectionProfile, SettingsStore};

#[derive(Default)]
struct Inner {
    profiles: Vec<Arc<ConnectionProfile>>,
    timestamps: HashMap<String, DateTime<Utc>>,
}

/// In-memory connection store seeded from the daemon configuration.
#[derive(Clone, Default)]
pub struct MemorySettings {
    inner: Arc<RwLock<Inner>>,
}

impl MemorySettings {
    /// Create a store holding `profiles`. Later duplicates of a uuid are dropped.
    pub fn new(profiles: impl IntoIterator<Item = ConnectionProfile>) -> Self {
        let store = Self::default();
        for profile in profiles {
            let profile = profile.normalize();
            if store.connection(&profile.uuid).is_some() {
                debug!(uuid = %profile.uuid, "Ignoring duplicate connection profile");
                continue;
            }
            store.add_connection(profile);
        }
        store
    }

    fn read<R>(&self, f: impl FnOnce(&Inner) -> R) -> R {
        match self.inner.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn write<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        match self.inner.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl SettingsStore for MemorySettings {
    fn connection(&self, id_or_uuid: &str) -> Option<Arc<ConnectionProfile>> {
        self.read(|inner| {
            inner
                .profiles
                .iter()
                .find(|p| p.uuid == id_or_uuid)
                .or_else(|| inner.profiles.iter().find(|p| p.id == id_or_uuid))
                .cloned()
        })
    }

    fn connections(&self) -> Vec<Arc<ConnectionProfile>> {
        self.read(|inner| inner.profiles.clone())
    }

    fn add_connection(&self, profile: ConnectionProfile) -> Arc<ConnectionProfile> {
        let profile = Arc::new(profile.normalize());
        self.write(|inner| {
            inner.profiles.retain(|p| p.uuid != profile.uuid);
            inner.profiles.push(profile.clone());
        });
        debug!(id = %profile.id, uuid = %profile.uuid, "Added connection profile");
        profile
    }

    fn update_timestamp(&self, uuid: &str, timestamp: DateTime<Utc>) {
        self.write(|inner| {
            inner.timestamps.insert(uuid.to_string(), timestamp);
        });
    }

    fn timestamp(&self, uuid: &str) -> Option<DateTime<Utc>> {
        self.read(|inner| inner.timestamps.get(uuid).copied())
    }
}
