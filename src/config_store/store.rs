use std::{
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use tracing::{info, instrument};

use super::{ConfigChangeEvent, Subscription, broadcast::BroadcastService};
use crate::config::{ConfigChangeFlags, ConfigData, ConfigError};

/// Holds the current configuration snapshot and distributes reloads.
///
/// Snapshots are immutable; a reload builds a new one, diffs it against the
/// current one and swaps it in wholesale before notifying subscribers.
#[derive(Clone)]
pub struct ConfigStore {
    path: Option<Arc<PathBuf>>,
    data: Arc<RwLock<Arc<ConfigData>>>,
    broadcast: BroadcastService,
}

impl ConfigStore {
    /// Creates a store holding the built-in defaults and no backing file.
    pub fn with_defaults() -> Self {
        Self::from_data(None, ConfigData::with_defaults())
    }

    /// Creates a store around an already built snapshot.
    pub fn from_data(path: Option<PathBuf>, data: ConfigData) -> Self {
        Self {
            path: path.map(Arc::new),
            data: Arc::new(RwLock::new(Arc::new(data))),
            broadcast: BroadcastService::new(),
        }
    }

    /// Loads a ConfigStore from the configuration rooted at `path`
    ///
    /// # Errors
    /// Propagates file, parse and validation errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = ConfigData::load(path)?;
        Ok(Self::from_data(Some(path.to_path_buf()), data))
    }

    /// Returns the current snapshot, handling poisoned locks gracefully
    pub fn get_current(&self) -> Arc<ConfigData> {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Re-reads the backing file and applies it.
    ///
    /// On error the current snapshot stays in place.
    ///
    /// # Errors
    /// Propagates file, parse and validation errors.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> Result<ConfigChangeFlags, ConfigError> {
        let Some(path) = self.path.clone() else {
            return Ok(ConfigChangeFlags::empty());
        };

        let data = tokio::task::spawn_blocking(move || ConfigData::load(&path))
            .await
            .map_err(|e| ConfigError::ServiceUnavailable {
                service: "config loader".to_string(),
                details: e.to_string(),
            })??;

        self.replace(data).await
    }

    /// Swaps in a new snapshot and notifies subscribers when anything changed.
    ///
    /// # Errors
    /// Returns `ConfigError::ServiceUnavailable` if the broadcast service is gone.
    pub async fn replace(&self, data: ConfigData) -> Result<ConfigChangeFlags, ConfigError> {
        let new = Arc::new(data);
        let old = {
            let mut guard = match self.data.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::replace(&mut *guard, new.clone())
        };

        let flags = ConfigData::diff(&old, &new);
        if flags.is_empty() {
            return Ok(flags);
        }

        info!(?flags, "Configuration changed");
        self.broadcast
            .broadcast(ConfigChangeEvent::new(flags, old, new))
            .await?;
        Ok(flags)
    }

    /// Subscribe to reloads that change any aspect in `mask`.
    ///
    /// # Errors
    /// Returns `ConfigError::ServiceUnavailable` if the broadcast service is gone.
    pub async fn subscribe(&self, mask: ConfigChangeFlags) -> Result<Subscription, ConfigError> {
        self.broadcast.subscribe(mask).await
    }
}
