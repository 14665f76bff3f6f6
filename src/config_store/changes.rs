use std::{sync::Arc, time::Instant};

use crate::config::{ConfigChangeFlags, ConfigData};

/// A configuration reload that changed something.
///
/// Carries both snapshots so subscribers can compare exactly the aspects
/// named in `flags` without reaching back into the store.
#[derive(Debug, Clone)]
pub struct ConfigChangeEvent {
    /// Aspects that differ between `old` and `new`.
    pub flags: ConfigChangeFlags,
    /// Snapshot before the reload.
    pub old: Arc<ConfigData>,
    /// Snapshot after the reload.
    pub new: Arc<ConfigData>,
    /// Timestamp when the change was applied.
    pub timestamp: Instant,
}

impl ConfigChangeEvent {
    /// Creates a new change event.
    pub fn new(flags: ConfigChangeFlags, old: Arc<ConfigData>, new: Arc<ConfigData>) -> Self {
        Self {
            flags,
            old,
            new,
            timestamp: Instant::now(),
        }
    }

    /// Whether any aspect in `mask` changed.
    pub fn affects(&self, mask: ConfigChangeFlags) -> bool {
        self.flags.intersects(mask)
    }
}
