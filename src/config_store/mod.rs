//! Configuration store with change tracking.
//!
//! Holds the current [`ConfigData`](crate::config::ConfigData) snapshot, reloads
//! it on request and notifies subscribers of what changed.

mod broadcast;
mod changes;
mod store;

#[cfg(test)]
mod tests;

pub use broadcast::Subscription;
pub use changes::ConfigChangeEvent;
pub use store::ConfigStore;
