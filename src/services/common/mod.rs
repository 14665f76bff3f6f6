//! Common utilities and abstractions for services

/// Reactive property system for fine-grained state updates
pub mod property;
/// Shared identifier types
pub mod types;

pub use property::Property;
pub use types::{ACTIVE_CONNECTION_PATH_PREFIX, DEVICE_PATH_PREFIX, ObjectPath};
