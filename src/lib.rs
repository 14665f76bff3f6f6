//! netcored - connection activation core of a Linux network management daemon.
//!
//! The crate tracks network devices and the profiles activated on them:
//!
//! - [`device::Device`] runs the per-device state machine
//! - [`active_connection::ActiveConnection`] tracks one activation attempt
//! - [`manager`] owns both, arbitrates the default route and autoconnects
//! - [`services`] hosts the collaborators: authorization, sessions, the bus,
//!   connection settings, the kernel link layer, VPN plugins and Internet
//!   connectivity checks
//! - [`config_store::ConfigStore`] serves immutable configuration snapshots
//!   and reports what changed on reload
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use netcored::config_store::ConfigStore;
//!
//! let config_store = ConfigStore::with_defaults();
//! let config = config_store.get_current();
//! println!("Unmanaged devices: {:?}", config.unmanaged_devices());
//! ```

/// Configuration schema and snapshots.
pub mod config;

/// Configuration store with change notification.
pub mod config_store;

/// Core error types and result aliases.
pub mod core;

/// State, reason and device type enumerations.
pub mod types;

/// Collaborating services.
pub mod services;

/// Per-device state machine.
pub mod device;

/// Activation attempts.
pub mod active_connection;

/// The activation core task.
pub mod manager;

/// Log output setup.
pub mod tracing_config;

pub use core::{NetworkError, Result};
