/// Caller identity and permission checks
pub mod auth;
/// Bus connections and exported objects
pub mod bus;
/// Shared reactive primitives
pub mod common;
/// Internet reachability checks
pub mod connectivity;
/// Kernel link layer
pub mod platform;
/// Login session tracking
pub mod session;
/// Connection profile storage
pub mod settings;
/// VPN plugin seam
pub mod vpn;

pub use auth::{AuthChain, AuthSubject, PolicyBackend};
pub use bus::{BusEvent, BusManager};
pub use connectivity::{Connectivity, ConnectivityCheck, ConnectivityMonitor, HttpCheck};
pub use platform::{Platform, PlatformEvent};
pub use session::SessionMonitor;
pub use settings::{ConnectionProfile, SettingsStore};
pub use vpn::VpnService;
