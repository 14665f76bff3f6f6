//! Session tracking: does a uid have an (active) login session.

mod consolekit;
mod error;
mod logind;
mod monitor;


pub use consolekit::{ConsoleKitBackend, UserSessions, parse_database};
pub use error::SessionError;
pub use logind::LogindBackend;
pub use monitor::{FakeSessionBackend, NoSessionBackend, SessionBackend, SessionMonitor};
