//! Bus connections and the exported object registry.
//!
//! [`BusManager`] is transport agnostic; [`ZbusConnector`] provides the
//! system bus and private unix socket connections through zbus.

mod error;
mod interfaces;
mod manager;
mod objects;
mod transport;
mod zbus_transport;

#[cfg(test)]
mod tests;

pub use error::BusError;
pub use manager::{BusEvent, BusManager, TransportEvent};
pub use objects::{ActiveConnectionProperties, DeviceProperties, ExportedObject};
pub use transport::{BusConnection, BusConnector, PrivatePeer};
pub use zbus_transport::{SERVICE_NAME, ZbusConnector};
