// Message bus clients (one per broker)

mod client;
mod publisher;
#[cfg(test)]
mod tests;

pub use client::{BusClient, BusDriver, BusOptions, OFFLINE, ONLINE};
pub use publisher::Publish;

use async_trait::async_trait;
use std::fmt;

/// Which side of the relay a bus connection serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusRole {
    /// Reservation backend's broker (inbound events)
    Backend,
    /// Display fleet's broker (outbound status)
    Device,
}

impl fmt::Display for BusRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusRole::Backend => f.write_str("backend"),
            BusRole::Device => f.write_str("device"),
        }
    }
}

/// Connection lifecycle notifications emitted by a bus driver
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Driver is (re)establishing the connection
    Connecting,
    /// Broker acknowledged the connection
    Connected,
    /// Connection lost. `expected` is true for orderly shutdown.
    Disconnected { reason: String, expected: bool },
}

/// A LinkEvent tagged with the bus it came from
#[derive(Debug, Clone, PartialEq)]
pub struct LinkReport {
    pub role: BusRole,
    pub event: LinkEvent,
}

/// Invoked by a bus driver for every inbound publish.
///
/// Runs on the driver's own task, so implementations must return quickly.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_message(&self, topic: &str, payload: &[u8]);
}
