use super::BusClient;
use anyhow::{Context, Result};
use rumqttc::QoS;
use tracing::debug;

/// Outbound side of a bus, as seen by the relay.
///
/// Publishing is fire-and-forget: it queues the message for the bus driver
/// and never waits on the network.
pub trait Publish: Send + Sync {
    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()>;
}

impl Publish for BusClient {
    /// Queue a QoS 1 (at-least-once) publish.
    ///
    /// Fails when the request queue is full, e.g. while the broker is
    /// unreachable; the caller logs and drops.
    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        debug!(
            role = %self.role(),
            topic = %topic,
            bytes = payload.len(),
            retain = retain,
            "Publishing"
        );

        self.client()
            .try_publish(topic, QoS::AtLeastOnce, retain, payload)
            .with_context(|| format!("Failed to publish to '{}'", topic))
    }
}
