// Backend -> device relay pipeline

use crate::bus::{MessageHandler, Publish};
use crate::event::parse_payload;
use crate::router::{Route, TopicRouter, OVERALL};
use crate::state::{LastActorTracker, RelayMetrics};
use crate::transform::Transformer;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Routes backend messages, transforms tool events and republishes them
/// (retained) on the device bus.
pub struct Relay {
    router: TopicRouter,
    transformer: Transformer,
    tracker: Arc<LastActorTracker>,
    publisher: Arc<dyn Publish>,
    device_namespace: String,
    metrics: RelayMetrics,
}

impl Relay {
    pub fn new(
        router: TopicRouter,
        transformer: Transformer,
        publisher: Arc<dyn Publish>,
        device_namespace: &str,
    ) -> Self {
        Self {
            router,
            transformer,
            tracker: Arc::new(LastActorTracker::new()),
            publisher,
            device_namespace: device_namespace.trim_matches('/').to_string(),
            metrics: RelayMetrics::new(),
        }
    }

    /// Share an existing tracker
    pub fn with_tracker(mut self, tracker: Arc<LastActorTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Share existing metrics
    pub fn with_metrics(mut self, metrics: RelayMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn tracker(&self) -> &Arc<LastActorTracker> {
        &self.tracker
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Device topic carrying a tool's status
    pub fn status_topic(&self, entity: &str) -> String {
        format!("{}/{}/status", self.device_namespace, entity)
    }

    /// Process one inbound backend message.
    ///
    /// Never fails: bad input and publish errors are logged and counted.
    pub fn handle(&self, topic: &str, payload: &[u8]) {
        self.metrics.record_received(topic);

        match self.router.classify(topic) {
            Route::Tool { entity, kind } => {
                let event = match parse_payload(payload) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(topic = %topic, error = %e, "Dropping malformed event payload");
                        self.metrics.record_dropped();
                        return;
                    }
                };

                let device_payload = self.transformer.apply(&self.tracker, &entity, &kind, &event);
                debug!(
                    entity = %entity,
                    event_type = %device_payload.event_type,
                    user_name = %device_payload.user_name,
                    "Tool event transformed"
                );

                let target = self.status_topic(&entity);
                self.forward(&target, device_payload.to_bytes());
            }
            Route::Overall => {
                let target = format!("{}/{}", self.device_namespace, OVERALL);
                self.forward(&target, payload.to_vec());
            }
            Route::Unmapped(_) | Route::Unrecognized => {
                self.metrics.record_ignored();
            }
        }
    }

    fn forward(&self, target: &str, payload: Vec<u8>) {
        match self.publisher.publish(target, payload, true) {
            Ok(()) => {
                self.metrics.record_relayed();
                info!(topic = %target, "Relayed");
            }
            Err(e) => {
                self.metrics.record_publish_failure();
                warn!(topic = %target, error = %e, "Publish failed, message dropped");
            }
        }
    }
}

#[async_trait]
impl MessageHandler for Relay {
    async fn on_message(&self, topic: &str, payload: &[u8]) {
        self.handle(topic, payload);
    }
}
