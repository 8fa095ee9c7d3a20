// Backend event -> compact device payload

mod names;
mod time;

pub use names::{display_name, strip_role, trim_to_length};
pub use time::{format_timestamp, INVALID_TIME, UNKNOWN_TIME};

use crate::config::DisplayConfig;
use crate::event::{EventKind, ToolEvent};
use crate::state::LastActorTracker;
use serde::Serialize;
use tracing::warn;

/// Payload published to `<device-ns>/<tool>/status`.
///
/// Exactly five short fields; raw backend fields never reach devices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DevicePayload {
    pub event_type: String,
    pub timestamp: String,
    pub time_label: String,
    pub user_label: String,
    pub user_name: String,
}

impl DevicePayload {
    pub fn to_bytes(&self) -> Vec<u8> {
        // Plain string fields; serialization cannot fail
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Result of a pure transform: the payload plus the tracker write it implies
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transformed {
    pub payload: DevicePayload,
    /// New last-actor record for the tool, if any
    pub record: Option<String>,
}

/// Applies the display policy to backend events
#[derive(Debug, Clone)]
pub struct Transformer {
    config: DisplayConfig,
}

impl Transformer {
    pub fn new(config: DisplayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    /// Pure transform of one event given the tool's last known actor.
    ///
    /// Start events always record their actor (an anonymous start clears
    /// the record). Enabled events record a non-empty actor. End/disabled
    /// events report the tracked actor, falling back to (and recording)
    /// the event's own actor when nothing is tracked yet.
    pub fn transform(
        &self,
        kind: &EventKind,
        event: &ToolEvent,
        last_actor: Option<&str>,
    ) -> Transformed {
        let actor = event
            .user_name
            .as_deref()
            .map(|raw| display_name(raw, self.config.max_name_length))
            .unwrap_or_default();

        let (user_name, record) = if *kind == EventKind::Start {
            // A new session always replaces the record, even when anonymous
            (actor.clone(), Some(actor))
        } else if kind.is_active() {
            let record = (!actor.is_empty()).then(|| actor.clone());
            (actor, record)
        } else if kind.is_closing() {
            match last_actor {
                Some(tracked) => (tracked.to_string(), None),
                None => {
                    let record = (!actor.is_empty()).then(|| actor.clone());
                    (actor, record)
                }
            }
        } else {
            (actor, None)
        };

        let timestamp = format_timestamp(
            event.timestamp_for(kind),
            self.config.timezone_offset_hours,
        );

        Transformed {
            payload: DevicePayload {
                event_type: kind.as_str().to_string(),
                timestamp,
                time_label: time_label(kind).to_string(),
                user_label: self.user_label(kind).to_string(),
                user_name,
            },
            record,
        }
    }

    /// Transform against the shared tracker, atomically per tool.
    pub fn apply(
        &self,
        tracker: &LastActorTracker,
        entity: &str,
        kind: &EventKind,
        event: &ToolEvent,
    ) -> DevicePayload {
        let payload = tracker.update(entity, |last_actor| {
            let transformed = self.transform(kind, event, last_actor);
            (transformed.payload, transformed.record)
        });

        let size = payload.to_bytes().len();
        if size > self.config.max_payload_bytes {
            warn!(
                entity = %entity,
                bytes = size,
                budget = self.config.max_payload_bytes,
                "Device payload exceeds byte budget"
            );
        }

        payload
    }

    fn user_label(&self, kind: &EventKind) -> &str {
        match kind {
            EventKind::Enabled => &self.config.enabled_user_label,
            EventKind::End | EventKind::Disabled => &self.config.last_user_label,
            EventKind::Start | EventKind::Other(_) => &self.config.user_label,
        }
    }
}

/// Label shown next to the timestamp
pub fn time_label(kind: &EventKind) -> &'static str {
    match kind {
        EventKind::Start => "Started",
        EventKind::End => "Ended",
        EventKind::Enabled => "Enabled Since",
        EventKind::Disabled => "Disabled Since",
        EventKind::Other(_) => "Time",
    }
}
