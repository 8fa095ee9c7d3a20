use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

mod validation;
#[cfg(test)]
mod tests;

pub use validation::{parse_payload, PayloadError};

/// Lifecycle transition carried by a backend topic (`<ns>/<tool>/<kind>`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    End,
    Enabled,
    Disabled,
    /// Any other kind segment. Still relayed, with generic labels.
    Other(String),
}

impl EventKind {
    /// Parse a topic segment. Matching is case-insensitive.
    pub fn from_segment(segment: &str) -> Self {
        match segment.to_ascii_lowercase().as_str() {
            "start" => EventKind::Start,
            "end" => EventKind::End,
            "enabled" => EventKind::Enabled,
            "disabled" => EventKind::Disabled,
            _ => EventKind::Other(segment.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Start => "start",
            EventKind::End => "end",
            EventKind::Enabled => "enabled",
            EventKind::Disabled => "disabled",
            EventKind::Other(kind) => kind.as_str(),
        }
    }

    /// Kinds whose actor is the person currently holding the tool.
    pub fn is_active(&self) -> bool {
        matches!(self, EventKind::Start | EventKind::Enabled)
    }

    /// Kinds that report the last person to hold the tool.
    pub fn is_closing(&self) -> bool {
        matches!(self, EventKind::End | EventKind::Disabled)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ToolEvent is the backend's tool-usage payload.
///
/// Only the fields the relay reads are typed. Everything else the backend
/// sends (usage ids, user ids, tool ids...) lands in `extra` and is never
/// forwarded to devices.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ToolEvent {
    /// Display name, possibly with a role suffix: "Jane Doe (admin)"
    #[serde(default)]
    pub user_name: Option<String>,

    /// ISO-8601 start instant (start events)
    #[serde(default)]
    pub start_time: Option<String>,

    /// ISO-8601 end instant (end events)
    #[serde(default)]
    pub end_time: Option<String>,

    /// ISO-8601 instant for enabled/disabled events
    #[serde(default)]
    pub timestamp: Option<String>,

    /// Backend-specific fields not used by the relay
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolEvent {
    /// Timestamp field relevant to `kind`.
    pub fn timestamp_for(&self, kind: &EventKind) -> Option<&str> {
        let field = match kind {
            EventKind::Start => &self.start_time,
            EventKind::End => &self.end_time,
            _ => &self.timestamp,
        };
        field.as_deref()
    }
}
