use super::ToolEvent;
use std::fmt;

/// Reasons an inbound payload is dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadError {
    Empty,
    InvalidJson(String),
    NotObject,
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::Empty => write!(f, "payload is empty"),
            PayloadError::InvalidJson(e) => write!(f, "payload is not valid JSON: {}", e),
            PayloadError::NotObject => write!(f, "payload must be a JSON object"),
        }
    }
}

impl std::error::Error for PayloadError {}

/// Parses a raw backend payload into a ToolEvent.
///
/// Rules:
/// - Payload must be non-empty UTF-8 JSON
/// - Top level must be an object
/// - Known fields must have the right type (strings or null)
pub fn parse_payload(raw: &[u8]) -> Result<ToolEvent, PayloadError> {
    if raw.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(PayloadError::Empty);
    }

    let value: serde_json::Value =
        serde_json::from_slice(raw).map_err(|e| PayloadError::InvalidJson(e.to_string()))?;

    if !value.is_object() {
        return Err(PayloadError::NotObject);
    }

    serde_json::from_value(value).map_err(|e| PayloadError::InvalidJson(e.to_string()))
}
