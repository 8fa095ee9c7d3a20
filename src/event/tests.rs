use super::*;

#[test]
fn test_parse_start_event() {
    let raw = br#"{
        "event": "tool_usage_start",
        "usage_id": 235,
        "user_id": 1,
        "user_name": "Alex Denton (admin)",
        "tool_id": 1,
        "tool_name": "woollam",
        "start_time": "2025-10-14T19:15:14.691967+00:00",
        "end_time": null
    }"#;

    let event = parse_payload(raw).unwrap();
    assert_eq!(event.user_name.as_deref(), Some("Alex Denton (admin)"));
    assert_eq!(
        event.start_time.as_deref(),
        Some("2025-10-14T19:15:14.691967+00:00")
    );
    assert!(event.end_time.is_none());
    // Unused backend fields are kept aside
    assert_eq!(event.extra["usage_id"], 235);
    assert_eq!(event.extra["tool_name"], "woollam");
}

#[test]
fn test_parse_missing_fields_is_ok() {
    let event = parse_payload(b"{}").unwrap();
    assert!(event.user_name.is_none());
    assert!(event.timestamp.is_none());
}

#[test]
fn test_empty_payload_fails() {
    assert_eq!(parse_payload(b"").unwrap_err(), PayloadError::Empty);
    assert_eq!(parse_payload(b"  \n").unwrap_err(), PayloadError::Empty);
}

#[test]
fn test_invalid_json_fails() {
    match parse_payload(b"{not json").unwrap_err() {
        PayloadError::InvalidJson(_) => {}
        other => panic!("Expected InvalidJson, got {:?}", other),
    }
}

#[test]
fn test_non_object_fails() {
    assert_eq!(parse_payload(b"[1, 2]").unwrap_err(), PayloadError::NotObject);
    assert_eq!(parse_payload(b"\"start\"").unwrap_err(), PayloadError::NotObject);
}

#[test]
fn test_wrong_field_type_fails() {
    match parse_payload(br#"{"user_name": 42}"#).unwrap_err() {
        PayloadError::InvalidJson(_) => {}
        other => panic!("Expected InvalidJson, got {:?}", other),
    }
}

#[test]
fn test_event_kind_from_segment() {
    assert_eq!(EventKind::from_segment("start"), EventKind::Start);
    assert_eq!(EventKind::from_segment("END"), EventKind::End);
    assert_eq!(EventKind::from_segment("enabled"), EventKind::Enabled);
    assert_eq!(EventKind::from_segment("disabled"), EventKind::Disabled);
    assert_eq!(
        EventKind::from_segment("paused"),
        EventKind::Other("paused".to_string())
    );
    assert_eq!(EventKind::Other("paused".to_string()).as_str(), "paused");
}

#[test]
fn test_timestamp_field_selection() {
    let event = ToolEvent {
        start_time: Some("s".to_string()),
        end_time: Some("e".to_string()),
        timestamp: Some("t".to_string()),
        ..Default::default()
    };

    assert_eq!(event.timestamp_for(&EventKind::Start), Some("s"));
    assert_eq!(event.timestamp_for(&EventKind::End), Some("e"));
    assert_eq!(event.timestamp_for(&EventKind::Enabled), Some("t"));
    assert_eq!(event.timestamp_for(&EventKind::Disabled), Some("t"));
    assert_eq!(
        event.timestamp_for(&EventKind::Other("x".to_string())),
        Some("t")
    );
}
