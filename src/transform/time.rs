use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

/// Shown when the event has no timestamp
pub const UNKNOWN_TIME: &str = "Unknown";
/// Shown when the timestamp cannot be parsed
pub const INVALID_TIME: &str = "Invalid Time";

/// "Oct 14, 12:00 PM"
const DISPLAY_FORMAT: &str = "%b %-d, %I:%M %p";

/// ISO-8601 with a colon-less offset ("+0000"), which RFC 3339 rejects
const COMPACT_OFFSET_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

/// Naive ISO-8601 forms, read as UTC
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Render a backend timestamp in the display timezone.
///
/// Never fails: a missing value yields "Unknown", an unparsable one
/// "Invalid Time".
pub fn format_timestamp(raw: Option<&str>, offset_hours: i32) -> String {
    let raw = match raw.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return UNKNOWN_TIME.to_string(),
    };

    let instant = match parse_instant(raw) {
        Some(instant) => instant,
        None => return INVALID_TIME.to_string(),
    };

    match FixedOffset::east_opt(offset_hours * 3600) {
        Some(offset) => instant.with_timezone(&offset).format(DISPLAY_FORMAT).to_string(),
        None => INVALID_TIME.to_string(),
    }
}

fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, COMPACT_OFFSET_FORMAT) {
        return Some(dt.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
