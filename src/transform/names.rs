/// Drop a parenthesized role suffix: "Jane Doe (admin)" -> "Jane Doe".
pub fn strip_role(raw: &str) -> &str {
    match raw.find('(') {
        Some(idx) => raw[..idx].trim(),
        None => raw.trim(),
    }
}

/// Fit a name into `max_len` characters.
///
/// Longer names fall back to their first word, which is then hard-truncated.
/// Counts characters, so multi-byte names are never split mid-character.
pub fn trim_to_length(name: &str, max_len: usize) -> String {
    if name.chars().count() <= max_len {
        return name.to_string();
    }

    let first = name.split_whitespace().next().unwrap_or(name);
    first.chars().take(max_len).collect()
}

/// Role-stripped, length-bounded actor name
pub fn display_name(raw: &str, max_len: usize) -> String {
    trim_to_length(strip_role(raw), max_len)
}
