//! Embedded-JSON extraction: vendor pages that assign a state object to
//! a well-known JS global
//!
//! The object after the assignment is captured with a balanced-brace
//! scan (string- and escape-aware), parsed, and searched for an `events`
//! array. Parse failures skip the prefix, never fail the page.

use chrono::{DateTime, Utc};
use serde_json::Value;
use teammeet_core::ParsedEvent;

use super::datetime::parse_datetime;

/// JS globals known to carry schedule state
const EMBED_PREFIXES: &[&str] = &[
    "window.__INITIAL_STATE__",
    "window.__SIDARM_DATA__",
    "window.__SCHEDULE_DATA__",
    "window.__DATA__",
];

/// Extract events from known embedded-JSON assignments
pub fn extract_embedded_events(html: &str, now: DateTime<Utc>) -> Vec<ParsedEvent> {
    let mut events = Vec::new();

    for prefix in EMBED_PREFIXES {
        let Some(at) = html.find(prefix) else {
            continue;
        };
        let after = &html[at + prefix.len()..];
        let Some(rest) = after.trim_start().strip_prefix('=') else {
            continue;
        };
        let Some(object) = balanced_object(rest.trim_start()) else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<Value>(object) else {
            continue;
        };
        if let Some(items) = find_events_array(&value) {
            events.extend(items.iter().filter_map(|item| event_from_item(item, now)));
        }
    }

    events
}

/// Capture one balanced `{...}` object from the start of `src`
///
/// Tracks string literals and escapes so braces inside values do not
/// unbalance the scan.
fn balanced_object(src: &str) -> Option<&str> {
    let bytes = src.as_bytes();
    if bytes.first() != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, &byte) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&src[..=idx]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Depth-first search for the first `events` key holding an array
fn find_events_array(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get("events") {
                return Some(items);
            }
            map.values().find_map(find_events_array)
        }
        Value::Array(items) => items.iter().find_map(find_events_array),
        _ => None,
    }
}

fn event_from_item(item: &Value, now: DateTime<Utc>) -> Option<ParsedEvent> {
    let map = item.as_object()?;

    let title = map
        .get("title")
        .or_else(|| map.get("name"))
        .and_then(Value::as_str)?
        .trim()
        .to_string();
    if title.is_empty() {
        return None;
    }

    let start_at = map
        .get("start")
        .or_else(|| map.get("start_date"))
        .or_else(|| map.get("date"))
        .and_then(Value::as_str)
        .and_then(|text| parse_datetime(text, now))?;

    let end_at = map
        .get("end")
        .or_else(|| map.get("end_date"))
        .and_then(Value::as_str)
        .and_then(|text| parse_datetime(text, now));

    let location = map
        .get("location")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    Some(ParsedEvent {
        title,
        raw_title: None,
        start_at,
        end_at,
        location,
        status: None,
        raw: Some(item.clone()),
        row_index: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2025-01-15T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_simple_assignment() {
        let html = r#"<script>window.__SCHEDULE_DATA__ = {"events":[{"title":"Game","start":"2025-05-03T19:00:00Z","location":"Field"}]};</script>"#;
        let events = extract_embedded_events(html, now());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Game");
        assert_eq!(events[0].location.as_deref(), Some("Field"));
    }

    #[test]
    fn test_nested_events_key() {
        let html = r#"<script>window.__INITIAL_STATE__ = {"schedule":{"events":[{"title":"Game","start":"2025-05-03 19:00"}]}};</script>"#;
        let events = extract_embedded_events(html, now());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_braces_inside_strings_stay_balanced() {
        let html = r#"<script>window.__DATA__ = {"note":"a } tricky { string","events":[{"title":"Game","start":"2025-05-03T19:00:00Z"}]};</script>"#;
        let events = extract_embedded_events(html, now());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_escaped_quotes_inside_strings() {
        let html = r#"<script>window.__DATA__ = {"note":"she said \"}\"","events":[{"title":"Game","start":"2025-05-03T19:00:00Z"}]};</script>"#;
        let events = extract_embedded_events(html, now());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_invalid_json_is_skipped() {
        let html = r#"<script>window.__DATA__ = {broken: true,};</script>"#;
        assert!(extract_embedded_events(html, now()).is_empty());
    }

    #[test]
    fn test_unparseable_dates_drop_rows() {
        let html = r#"<script>window.__DATA__ = {"events":[{"title":"Good","start":"2025-05-03T19:00:00Z"},{"title":"Bad","start":"TBD"}]};</script>"#;
        let events = extract_embedded_events(html, now());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Good");
    }

    #[test]
    fn test_no_known_prefix() {
        let html = r#"<script>var somethingElse = {"events":[]};</script>"#;
        assert!(extract_embedded_events(html, now()).is_empty());
    }

    #[test]
    fn test_balanced_object_helper() {
        assert_eq!(balanced_object(r#"{"a":1} trailing"#), Some(r#"{"a":1}"#));
        assert_eq!(balanced_object(r#"{"a":{"b":2}}"#), Some(r#"{"a":{"b":2}}"#));
        assert!(balanced_object("not an object").is_none());
        assert!(balanced_object(r#"{"unterminated":"#).is_none());
    }
}
