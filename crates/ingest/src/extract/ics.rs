//! ICS (`text/calendar`) event extraction
//!
//! Line-based parsing: unfold RFC 5545 continuation lines, then collect
//! properties per `VEVENT`. Only the fields the event table needs are
//! read; everything else in the component is ignored. Malformed
//! components are dropped, never fatal.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::json;
use teammeet_core::models::EventStatus;
use teammeet_core::ParsedEvent;
use tracing::debug;

/// Parse an ICS document into events
pub fn parse_ics(body: &str) -> Vec<ParsedEvent> {
    let mut events = Vec::new();
    let mut current: Option<Vec<(String, Vec<(String, String)>, String)>> = None;

    for line in unfold_lines(body) {
        if line.eq_ignore_ascii_case("BEGIN:VEVENT") {
            current = Some(Vec::new());
            continue;
        }
        if line.eq_ignore_ascii_case("END:VEVENT") {
            if let Some(props) = current.take() {
                if let Some(event) = finish_event(&props) {
                    events.push(event);
                } else {
                    debug!("Dropping VEVENT without SUMMARY or parseable DTSTART");
                }
            }
            continue;
        }
        if let (Some(props), Some(parsed)) = (current.as_mut(), split_property(&line)) {
            props.push(parsed);
        }
    }

    events
}

/// Calendar display name (`X-WR-CALNAME`), if the feed carries one
pub fn calendar_name(body: &str) -> Option<String> {
    unfold_lines(body).into_iter().find_map(|line| {
        split_property(&line).and_then(|(name, _, value)| {
            (name == "X-WR-CALNAME" && !value.is_empty()).then_some(value)
        })
    })
}

fn finish_event(props: &[(String, Vec<(String, String)>, String)]) -> Option<ParsedEvent> {
    let mut title = String::new();
    let mut start = None;
    let mut end = None;
    let mut location = None;
    let mut status = None;
    let mut raw = serde_json::Map::new();

    for (name, params, value) in props {
        raw.insert(name.to_ascii_lowercase(), json!(value));
        match name.as_str() {
            "SUMMARY" => title = unescape_text(value),
            "DTSTART" => start = parse_ics_datetime(value, params),
            "DTEND" => end = parse_ics_datetime(value, params),
            "LOCATION" => {
                let text = unescape_text(value);
                if !text.is_empty() {
                    location = Some(text);
                }
            }
            "STATUS" => status = Some(map_status(value)),
            _ => {}
        }
    }

    if title.is_empty() {
        return None;
    }
    Some(ParsedEvent {
        title,
        raw_title: None,
        start_at: start?,
        end_at: end,
        location,
        status,
        raw: Some(serde_json::Value::Object(raw)),
        row_index: None,
    })
}

/// Unfold iCalendar line continuations (lines starting with space or tab)
fn unfold_lines(data: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();

    for raw_line in data.lines() {
        // Strip trailing \r that may remain from \r\n line endings
        let line = raw_line.trim_end_matches('\r');

        if line.starts_with(' ') || line.starts_with('\t') {
            // Continuation line, append without the leading whitespace
            current.push_str(&line[1..]);
        } else {
            if !current.is_empty() {
                result.push(current);
            }
            current = line.to_string();
        }
    }
    if !current.is_empty() {
        result.push(current);
    }

    result
}

/// Split `NAME;PARAM=V;PARAM2=V2:value` into its parts
fn split_property(line: &str) -> Option<(String, Vec<(String, String)>, String)> {
    let colon = line.find(':')?;
    let (head, value) = (&line[..colon], &line[colon + 1..]);

    let mut segments = head.split(';');
    let name = segments.next()?.trim().to_ascii_uppercase();
    if name.is_empty() {
        return None;
    }

    let params = segments
        .filter_map(|segment| {
            let (key, value) = segment.split_once('=')?;
            Some((key.trim().to_ascii_uppercase(), value.trim().to_string()))
        })
        .collect();

    Some((name, params, value.trim().to_string()))
}

/// Parse an ICS date or date-time value to UTC
///
/// Forms: `...Z` (UTC), naive with a `TZID` parameter (converted through
/// the IANA zone, falling back to floating on unknown zones), bare naive
/// (floating, read as UTC), and `VALUE=DATE` / bare dates (midnight UTC).
fn parse_ics_datetime(value: &str, params: &[(String, String)]) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Some(stripped) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S").ok()?;
        return Some(naive.and_utc());
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S") {
        let tzid = params
            .iter()
            .find(|(key, _)| key == "TZID")
            .map(|(_, value)| value.as_str());
        if let Some(tz) = tzid.and_then(|name| name.parse::<Tz>().ok()) {
            return tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc));
        }
        return Some(naive.and_utc());
    }

    // VALUE=DATE or a bare 8-digit date
    let date = NaiveDate::parse_from_str(value, "%Y%m%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

fn map_status(value: &str) -> EventStatus {
    match value.trim().to_ascii_uppercase().as_str() {
        "CANCELLED" => EventStatus::Cancelled,
        "TENTATIVE" => EventStatus::Tentative,
        _ => EventStatus::Confirmed,
    }
}

/// Undo RFC 5545 text escaping
fn unescape_text(value: &str) -> String {
    value
        .replace("\\n", "\n")
        .replace("\\N", "\n")
        .replace("\\,", ",")
        .replace("\\;", ";")
        .replace("\\\\", "\\")
        .trim()
        .to_string()
}
