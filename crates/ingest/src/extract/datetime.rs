//! Date/time normalization for scraped schedule cells
//!
//! Vendors render dates inconsistently ("May 3, 2025", "5/3/2025",
//! "2025-05-03", with or without a time cell, sometimes glued together).
//! We normalize the text into one string and make a single permissive
//! parse attempt; rows that still fail to parse are dropped by the
//! caller.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_english::{parse_date_string, Dialect};
use regex::Regex;
use std::sync::LazyLock;

/// Glued year + time, e.g. "May 3, 20257:00pm"
static GLUED_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})(\d{1,2}:\d{2})").expect("static regex"));

/// Missing space before a meridiem suffix, e.g. "7:00pm"
static GLUED_MERIDIEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d)(am|pm)\b").expect("static regex"));

/// Does the text already carry a time of day?
static HAS_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\d{1,2}:\d{2}|\d\s*(am|pm)\b").expect("static regex"));

/// Timestamp formats seen across vendor tables
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%y %I:%M %p",
    "%m/%d/%Y %H:%M",
    "%B %d, %Y %I:%M %p",
    "%b %d, %Y %I:%M %p",
    "%B %d %Y %I:%M %p",
    "%b %d %Y %I:%M %p",
];

/// Date-only formats, interpreted as midnight UTC
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
];

/// Combine a date cell and an optional time cell into one parseable string
pub fn combine_date_time(date_text: &str, time_text: Option<&str>) -> String {
    let date = collapse_whitespace(date_text);
    let time = time_text.map(collapse_whitespace).unwrap_or_default();

    // Skip concatenation when the date cell already carries the time or
    // the vendor repeated the same text in both cells
    let combined = if time.is_empty() || HAS_TIME.is_match(&date) || date == time {
        date
    } else {
        format!("{date} {time}")
    };

    let combined = GLUED_TIME.replace_all(&combined, "$1 $2");
    GLUED_MERIDIEM.replace_all(&combined, "$1 $2").into_owned()
}

/// One permissive parse attempt; `None` drops the row
///
/// `now` anchors year-less dates so a schedule page without years still
/// resolves near the sync run.
pub fn parse_datetime(input: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let normalized = collapse_whitespace(input);
    if normalized.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, format) {
            return Some(naive.and_utc());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&normalized, format) {
            return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
        }
    }

    // Natural-language fallback ("May 3 7pm", "Friday 6:30 pm")
    parse_date_string(&normalized, now, Dialect::Us).ok()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
