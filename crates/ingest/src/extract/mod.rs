//! Extraction and normalization
//!
//! Extractors emit [`ParsedEvent`]s; [`normalize_events`] sanitizes
//! titles, fills missing ends, and hashes the stable per-event id.

pub mod datetime;
pub mod embedded;
pub mod ics;
pub mod jsonld;
pub mod table;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;
use teammeet_core::{NormalizedEvent, ParsedEvent};

/// Bracketed vendor garnish: "(Live Stream)", "[TV: ESPN+]", ...
static BRACKETED_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*[\(\[][^\)\]]*(stream|broadcast|tickets|watch|listen|video|tv)[^\)\]]*[\)\]]")
        .expect("static regex")
});

/// Trailing vendor garnish: "... - Watch Live", "... | Buy Tickets"
static TRAILING_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*[-|–]\s*(watch live|live stream|live stats|live video|buy tickets|tickets|broadcast)\s*$")
        .expect("static regex")
});

/// Strip vendor-injected stream/broadcast/ticket markers from a title
///
/// The sanitized value is what users see. Never feed the result back
/// into the id hash; ids stay keyed on the raw title so tightening
/// these rules later cannot re-identify existing events.
pub fn sanitize_event_title(title: &str) -> String {
    let stripped = BRACKETED_MARKER.replace_all(title, "");
    let stripped = TRAILING_MARKER.replace_all(&stripped, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stable per-event id: lower-hex SHA-256 over the hash title, start,
/// location, and (for vendors that need it) the row index
pub fn event_uid(
    title_for_hash: &str,
    start_at: DateTime<Utc>,
    location: Option<&str>,
    row_index: Option<usize>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title_for_hash);
    hasher.update("|");
    hasher.update(start_at.to_rfc3339_opts(SecondsFormat::Secs, true));
    hasher.update("|");
    hasher.update(location.unwrap_or(""));
    if let Some(idx) = row_index {
        hasher.update("|");
        hasher.update(idx.to_string());
    }

    format!("{:x}", hasher.finalize())
}

/// Convert extractor output into reconciler input
///
/// Fills a two-hour default end and hashes the id from the raw title
/// when the extractor kept one.
pub fn normalize_events(parsed: Vec<ParsedEvent>) -> Vec<NormalizedEvent> {
    parsed
        .into_iter()
        .map(|event| {
            let title_for_hash = event.raw_title.as_deref().unwrap_or(&event.title);
            let external_uid = event_uid(
                title_for_hash,
                event.start_at,
                event.location.as_deref(),
                event.row_index,
            );
            NormalizedEvent {
                external_uid,
                title: sanitize_event_title(&event.title),
                start_at: event.start_at,
                end_at: Some(
                    event
                        .end_at
                        .unwrap_or(event.start_at + Duration::hours(2)),
                ),
                location: event.location,
                status: event.status,
                raw: event.raw,
            }
        })
        .collect()
}
