//! Generic schedule-table scraping
//!
//! Reads `thead th` as the header vector, locates columns by substring,
//! and assembles one event per `tbody tr`. Rows without a parseable
//! date are dropped. Titles fall back from the explicit title column to
//! a `{gender sport} - {away vs home | event type}` assembly, then to
//! a bare "Event".

use chrono::{DateTime, Duration, Utc};
use scraper::{ElementRef, Html, Selector};
use serde_json::json;
use teammeet_core::ParsedEvent;

use super::datetime::{combine_date_time, parse_datetime};

struct ColumnMap {
    date: Option<usize>,
    time: Option<usize>,
    title: Option<usize>,
    location: Option<usize>,
    home: Option<usize>,
    away: Option<usize>,
    sport: Option<usize>,
    gender: Option<usize>,
    event_type: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &[String]) -> Self {
        let find = |needles: &[&str]| {
            headers
                .iter()
                .position(|h| needles.iter().any(|needle| h.contains(needle)))
        };

        Self {
            date: find(&["date"]),
            time: find(&["time"]),
            title: headers.iter().position(|h| {
                h.contains("opponent")
                    || h.contains("match")
                    || (h.contains("event") && !h.contains("event type"))
            }),
            location: find(&["location", "site", "facility", "venue"]),
            home: find(&["home"]),
            away: find(&["away"]),
            sport: find(&["sport"]),
            gender: find(&["gender"]),
            event_type: find(&["event type"]),
        }
    }
}

/// Scrape every `<table>` in the page for schedule rows
///
/// `with_row_index` marks each event with its position so vendors that
/// repeat identical `(title, start, location)` triples still produce
/// distinct ids.
pub fn extract_table_events(
    html: &str,
    now: DateTime<Utc>,
    with_row_index: bool,
) -> Vec<ParsedEvent> {
    let document = Html::parse_document(html);
    let table_selector = Selector::parse("table").expect("static selector");
    let header_selector = Selector::parse("thead th").expect("static selector");
    let row_selector = Selector::parse("tbody tr").expect("static selector");
    let cell_selector = Selector::parse("td, th").expect("static selector");

    let mut events = Vec::new();
    let mut row_index = 0usize;

    for table in document.select(&table_selector) {
        let headers: Vec<String> = table
            .select(&header_selector)
            .map(|th| cell_text(&th).to_ascii_lowercase())
            .collect();
        let Some(columns) = headers
            .iter()
            .any(|h| !h.is_empty())
            .then(|| ColumnMap::from_headers(&headers))
        else {
            continue;
        };
        if columns.date.is_none() {
            continue;
        }

        for row in table.select(&row_selector) {
            let cells: Vec<String> = row.select(&cell_selector).map(|c| cell_text(&c)).collect();
            if let Some(event) =
                event_from_row(&headers, &columns, &cells, now, with_row_index.then_some(row_index))
            {
                events.push(event);
                row_index += 1;
            }
        }
    }

    events
}

fn event_from_row(
    headers: &[String],
    columns: &ColumnMap,
    cells: &[String],
    now: DateTime<Utc>,
    row_index: Option<usize>,
) -> Option<ParsedEvent> {
    let cell = |idx: Option<usize>| -> &str {
        idx.and_then(|i| cells.get(i)).map_or("", String::as_str)
    };

    let date_text = cell(columns.date);
    if date_text.is_empty() {
        return None;
    }
    let time_text = cell(columns.time);
    let combined = combine_date_time(date_text, (!time_text.is_empty()).then_some(time_text));
    let start_at = parse_datetime(&combined, now)?;

    let title_text = cell(columns.title);
    let title = assemble_title(
        title_text,
        cell(columns.gender),
        cell(columns.sport),
        cell(columns.away),
        cell(columns.home),
        cell(columns.event_type),
    );

    let location = {
        let text = cell(columns.location).trim();
        (!text.is_empty()).then(|| text.to_string())
    };

    let raw: serde_json::Map<String, serde_json::Value> = headers
        .iter()
        .zip(cells.iter())
        .filter(|(header, _)| !header.is_empty())
        .map(|(header, value)| (header.clone(), json!(value)))
        .collect();

    Some(ParsedEvent {
        title,
        raw_title: None,
        start_at,
        // Table rows rarely carry an end; give them a fixed two hours
        end_at: Some(start_at + Duration::hours(2)),
        location,
        status: None,
        raw: Some(serde_json::Value::Object(raw)),
        row_index,
    })
}

fn assemble_title(
    title_text: &str,
    gender: &str,
    sport: &str,
    away: &str,
    home: &str,
    event_type: &str,
) -> String {
    if !title_text.trim().is_empty() {
        return title_text.trim().to_string();
    }

    let prefix = [gender.trim(), sport.trim()]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    let main = if !away.trim().is_empty() && !home.trim().is_empty() {
        format!("{} vs {}", away.trim(), home.trim())
    } else {
        event_type.trim().to_string()
    };

    match (prefix.is_empty(), main.is_empty()) {
        (false, false) => format!("{prefix} - {main}"),
        (true, false) => main,
        (false, true) => prefix,
        (true, true) => "Event".to_string(),
    }
}

fn cell_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2025-01-15T12:00:00Z".parse().unwrap()
    }

    const SCHEDULE: &str = r#"
        <table>
          <thead><tr><th>Date</th><th>Time</th><th>Opponent</th><th>Location</th></tr></thead>
          <tbody>
            <tr><td>5/3/2025</td><td>7:00 PM</td><td>Central High</td><td>Home Field</td></tr>
            <tr><td>5/10/2025</td><td>6:30 PM</td><td>North Academy</td><td>Away Gym</td></tr>
            <tr><td>TBD</td><td></td><td>West High</td><td></td></tr>
          </tbody>
        </table>"#;

    #[test]
    fn test_basic_schedule_table() {
        let events = extract_table_events(SCHEDULE, now(), false);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].title, "Central High");
        assert_eq!(
            events[0].start_at,
            "2025-05-03T19:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(events[0].location.as_deref(), Some("Home Field"));
        assert!(events[0].row_index.is_none());
    }

    #[test]
    fn test_end_defaults_to_two_hours() {
        let events = extract_table_events(SCHEDULE, now(), false);
        assert_eq!(
            events[0].end_at,
            Some(events[0].start_at + Duration::hours(2))
        );
    }

    #[test]
    fn test_row_indexes_when_requested() {
        let events = extract_table_events(SCHEDULE, now(), true);
        assert_eq!(events[0].row_index, Some(0));
        assert_eq!(events[1].row_index, Some(1));
    }

    #[test]
    fn test_title_assembly_from_sport_columns() {
        let html = r#"
            <table>
              <thead><tr><th>Date</th><th>Gender</th><th>Sport</th><th>Away</th><th>Home</th></tr></thead>
              <tbody><tr><td>5/3/2025</td><td>Girls</td><td>Soccer</td><td>North</td><td>South</td></tr></tbody>
            </table>"#;
        let events = extract_table_events(html, now(), false);
        assert_eq!(events[0].title, "Girls Soccer - North vs South");
    }

    #[test]
    fn test_title_assembly_from_event_type() {
        let html = r#"
            <table>
              <thead><tr><th>Date</th><th>Sport</th><th>Event Type</th></tr></thead>
              <tbody><tr><td>5/3/2025</td><td>Track</td><td>Invitational</td></tr></tbody>
            </table>"#;
        let events = extract_table_events(html, now(), false);
        assert_eq!(events[0].title, "Track - Invitational");
    }

    #[test]
    fn test_title_falls_back_to_event() {
        let html = r#"
            <table>
              <thead><tr><th>Date</th><th>Time</th></tr></thead>
              <tbody><tr><td>5/3/2025</td><td>7:00 PM</td></tr></tbody>
            </table>"#;
        let events = extract_table_events(html, now(), false);
        assert_eq!(events[0].title, "Event");
    }

    #[test]
    fn test_event_type_header_is_not_the_title_column() {
        let html = r#"
            <table>
              <thead><tr><th>Date</th><th>Event Type</th><th>Event</th></tr></thead>
              <tbody><tr><td>5/3/2025</td><td>League</td><td>Finals</td></tr></tbody>
            </table>"#;
        let events = extract_table_events(html, now(), false);
        assert_eq!(events[0].title, "Finals");
    }

    #[test]
    fn test_tables_without_date_header_are_skipped() {
        let html = r#"
            <table>
              <thead><tr><th>Name</th><th>Points</th></tr></thead>
              <tbody><tr><td>Standings</td><td>10</td></tr></tbody>
            </table>"#;
        assert!(extract_table_events(html, now(), false).is_empty());
    }

    #[test]
    fn test_raw_keeps_cell_map() {
        let events = extract_table_events(SCHEDULE, now(), false);
        let raw = events[0].raw.as_ref().unwrap();
        assert_eq!(raw["opponent"], "Central High");
        assert_eq!(raw["date"], "5/3/2025");
    }
}
