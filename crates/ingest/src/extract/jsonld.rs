//! JSON-LD event collection from `<script type="application/ld+json">`
//!
//! Each script document is parsed independently; unparseable JSON and
//! non-Event nodes are skipped. Nodes are classified into explicit
//! variants before extraction so the walk stays total.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use scraper::{Html, Selector};
use serde_json::Value;
use teammeet_core::models::EventStatus;
use teammeet_core::ParsedEvent;

/// Node classification for the JSON-LD walk
enum LdNode<'a> {
    Event(&'a serde_json::Map<String, Value>),
    Graph(&'a Vec<Value>),
    Other,
}

/// Collect events from every JSON-LD script in the page
pub fn extract_jsonld_events(html: &str) -> Vec<ParsedEvent> {
    let document = Html::parse_document(html);
    let selector =
        Selector::parse(r#"script[type="application/ld+json"]"#).expect("static selector");

    let mut events = Vec::new();
    for script in document.select(&selector) {
        let text: String = script.text().collect();
        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        walk(&value, &mut events);
    }

    events
}

fn walk(value: &Value, events: &mut Vec<ParsedEvent>) {
    if let Value::Array(items) = value {
        for item in items {
            walk(item, events);
        }
        return;
    }

    match classify(value) {
        LdNode::Event(map) => {
            if let Some(event) = event_from_node(map) {
                events.push(event);
            }
        }
        LdNode::Graph(items) => {
            for item in items {
                walk(item, events);
            }
        }
        LdNode::Other => {}
    }
}

fn classify(value: &Value) -> LdNode<'_> {
    let Value::Object(map) = value else {
        return LdNode::Other;
    };

    if let Some(Value::Array(graph)) = map.get("@graph") {
        return LdNode::Graph(graph);
    }

    let is_event = match map.get("@type") {
        Some(Value::String(ty)) => ty == "Event" || ty.contains("Event"),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|ty| ty == "Event" || ty.contains("Event")),
        _ => false,
    };

    if is_event { LdNode::Event(map) } else { LdNode::Other }
}

fn event_from_node(map: &serde_json::Map<String, Value>) -> Option<ParsedEvent> {
    let title = map.get("name").and_then(Value::as_str)?.trim().to_string();
    if title.is_empty() {
        return None;
    }

    let start_at = parse_ld_date(map.get("startDate").and_then(Value::as_str)?)?;
    let end_at = map
        .get("endDate")
        .and_then(Value::as_str)
        .and_then(parse_ld_date);
    let location = map.get("location").and_then(location_text);

    let status = map
        .get("eventStatus")
        .and_then(Value::as_str)
        .and_then(|status| {
            let lowered = status.to_ascii_lowercase();
            if lowered.contains("cancel") {
                Some(EventStatus::Cancelled)
            } else if lowered.contains("tentative") {
                Some(EventStatus::Tentative)
            } else {
                None
            }
        });

    Some(ParsedEvent {
        title,
        raw_title: None,
        start_at,
        end_at,
        location,
        status,
        raw: Some(Value::Object(map.clone())),
        row_index: None,
    })
}

/// Location is a string or a nested `{name | address | {streetAddress}}`
fn location_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            if let Some(name) = map.get("name").and_then(Value::as_str) {
                name.to_string()
            } else {
                match map.get("address") {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Object(address)) => address
                        .get("streetAddress")
                        .and_then(Value::as_str)?
                        .to_string(),
                    _ => return None,
                }
            }
        }
        _ => return None,
    };

    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn parse_ld_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(script: &str) -> String {
        format!(
            r#"<html><head><script type="application/ld+json">{script}</script></head><body></body></html>"#
        )
    }

    #[test]
    fn test_single_event() {
        let html = page(
            r#"{"@type":"Event","name":"Meet","startDate":"2025-03-01T16:00:00Z","location":{"name":"Gym"}}"#,
        );
        let events = extract_jsonld_events(&html);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Meet");
        assert_eq!(
            events[0].start_at,
            "2025-03-01T16:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(events[0].location.as_deref(), Some("Gym"));
        assert!(events[0].end_at.is_none());
    }

    #[test]
    fn test_graph_recursion() {
        let html = page(
            r#"{"@graph":[{"@type":"Event","name":"A","startDate":"2025-03-01T16:00:00Z"},{"@type":"WebPage","name":"ignored"},{"@type":"Event","name":"B","startDate":"2025-03-02T16:00:00Z"}]}"#,
        );
        let events = extract_jsonld_events(&html);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].title, "A");
        assert_eq!(events[1].title, "B");
    }

    #[test]
    fn test_subtype_containing_event_is_accepted() {
        let html = page(
            r#"{"@type":"SportsEvent","name":"Match","startDate":"2025-03-01T16:00:00Z"}"#,
        );
        assert_eq!(extract_jsonld_events(&html).len(), 1);
    }

    #[test]
    fn test_type_array() {
        let html = page(
            r#"{"@type":["Thing","Event"],"name":"Match","startDate":"2025-03-01T16:00:00Z"}"#,
        );
        assert_eq!(extract_jsonld_events(&html).len(), 1);
    }

    #[test]
    fn test_location_shapes() {
        for (location, expected) in [
            (r#""Main Gym""#, "Main Gym"),
            (r#"{"name":"Main Gym"}"#, "Main Gym"),
            (r#"{"address":"1 Main St"}"#, "1 Main St"),
            (r#"{"address":{"streetAddress":"1 Main St"}}"#, "1 Main St"),
        ] {
            let html = page(&format!(
                r#"{{"@type":"Event","name":"X","startDate":"2025-03-01T16:00:00Z","location":{location}}}"#
            ));
            let events = extract_jsonld_events(&html);
            assert_eq!(events[0].location.as_deref(), Some(expected), "for {location}");
        }
    }

    #[test]
    fn test_event_status_substrings() {
        let html = page(
            r#"[{"@type":"Event","name":"A","startDate":"2025-03-01T16:00:00Z","eventStatus":"https://schema.org/EventCancelled"},{"@type":"Event","name":"B","startDate":"2025-03-02T16:00:00Z","eventStatus":"EventScheduled"}]"#,
        );
        let events = extract_jsonld_events(&html);
        assert_eq!(events[0].status, Some(EventStatus::Cancelled));
        assert!(events[1].status.is_none());
    }

    #[test]
    fn test_malformed_json_is_skipped() {
        let html = format!(
            r#"<html><head>
            <script type="application/ld+json">{{not json</script>
            <script type="application/ld+json">{{"@type":"Event","name":"Good","startDate":"2025-03-01T16:00:00Z"}}</script>
            </head></html>"#
        );
        let events = extract_jsonld_events(&html);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Good");
    }

    #[test]
    fn test_missing_start_date_drops_event() {
        let html = page(r#"{"@type":"Event","name":"No start"}"#);
        assert!(extract_jsonld_events(&html).is_empty());
    }

    #[test]
    fn test_naive_and_date_only_start_dates() {
        let html = page(
            r#"[{"@type":"Event","name":"A","startDate":"2025-03-01T16:00:00"},{"@type":"Event","name":"B","startDate":"2025-03-02"}]"#,
        );
        let events = extract_jsonld_events(&html);
        assert_eq!(
            events[0].start_at,
            "2025-03-01T16:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(
            events[1].start_at,
            "2025-03-02T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }
}
