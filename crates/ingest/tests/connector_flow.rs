//! Connector flows against a local mock server and the in-memory store

use std::sync::Arc;

use chrono::{DateTime, Utc};
use teammeet_core::types::{OrgId, SourceId};
use teammeet_core::SyncWindow;
use teammeet_ingest::connectors::google::UnconfiguredCalendar;
use teammeet_ingest::connectors::ics::IcsConnector;
use teammeet_ingest::connectors::rschool::RschoolConnector;
use teammeet_ingest::connectors::sidearm::SidearmConnector;
use teammeet_ingest::connectors::{Connector, ConnectorContext, PreviewArgs, SyncArgs};
use teammeet_ingest::reconcile::MemoryEventStore;
use teammeet_ingest::{AllowlistPolicy, ConnectorRegistry, FetchPolicy, SafeFetcher};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:a@x\r\nSUMMARY:Game\r\nDTSTART:20250210T170000Z\r\nDTEND:20250210T190000Z\r\nLOCATION:Field\r\nEND:VEVENT\r\nEND:VCALENDAR";

/// SHA-256("Game|2025-02-10T17:00:00Z|Field")
const GAME_UID: &str = "42bf312b6fe69b3690cd7a96c2d90491d90b74cbfa53d5062fca1c05811ae6ef";

fn test_fetcher() -> SafeFetcher {
    SafeFetcher::with_policy(AllowlistPolicy::Skip, FetchPolicy::permissive()).unwrap()
}

fn now() -> DateTime<Utc> {
    "2025-02-01T00:00:00Z".parse().unwrap()
}

fn preview_args(url: &str) -> PreviewArgs<'_> {
    PreviewArgs {
        url,
        org_id: OrgId::new(),
        user_id: None,
        now: now(),
    }
}

fn sync_args<'a>(url: &'a str, source_id: SourceId) -> SyncArgs<'a> {
    SyncArgs {
        source_id,
        org_id: OrgId::new(),
        user_id: None,
        url,
        window: SyncWindow::new(
            "2025-02-01T00:00:00Z".parse().unwrap(),
            "2025-02-28T00:00:00Z".parse().unwrap(),
        ),
        now: now(),
    }
}

#[tokio::test]
async fn ics_preview_happy_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/team.ics"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(FEED, "text/calendar"))
        .mount(&server)
        .await;

    let fetcher = test_fetcher();
    let store = MemoryEventStore::new();
    let ctx = ConnectorContext {
        fetcher: &fetcher,
        events: &store,
    };

    let url = format!("{}/team.ics", server.uri());
    let preview = IcsConnector.preview(&ctx, &preview_args(&url)).await.unwrap();

    assert_eq!(preview.vendor, "ics");
    assert_eq!(preview.events.len(), 1);
    let event = &preview.events[0];
    assert_eq!(event.title, "Game");
    assert_eq!(
        event.start_at,
        "2025-02-10T17:00:00Z".parse::<DateTime<Utc>>().unwrap()
    );
    assert_eq!(
        event.end_at,
        Some("2025-02-10T19:00:00Z".parse::<DateTime<Utc>>().unwrap())
    );
    assert_eq!(event.location.as_deref(), Some("Field"));
    assert_eq!(event.external_uid, GAME_UID);

    // Preview is read-only
    assert_eq!(store.row_count(), 0);
}

#[tokio::test]
async fn ics_sync_is_idempotent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/team.ics"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(FEED, "text/calendar"))
        .mount(&server)
        .await;

    let fetcher = test_fetcher();
    let store = MemoryEventStore::new();
    let ctx = ConnectorContext {
        fetcher: &fetcher,
        events: &store,
    };

    let url = format!("{}/team.ics", server.uri());
    let source_id = SourceId::new();

    let first = IcsConnector.sync(&ctx, &sync_args(&url, source_id)).await.unwrap();
    assert_eq!(first.event_count, 1);
    assert_eq!(first.counts.imported, 1);
    assert_eq!(first.counts.updated, 0);
    assert_eq!(first.counts.cancelled, 0);

    let second = IcsConnector.sync(&ctx, &sync_args(&url, source_id)).await.unwrap();
    assert_eq!(second.counts.imported, 0);
    assert_eq!(second.counts.updated, 1);
    assert_eq!(second.counts.cancelled, 0);

    let row = store.row(source_id, GAME_UID).unwrap();
    assert_eq!(row.title, "Game");
}

#[tokio::test]
async fn rschool_preview_reads_jsonld() {
    let server = MockServer::start().await;
    let html = r#"<html><head><title>District Athletics</title>
        <script type="application/ld+json">{"@type":"Event","name":"Meet","startDate":"2025-03-01T16:00:00Z","location":{"name":"Gym"}}</script>
        </head><body></body></html>"#;
    Mock::given(method("GET"))
        .and(path("/schedule"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .mount(&server)
        .await;

    let fetcher = test_fetcher();
    let store = MemoryEventStore::new();
    let ctx = ConnectorContext {
        fetcher: &fetcher,
        events: &store,
    };

    let url = format!("{}/schedule", server.uri());
    let preview = RschoolConnector.preview(&ctx, &preview_args(&url)).await.unwrap();

    assert_eq!(preview.vendor, "rschool");
    assert_eq!(preview.title.as_deref(), Some("District Athletics"));
    assert_eq!(preview.events.len(), 1);
    let event = &preview.events[0];
    assert_eq!(event.title, "Meet");
    assert_eq!(event.location.as_deref(), Some("Gym"));
    // No endDate in the page: the extractor default applies
    assert_eq!(
        event.end_at,
        Some("2025-03-01T18:00:00Z".parse::<DateTime<Utc>>().unwrap())
    );
}

#[tokio::test]
async fn sidearm_delegates_to_linked_ics_feed() {
    let server = MockServer::start().await;
    let html = r#"<html><body><a href="/feed.ics">Subscribe</a></body></html>"#;
    Mock::given(method("GET"))
        .and(path("/schedule"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed.ics"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(FEED, "text/calendar"))
        .mount(&server)
        .await;

    let fetcher = test_fetcher();
    let store = MemoryEventStore::new();
    let ctx = ConnectorContext {
        fetcher: &fetcher,
        events: &store,
    };

    let url = format!("{}/schedule", server.uri());
    let preview = SidearmConnector.preview(&ctx, &preview_args(&url)).await.unwrap();

    // The vendor stays sidearm, the events come from the ICS feed
    assert_eq!(preview.vendor, "sidearm");
    assert_eq!(preview.events.len(), 1);
    assert_eq!(preview.events[0].title, "Game");
    assert_eq!(preview.events[0].external_uid, GAME_UID);
}

#[tokio::test]
async fn detection_probes_body_markers_after_one_fetch() {
    let server = MockServer::start().await;
    let html = r#"<html><script>window.__SIDARM_DATA__ = {"events":[]}</script></html>"#;
    Mock::given(method("GET"))
        .and(path("/schedule"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .mount(&server)
        .await;

    let fetcher = test_fetcher();
    let registry = ConnectorRegistry::with_defaults(Arc::new(UnconfiguredCalendar));

    let url = format!("{}/schedule", server.uri());
    let (connector, confidence) = registry.detect(&fetcher, &url, None).await.unwrap();

    assert_eq!(connector.vendor(), "sidearm");
    assert!((confidence - 0.55).abs() < f64::EPSILON);
}

#[tokio::test]
async fn detection_fails_cleanly_on_unrecognized_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<html><p>About us</p></html>", "text/html"),
        )
        .mount(&server)
        .await;

    let fetcher = test_fetcher();
    let registry = ConnectorRegistry::with_defaults(Arc::new(UnconfiguredCalendar));

    let url = format!("{}/about", server.uri());
    let err = registry.detect(&fetcher, &url, None).await.unwrap_err();
    assert_eq!(err.kind(), "no_connector");
}

#[tokio::test]
async fn detection_reads_calendar_content_type_without_extension() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendar"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(FEED, "text/calendar"))
        .mount(&server)
        .await;

    let fetcher = test_fetcher();
    let registry = ConnectorRegistry::with_defaults(Arc::new(UnconfiguredCalendar));

    let url = format!("{}/calendar", server.uri());
    let (connector, confidence) = registry.detect(&fetcher, &url, None).await.unwrap();

    assert_eq!(connector.vendor(), "ics");
    assert!((confidence - 0.9).abs() < f64::EPSILON);
}
