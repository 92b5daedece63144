//! Per-vendor sync strategies
//!
//! A connector knows how to recognize (`can_handle`), sample
//! (`preview`), and fully synchronize (`sync`) one class of source URL.
//! Connectors never write run status; that belongs to the source runner.

pub mod generic;
pub mod google;
pub mod ics;
pub mod rschool;
pub mod sidearm;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::HeaderMap;
use teammeet_core::types::{OrgId, SourceId, UserId};
use teammeet_core::{IngestResult, NormalizedEvent, ParsedEvent, SyncCounts, SyncWindow};
use url::Url;

use crate::extract::{embedded, jsonld, table};
use crate::fetch::SafeFetcher;
use crate::reconcile::{self, ReconcileArgs, ScheduleEventStore};

/// Preview returns at most this many events
const PREVIEW_LIMIT: usize = 20;

/// What the detector knows about a URL when probing connectors
#[derive(Debug, Clone, Copy)]
pub struct UrlProbe<'a> {
    pub url: &'a str,
    pub html: Option<&'a str>,
    pub headers: Option<&'a HeaderMap>,
}

impl<'a> UrlProbe<'a> {
    pub fn url_only(url: &'a str) -> Self {
        Self {
            url,
            html: None,
            headers: None,
        }
    }
}

/// A connector's claim on a URL
#[derive(Debug, Clone)]
pub struct Detection {
    pub confidence: f64,
    pub reason: Option<&'static str>,
}

impl Detection {
    pub fn none() -> Self {
        Self {
            confidence: 0.0,
            reason: None,
        }
    }

    pub fn at(confidence: f64, reason: &'static str) -> Self {
        Self {
            confidence,
            reason: Some(reason),
        }
    }

    pub fn ok(&self) -> bool {
        self.confidence > 0.0
    }
}

/// Shared dependencies handed to preview and sync
pub struct ConnectorContext<'a> {
    pub fetcher: &'a SafeFetcher,
    pub events: &'a dyn ScheduleEventStore,
}

/// Arguments for a read-only preview
#[derive(Debug, Clone)]
pub struct PreviewArgs<'a> {
    pub url: &'a str,
    pub org_id: OrgId,
    pub user_id: Option<UserId>,
    pub now: DateTime<Utc>,
}

/// Preview result: the first few normalized events plus whatever the
/// connector could infer about the source
#[derive(Debug, Clone)]
pub struct Preview {
    pub vendor: String,
    pub title: Option<String>,
    pub events: Vec<NormalizedEvent>,
    pub inferred_meta: Option<serde_json::Value>,
}

/// Arguments for a full sync
#[derive(Debug, Clone)]
pub struct SyncArgs<'a> {
    pub source_id: SourceId,
    pub org_id: OrgId,
    pub user_id: Option<UserId>,
    pub url: &'a str,
    pub window: SyncWindow,
    pub now: DateTime<Utc>,
}

/// Outcome of one connector sync
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub vendor: String,
    pub counts: SyncCounts,
    pub event_count: u32,
}

/// One class of schedule source
#[async_trait]
pub trait Connector: Send + Sync {
    /// Vendor tag reported on previews and sync outcomes
    fn vendor(&self) -> &'static str;

    /// How confidently this connector claims the URL
    fn can_handle(&self, probe: &UrlProbe<'_>) -> Detection;

    /// Read-only sample of the source; never writes
    async fn preview(
        &self,
        ctx: &ConnectorContext<'_>,
        args: &PreviewArgs<'_>,
    ) -> IngestResult<Preview>;

    /// Full extraction and reconciliation for one source
    async fn sync(
        &self,
        ctx: &ConnectorContext<'_>,
        args: &SyncArgs<'_>,
    ) -> IngestResult<SyncOutcome>;
}

impl std::fmt::Debug for dyn Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector").field("vendor", &self.vendor()).finish()
    }
}

/// Sort by start time and cap to the preview size
pub(crate) fn cap_preview(mut events: Vec<NormalizedEvent>) -> Vec<NormalizedEvent> {
    events.sort_by_key(|e| e.start_at);
    events.truncate(PREVIEW_LIMIT);
    events
}

/// Reconcile normalized events and assemble the outcome
pub(crate) async fn reconcile_into_outcome(
    ctx: &ConnectorContext<'_>,
    args: &SyncArgs<'_>,
    vendor: &str,
    events: Vec<NormalizedEvent>,
) -> IngestResult<SyncOutcome> {
    let event_count = u32::try_from(events.len()).unwrap_or(u32::MAX);
    let counts = reconcile::sync_schedule_events(
        ctx.events,
        &ReconcileArgs {
            org_id: args.org_id,
            source_id: args.source_id,
            window: args.window,
            now: args.now,
        },
        events,
    )
    .await?;

    Ok(SyncOutcome {
        vendor: vendor.to_string(),
        counts,
        event_count,
    })
}

/// HTML extraction pipeline shared by the vendor connectors:
/// JSON-LD, then embedded JSON, then tables
pub(crate) fn extract_html_events(
    html: &str,
    now: DateTime<Utc>,
    row_index_tables: bool,
) -> Vec<ParsedEvent> {
    let events = jsonld::extract_jsonld_events(html);
    if !events.is_empty() {
        return events;
    }
    let events = embedded::extract_embedded_events(html, now);
    if !events.is_empty() {
        return events;
    }
    table::extract_table_events(html, now, row_index_tables)
}

/// First quoted URL in the body whose text contains one of the needles
/// (case-insensitive), resolved against the fetched page
pub(crate) fn find_linked_url(html: &str, base: &Url, needles: &[&str]) -> Option<Url> {
    static QUOTED: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
        Regex::new(r#"["']([^"'<>\s]+)["']"#).expect("static regex")
    });

    for capture in QUOTED.captures_iter(html) {
        let candidate = &capture[1];
        let lowered = candidate.to_ascii_lowercase();
        if needles.iter().any(|needle| lowered.contains(needle)) {
            if let Ok(resolved) = base.join(candidate) {
                return Some(resolved);
            }
        }
    }
    None
}

/// Page `<title>`, when the body has one
pub(crate) fn page_title(html: &str) -> Option<String> {
    let document = scraper::Html::parse_document(html);
    let selector = scraper::Selector::parse("title").expect("static selector");
    let title: String = document.select(&selector).next()?.text().collect();
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}
