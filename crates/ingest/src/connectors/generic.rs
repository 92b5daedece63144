//! Generic table-scraping fallback
//!
//! Claims a page only when its body actually yields table events (the
//! domain allowlist was already enforced by the fetch that produced the
//! probe body). Pages that embed a recognized third-party schedule
//! widget are followed one hop to the widget's own page.

use async_trait::async_trait;
use chrono::Utc;
use teammeet_core::vendor::VENDOR_GENERIC;
use teammeet_core::{IngestResult, NormalizedEvent};
use tracing::debug;

use super::{
    cap_preview, find_linked_url, page_title, reconcile_into_outcome, Connector, ConnectorContext,
    Detection, Preview, PreviewArgs, SyncArgs, SyncOutcome, UrlProbe,
};
use crate::extract::{normalize_events, table};
use crate::fetch::{FetchOptions, FetchedPage};

/// Third-party schedule widgets worth a second hop
const EMBEDDED_SCHEDULE_NEEDLES: &[&str] = &["schedulegalaxy", "activityscheduler", "bigteams"];

pub struct GenericConnector;

impl GenericConnector {
    async fn load_events(
        ctx: &ConnectorContext<'_>,
        url: &str,
        opts: &FetchOptions,
        now: chrono::DateTime<chrono::Utc>,
    ) -> IngestResult<(Vec<NormalizedEvent>, FetchedPage)> {
        let page = ctx.fetcher.fetch(url, opts).await?;

        let body = match find_linked_url(&page.text, &page.final_url, EMBEDDED_SCHEDULE_NEEDLES) {
            Some(widget_url) => {
                debug!(widget = %widget_url, "Following embedded schedule widget");
                ctx.fetcher.fetch(widget_url.as_str(), opts).await?.text
            }
            None => page.text.clone(),
        };

        let events = normalize_events(table::extract_table_events(&body, now, false));
        Ok((events, page))
    }

    fn fetch_opts(org_id: teammeet_core::types::OrgId, user_id: Option<teammeet_core::types::UserId>) -> FetchOptions {
        FetchOptions::full()
            .with_org(org_id)
            .with_user(user_id)
            .with_vendor(VENDOR_GENERIC)
    }
}

#[async_trait]
impl Connector for GenericConnector {
    fn vendor(&self) -> &'static str {
        VENDOR_GENERIC
    }

    fn can_handle(&self, probe: &UrlProbe<'_>) -> Detection {
        let Some(html) = probe.html else {
            return Detection::none();
        };
        let table_events = table::extract_table_events(html, Utc::now(), false);
        if table_events.is_empty() {
            Detection::none()
        } else {
            Detection::at(0.4, "table_events")
        }
    }

    async fn preview(
        &self,
        ctx: &ConnectorContext<'_>,
        args: &PreviewArgs<'_>,
    ) -> IngestResult<Preview> {
        let opts = Self::fetch_opts(args.org_id, args.user_id);
        let (events, page) = Self::load_events(ctx, args.url, &opts, args.now).await?;

        Ok(Preview {
            vendor: VENDOR_GENERIC.to_string(),
            title: page_title(&page.text),
            events: cap_preview(events),
            inferred_meta: Some(serde_json::json!({ "final_url": page.final_url.as_str() })),
        })
    }

    async fn sync(
        &self,
        ctx: &ConnectorContext<'_>,
        args: &SyncArgs<'_>,
    ) -> IngestResult<SyncOutcome> {
        let opts = Self::fetch_opts(args.org_id, args.user_id);
        let (events, _) = Self::load_events(ctx, args.url, &opts, args.now).await?;
        reconcile_into_outcome(ctx, args, VENDOR_GENERIC, events).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEDULE: &str = r#"
        <table>
          <thead><tr><th>Date</th><th>Opponent</th></tr></thead>
          <tbody><tr><td>5/3/2025</td><td>Central</td></tr></tbody>
        </table>"#;

    #[test]
    fn test_claims_page_with_table_events() {
        let probe = UrlProbe {
            url: "https://school.example/schedule",
            html: Some(SCHEDULE),
            headers: None,
        };
        let detection = GenericConnector.can_handle(&probe);
        assert!((detection.confidence - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_needs_a_body_to_claim() {
        assert!(!GenericConnector
            .can_handle(&UrlProbe::url_only("https://school.example/schedule"))
            .ok());
    }

    #[test]
    fn test_table_without_events_not_claimed() {
        let probe = UrlProbe {
            url: "https://school.example/standings",
            html: Some("<table><thead><tr><th>Team</th></tr></thead></table>"),
            headers: None,
        };
        assert!(!GenericConnector.can_handle(&probe).ok());
    }
}
