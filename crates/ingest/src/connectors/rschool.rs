//! School activity-scheduler connector (rschool)
//!
//! These pages usually embed schedule state as JSON-LD or a JS global;
//! older installs only render a table. Many installs also expose a
//! vendor-side feed URL which, when present, is fetched in a second hop
//! and used instead of the page body.

use async_trait::async_trait;
use teammeet_core::vendor::{markers_for_vendor, vendor_for_host, VENDOR_RSCHOOL};
use teammeet_core::{IngestResult, NormalizedEvent};
use tracing::debug;
use url::Url;

use super::{
    cap_preview, extract_html_events, find_linked_url, page_title, reconcile_into_outcome,
    Connector, ConnectorContext, Detection, Preview, PreviewArgs, SyncArgs, SyncOutcome, UrlProbe,
};
use crate::extract::normalize_events;
use crate::fetch::{FetchOptions, FetchedPage};

/// Needles marking the vendor-side schedule feed inside page markup
const SUB_SCHEDULE_NEEDLES: &[&str] = &["schedulefeed", "schedule.json"];

pub struct RschoolConnector;

impl RschoolConnector {
    async fn load_events(
        ctx: &ConnectorContext<'_>,
        url: &str,
        opts: &FetchOptions,
        now: chrono::DateTime<chrono::Utc>,
    ) -> IngestResult<(Vec<NormalizedEvent>, FetchedPage)> {
        let page = ctx.fetcher.fetch(url, opts).await?;

        // Prefer the vendor-side feed when the page references one
        let body = match find_linked_url(&page.text, &page.final_url, SUB_SCHEDULE_NEEDLES) {
            Some(feed_url) => {
                debug!(feed = %feed_url, "Following vendor schedule feed");
                ctx.fetcher.fetch(feed_url.as_str(), opts).await?.text
            }
            None => page.text.clone(),
        };

        let events = normalize_events(extract_html_events(&body, now, false));
        Ok((events, page))
    }

    fn fetch_opts(org_id: teammeet_core::types::OrgId, user_id: Option<teammeet_core::types::UserId>) -> FetchOptions {
        FetchOptions::full()
            .with_org(org_id)
            .with_user(user_id)
            .with_vendor(VENDOR_RSCHOOL)
    }
}

#[async_trait]
impl Connector for RschoolConnector {
    fn vendor(&self) -> &'static str {
        VENDOR_RSCHOOL
    }

    fn can_handle(&self, probe: &UrlProbe<'_>) -> Detection {
        if let Ok(url) = Url::parse(probe.url) {
            if let Some(host) = url.host_str() {
                if vendor_for_host(host) == Some(VENDOR_RSCHOOL) {
                    return Detection::at(0.75, "vendor_host");
                }
            }
        }

        let markers = markers_for_vendor(VENDOR_RSCHOOL);
        let url_lowered = probe.url.to_ascii_lowercase();
        let marker_hit = markers.iter().any(|marker| {
            let marker = marker.to_ascii_lowercase();
            url_lowered.contains(&marker)
                || probe
                    .html
                    .is_some_and(|html| html.to_ascii_lowercase().contains(&marker))
        });
        if marker_hit {
            return Detection::at(0.55, "vendor_marker");
        }

        Detection::none()
    }

    async fn preview(
        &self,
        ctx: &ConnectorContext<'_>,
        args: &PreviewArgs<'_>,
    ) -> IngestResult<Preview> {
        let opts = Self::fetch_opts(args.org_id, args.user_id);
        let (events, page) = Self::load_events(ctx, args.url, &opts, args.now).await?;

        Ok(Preview {
            vendor: VENDOR_RSCHOOL.to_string(),
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
        reconcile_into_outcome(ctx, args, VENDOR_RSCHOOL, events).await
    }
}
