//! College athletics connector (sidearm umbrella)
//!
//! Covers the sidearmsports/prestosports page family. When the page
//! links an `.ics` export the connector delegates to the ICS pipeline
//! (the reported vendor stays `sidearm`); otherwise it runs the shared
//! HTML pipeline. Table rows carry their row index into the event id
//! because these sites routinely repeat identical
//! `(title, start, location)` triples on one page.

use async_trait::async_trait;
use scraper::{Html, Selector};
use teammeet_core::vendor::{markers_for_vendor, vendor_for_host, VENDOR_SIDEARM};
use teammeet_core::{IngestResult, NormalizedEvent};
use tracing::debug;
use url::Url;

use super::{
    cap_preview, extract_html_events, ics::IcsConnector, page_title, reconcile_into_outcome,
    Connector, ConnectorContext, Detection, Preview, PreviewArgs, SyncArgs, SyncOutcome, UrlProbe,
};
use crate::extract::normalize_events;
use crate::fetch::{FetchOptions, FetchedPage};

pub struct SidearmConnector;

impl SidearmConnector {
    /// First `.ics` link in the page, resolved against the final URL
    fn linked_ics(html: &str, base: &Url) -> Option<Url> {
        let document = Html::parse_document(html);
        let selector = Selector::parse("a[href]").expect("static selector");
        document.select(&selector).find_map(|a| {
            let href = a.value().attr("href")?;
            let resolved = base.join(href).ok()?;
            resolved
                .path()
                .to_ascii_lowercase()
                .ends_with(".ics")
                .then_some(resolved)
        })
    }

    async fn load_events(
        ctx: &ConnectorContext<'_>,
        url: &str,
        opts: &FetchOptions,
        now: chrono::DateTime<chrono::Utc>,
    ) -> IngestResult<(Vec<NormalizedEvent>, FetchedPage)> {
        let page = ctx.fetcher.fetch(url, opts).await?;

        if let Some(ics_url) = Self::linked_ics(&page.text, &page.final_url) {
            debug!(feed = %ics_url, "Delegating to linked ICS export");
            let (events, _) =
                IcsConnector::fetch_events(ctx, ics_url.as_str(), opts.clone()).await?;
            return Ok((events, page));
        }

        let events = normalize_events(extract_html_events(&page.text, now, true));
        Ok((events, page))
    }

    fn fetch_opts(org_id: teammeet_core::types::OrgId, user_id: Option<teammeet_core::types::UserId>) -> FetchOptions {
        FetchOptions::full()
            .with_org(org_id)
            .with_user(user_id)
            .with_vendor(VENDOR_SIDEARM)
    }
}

#[async_trait]
impl Connector for SidearmConnector {
    fn vendor(&self) -> &'static str {
        VENDOR_SIDEARM
    }

    fn can_handle(&self, probe: &UrlProbe<'_>) -> Detection {
        if let Ok(url) = Url::parse(probe.url) {
            if let Some(host) = url.host_str() {
                if vendor_for_host(host) == Some(VENDOR_SIDEARM) {
                    return Detection::at(0.75, "vendor_host");
                }
            }
        }

        let markers = markers_for_vendor(VENDOR_SIDEARM);
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
            vendor: VENDOR_SIDEARM.to_string(),
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
        reconcile_into_outcome(ctx, args, VENDOR_SIDEARM, events).await
    }
}
