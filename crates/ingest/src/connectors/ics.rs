//! ICS feed connector

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use teammeet_core::vendor::VENDOR_ICS;
use teammeet_core::{IngestResult, NormalizedEvent};
use url::Url;

use super::{
    cap_preview, reconcile_into_outcome, Connector, ConnectorContext, Detection, Preview,
    PreviewArgs, SyncArgs, SyncOutcome, UrlProbe,
};
use crate::extract::{ics, normalize_events};
use crate::fetch::FetchOptions;

pub struct IcsConnector;

impl IcsConnector {
    /// Fetch and normalize a feed; shared with the vendor connectors
    /// that delegate to a linked `.ics` file
    pub(crate) async fn fetch_events(
        ctx: &ConnectorContext<'_>,
        url: &str,
        opts: FetchOptions,
    ) -> IngestResult<(Vec<NormalizedEvent>, Option<String>)> {
        let page = ctx.fetcher.fetch(url, &opts).await?;
        let events = normalize_events(ics::parse_ics(&page.text));
        let name = ics::calendar_name(&page.text);
        Ok((events, name))
    }
}

#[async_trait]
impl Connector for IcsConnector {
    fn vendor(&self) -> &'static str {
        VENDOR_ICS
    }

    fn can_handle(&self, probe: &UrlProbe<'_>) -> Detection {
        let path_is_ics = Url::parse(probe.url)
            .map(|url| url.path().to_ascii_lowercase().ends_with(".ics"))
            .unwrap_or_else(|_| probe.url.to_ascii_lowercase().ends_with(".ics"));
        if path_is_ics {
            return Detection::at(0.95, "ics_extension");
        }

        let calendar_header = probe
            .headers
            .and_then(|headers| headers.get(CONTENT_TYPE))
            .and_then(|value| value.to_str().ok())
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/calendar"));
        if calendar_header {
            return Detection::at(0.9, "calendar_content_type");
        }

        Detection::none()
    }

    async fn preview(
        &self,
        ctx: &ConnectorContext<'_>,
        args: &PreviewArgs<'_>,
    ) -> IngestResult<Preview> {
        let opts = FetchOptions::full()
            .with_org(args.org_id)
            .with_user(args.user_id)
            .with_vendor(VENDOR_ICS);
        let (events, name) = Self::fetch_events(ctx, args.url, opts).await?;

        Ok(Preview {
            vendor: VENDOR_ICS.to_string(),
            title: name,
            events: cap_preview(events),
            inferred_meta: None,
        })
    }

    async fn sync(
        &self,
        ctx: &ConnectorContext<'_>,
        args: &SyncArgs<'_>,
    ) -> IngestResult<SyncOutcome> {
        let opts = FetchOptions::full()
            .with_org(args.org_id)
            .with_user(args.user_id)
            .with_vendor(VENDOR_ICS);
        let (events, _) = Self::fetch_events(ctx, args.url, opts).await?;
        reconcile_into_outcome(ctx, args, VENDOR_ICS, events).await
    }
}
