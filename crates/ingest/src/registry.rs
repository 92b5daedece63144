//! Connector registry and URL detection
//!
//! Detection prefers verdicts that need no network: the `google://`
//! scheme and the `.ics` extension. Everything else costs exactly one
//! verify-mode fetch, whose headers and body are offered to every
//! connector.

use std::sync::Arc;

use teammeet_core::types::OrgId;
use teammeet_core::vendor::{expand_vendor_aliases, VENDOR_GOOGLE, VENDOR_ICS};
use teammeet_core::{IngestError, IngestResult};
use tracing::debug;

use crate::connectors::generic::GenericConnector;
use crate::connectors::google::{AuthorizedCalendar, GoogleConnector};
use crate::connectors::ics::IcsConnector;
use crate::connectors::rschool::RschoolConnector;
use crate::connectors::sidearm::SidearmConnector;
use crate::connectors::{Connector, UrlProbe};
use crate::fetch::{FetchOptions, SafeFetcher};

const GOOGLE_SCHEME: &str = "google://";

/// All known connectors, in probe order
pub struct ConnectorRegistry {
    connectors: Vec<Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    /// Standard registry; the calendar client is injected because
    /// authorized-calendar credentials live outside the core
    pub fn with_defaults(calendar: Arc<dyn AuthorizedCalendar>) -> Self {
        Self {
            connectors: vec![
                Arc::new(IcsConnector),
                Arc::new(SidearmConnector),
                Arc::new(RschoolConnector),
                Arc::new(GenericConnector),
                Arc::new(GoogleConnector::new(calendar)),
            ],
        }
    }

    /// Resolve a connector by stored vendor tag, expanding umbrella
    /// aliases (`sidearmsports` resolves to the sidearm connector)
    pub fn by_vendor(&self, vendor_id: &str) -> Option<Arc<dyn Connector>> {
        let wanted = vendor_id.trim().to_ascii_lowercase();
        self.connectors
            .iter()
            .find(|connector| {
                connector.vendor() == wanted
                    || expand_vendor_aliases(Some(connector.vendor()))
                        .is_some_and(|aliases| aliases.contains(&wanted))
            })
            .cloned()
    }

    /// Select the best connector for a URL
    ///
    /// Returns the connector and the confidence it claimed.
    pub async fn detect(
        &self,
        fetcher: &SafeFetcher,
        url: &str,
        org_id: Option<OrgId>,
    ) -> IngestResult<(Arc<dyn Connector>, f64)> {
        // Authorized calendar: scheme alone decides, no fetch
        if url.starts_with(GOOGLE_SCHEME) {
            let connector = self
                .by_vendor(VENDOR_GOOGLE)
                .ok_or_else(|| IngestError::NoConnector(url.to_string()))?;
            return Ok((connector, 1.0));
        }

        // ICS by extension: decided from the URL alone, no fetch
        let ics = self
            .by_vendor(VENDOR_ICS)
            .ok_or_else(|| IngestError::NoConnector(url.to_string()))?;
        let url_verdict = ics.can_handle(&UrlProbe::url_only(url));
        if url_verdict.confidence >= 0.9 {
            return Ok((ics, url_verdict.confidence));
        }

        // One verify fetch, then every connector sees headers and body
        let mut opts = FetchOptions::verify();
        if let Some(org_id) = org_id {
            opts = opts.with_org(org_id);
        }
        let page = fetcher.fetch(url, &opts).await?;
        let probe = UrlProbe {
            url,
            html: Some(&page.text),
            headers: Some(&page.headers),
        };

        let mut best: Option<(Arc<dyn Connector>, f64)> = None;
        for connector in &self.connectors {
            let detection = connector.can_handle(&probe);
            debug!(
                vendor = connector.vendor(),
                confidence = detection.confidence,
                reason = ?detection.reason,
                "Probed connector"
            );
            if detection.ok()
                && best
                    .as_ref()
                    .is_none_or(|(_, confidence)| detection.confidence > *confidence)
            {
                best = Some((connector.clone(), detection.confidence));
            }
        }

        if let Some(found) = best {
            return Ok(found);
        }
        if url_verdict.ok() {
            return Ok((ics, url_verdict.confidence));
        }
        Err(IngestError::NoConnector(url.to_string()))
    }
}
