//! Host verification and enrollment
//!
//! An unknown host gets one sample fetch (allowlist bypassed, SSRF guard
//! still on) and a vendor fingerprint. High-confidence hosts enroll as
//! `active`, plausible ones as `pending` for admin review, the rest stay
//! denied. Persistence is race-safe: a concurrent `blocked` row is never
//! overwritten, and `pending` is never written over `active`.

use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use teammeet_core::models::DomainStatus;
use teammeet_core::types::{OrgId, UserId};
use teammeet_core::vendor::{vendor_for_host, vendor_for_marker};
use teammeet_core::{IngestError, IngestResult};
use tracing::{debug, info};
use url::Url;

use crate::allowlist::{normalize_hostname, HostStatus};
use crate::db::domains::{self, EnrollmentWrite};
use crate::fetch::{FetchOptions, SafeFetcher};

/// Confidence thresholds for the enrollment decision
const ACTIVE_CONFIDENCE: f64 = 0.95;
const PENDING_CONFIDENCE: f64 = 0.80;

/// Verification request for one URL
#[derive(Debug, Clone)]
pub struct VerifyRequest<'a> {
    pub url: &'a str,
    pub org_id: OrgId,
    pub user_id: Option<UserId>,
    pub vendor_hint: Option<&'a str>,
}

/// Verification outcome handed back to the fetcher or the admin flow
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub allow_status: HostStatus,
    pub vendor_id: Option<String>,
    pub confidence: Option<f64>,
    pub evidence: Vec<String>,
}

/// Evidence collected from one sample fetch
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    pub vendor: String,
    pub confidence: f64,
    pub evidence: Vec<String>,
}

/// Classify a fetched sample into a vendor fingerprint
pub fn classify_fingerprint(host: &str, content_type: Option<&str>, body: &str) -> Fingerprint {
    let is_ics = content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("text/calendar"))
        || body.trim_start().starts_with("BEGIN:VCALENDAR");
    if is_ics {
        return Fingerprint {
            vendor: "ics".to_string(),
            confidence: 0.99,
            evidence: vec!["ics_content".to_string()],
        };
    }

    let host_vendor = vendor_for_host(host);
    let marker_vendor = vendor_for_marker(body);

    match (host_vendor, marker_vendor) {
        (Some(hv), Some(mv)) if hv == mv => Fingerprint {
            vendor: hv.to_string(),
            confidence: 0.97,
            evidence: vec!["host_suffix".to_string(), "body_marker".to_string()],
        },
        // Conflicting signals: the host suffix is the stronger one
        (Some(hv), _) => Fingerprint {
            vendor: hv.to_string(),
            confidence: 0.92,
            evidence: vec!["host_suffix".to_string()],
        },
        (None, Some(mv)) => Fingerprint {
            vendor: mv.to_string(),
            confidence: 0.85,
            evidence: vec!["body_marker".to_string()],
        },
        (None, None) => Fingerprint {
            vendor: "unknown".to_string(),
            confidence: 0.0,
            evidence: Vec::new(),
        },
    }
}

/// Map a confidence score to an allow status
pub fn decide_status(confidence: f64) -> HostStatus {
    if confidence >= ACTIVE_CONFIDENCE {
        HostStatus::Active
    } else if confidence >= PENDING_CONFIDENCE {
        HostStatus::Pending
    } else {
        HostStatus::Denied
    }
}

/// Current statuses a write is allowed to replace
///
/// An `active` promotion may refresh `pending` or `active` rows; a
/// `pending` write may only refresh another `pending`. Nothing ever
/// replaces `blocked`.
fn replaceable_statuses(new_status: DomainStatus) -> &'static [DomainStatus] {
    match new_status {
        DomainStatus::Active => &[DomainStatus::Pending, DomainStatus::Active],
        DomainStatus::Pending => &[DomainStatus::Pending],
        DomainStatus::Blocked => &[],
    }
}

/// Verify a URL's host and enroll it in the allowlist
///
/// Also the admin enrollment entry point; the safe fetcher reuses it for
/// denied-but-unknown hosts when an organization context is present.
pub async fn verify_and_enroll(
    fetcher: &SafeFetcher,
    pool: &PgPool,
    req: &VerifyRequest<'_>,
) -> IngestResult<VerifyOutcome> {
    let parsed = Url::parse(req.url)
        .map_err(|e| IngestError::InvalidUrl(format!("{}: {e}", req.url)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| IngestError::InvalidUrl(format!("{}: missing host", req.url)))?;
    let host = normalize_hostname(host);

    // Fast path on the current record
    if let Some(row) = domains::get_domain(pool, &host, None).await? {
        match row.status {
            DomainStatus::Blocked => {
                return Ok(VerifyOutcome {
                    allow_status: HostStatus::Blocked,
                    vendor_id: Some(row.vendor_id),
                    confidence: None,
                    evidence: Vec::new(),
                });
            }
            DomainStatus::Active => {
                domains::touch_domain(pool, &host).await?;
                return Ok(VerifyOutcome {
                    allow_status: HostStatus::Active,
                    vendor_id: Some(row.vendor_id),
                    confidence: None,
                    evidence: Vec::new(),
                });
            }
            DomainStatus::Pending => {}
        }
    }

    let page = fetcher
        .fetch_unchecked(req.url, &FetchOptions::verify())
        .await?;
    let fingerprint = classify_fingerprint(&host, page.content_type(), &page.text);
    let desired = decide_status(fingerprint.confidence);

    debug!(
        host = %host,
        vendor = %fingerprint.vendor,
        confidence = fingerprint.confidence,
        "Classified host fingerprint"
    );

    if desired == HostStatus::Denied {
        return Ok(VerifyOutcome {
            allow_status: HostStatus::Denied,
            vendor_id: None,
            confidence: Some(fingerprint.confidence),
            evidence: fingerprint.evidence,
        });
    }

    let status = match desired {
        HostStatus::Active => DomainStatus::Active,
        _ => DomainStatus::Pending,
    };
    let mut evidence_blob = json!({
        "vendor": fingerprint.vendor,
        "confidence": fingerprint.confidence,
        "signals": fingerprint.evidence.clone(),
    });
    if let Some(hint) = req.vendor_hint {
        evidence_blob["vendor_hint"] = json!(hint);
    }
    let write = EnrollmentWrite {
        hostname: host.clone(),
        vendor_id: fingerprint.vendor.clone(),
        status,
        verified_by_org_id: req.org_id,
        verified_by_user_id: req.user_id,
        verified_at: Utc::now(),
        fingerprint: evidence_blob,
    };

    let final_status = persist_enrollment(pool, &write).await?;

    info!(
        host = %host,
        vendor = %fingerprint.vendor,
        status = ?final_status,
        "Host enrollment completed"
    );

    Ok(VerifyOutcome {
        allow_status: final_status.into(),
        vendor_id: Some(fingerprint.vendor),
        confidence: Some(fingerprint.confidence),
        evidence: fingerprint.evidence,
    })
}

/// Race-safe write: conditional update, re-read, insert, re-read
///
/// Whatever survives in the table wins; `blocked` is never cleared.
async fn persist_enrollment(pool: &PgPool, write: &EnrollmentWrite) -> IngestResult<DomainStatus> {
    let updated = domains::promote_domain(pool, write, replaceable_statuses(write.status)).await?;
    if updated > 0 {
        return Ok(write.status);
    }

    // Nothing matched: the row is blocked, holds a status we must not
    // replace, or does not exist yet
    if let Some(row) = domains::get_domain(pool, &write.hostname, None).await? {
        return Ok(row.status);
    }

    if domains::insert_domain(pool, write).await? {
        return Ok(write.status);
    }

    // Lost the insert race; honor the concurrent writer
    match domains::get_domain(pool, &write.hostname, None).await? {
        Some(row) => Ok(row.status),
        None => Ok(write.status),
    }
}
