//! Allowlist engine: resolves `(host, vendor?)` to an allow status
//!
//! Resolution order: injected override patterns (tests and local tooling
//! only), then pattern rules (`blocked` wins over `active`), then the
//! per-host domain record. A host nobody knows is `denied`, which is the
//! verifier's cue to take a look.

use sqlx::PgPool;
use teammeet_core::models::{AllowedDomain, DomainRule, DomainStatus, RuleStatus};
use teammeet_core::vendor::expand_vendor_aliases;
use teammeet_core::IngestResult;

use crate::db::domains;

/// Allow status for a host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    Active,
    Pending,
    Blocked,
    Denied,
}

impl From<DomainStatus> for HostStatus {
    fn from(status: DomainStatus) -> Self {
        match status {
            DomainStatus::Active => HostStatus::Active,
            DomainStatus::Pending => HostStatus::Pending,
            DomainStatus::Blocked => HostStatus::Blocked,
        }
    }
}

/// Where a decision came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    Rule,
    Domain,
    None,
}

/// Outcome of an allowlist lookup
#[derive(Debug, Clone)]
pub struct HostDecision {
    pub status: HostStatus,
    pub source: DecisionSource,
    pub vendor_id: Option<String>,
    pub domain_hostname: Option<String>,
}

impl HostDecision {
    fn denied() -> Self {
        Self {
            status: HostStatus::Denied,
            source: DecisionSource::None,
            vendor_id: None,
            domain_hostname: None,
        }
    }
}

/// Pattern-based decisions injected at fetcher construction
///
/// Hosts matching an allow pattern resolve `active`; everything else
/// resolves `denied`. Production fetchers are built without one.
#[derive(Debug, Clone, Default)]
pub struct OverrideRules {
    allow: Vec<String>,
}

impl OverrideRules {
    pub fn allowing(patterns: &[&str]) -> Self {
        Self {
            allow: patterns.iter().map(|p| (*p).to_string()).collect(),
        }
    }

    pub fn decide(&self, host: &str) -> HostStatus {
        let host = normalize_hostname(host);
        if self.allow.iter().any(|p| pattern_matches(p, &host)) {
            HostStatus::Active
        } else {
            HostStatus::Denied
        }
    }
}

/// Lowercase and strip the trailing dot from a hostname
pub fn normalize_hostname(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Match a rule pattern against a normalized hostname
///
/// `*.suffix` and `.suffix` match the exact suffix host and any
/// subdomain; anything else is an exact comparison.
pub fn pattern_matches(pattern: &str, host: &str) -> bool {
    let pattern = normalize_hostname(pattern);
    let host = normalize_hostname(host);

    let suffix = if let Some(s) = pattern.strip_prefix("*.") {
        s
    } else if let Some(s) = pattern.strip_prefix('.') {
        s
    } else {
        return pattern == host;
    };

    host == suffix || host.ends_with(&format!(".{suffix}"))
}

/// Pure resolution over already-loaded rules and domain record
///
/// Rules take precedence over the domain row, and a `blocked` rule wins
/// over an `active` one.
pub fn resolve_decision(
    host: &str,
    rules: &[DomainRule],
    domain: Option<&AllowedDomain>,
) -> HostDecision {
    let host = normalize_hostname(host);
    let matching: Vec<&DomainRule> = rules
        .iter()
        .filter(|r| pattern_matches(&r.pattern, &host))
        .collect();

    if let Some(blocked) = matching.iter().find(|r| r.status == RuleStatus::Blocked) {
        return HostDecision {
            status: HostStatus::Blocked,
            source: DecisionSource::Rule,
            vendor_id: Some(blocked.vendor_id.clone()),
            domain_hostname: None,
        };
    }
    if let Some(active) = matching.iter().find(|r| r.status == RuleStatus::Active) {
        return HostDecision {
            status: HostStatus::Active,
            source: DecisionSource::Rule,
            vendor_id: Some(active.vendor_id.clone()),
            domain_hostname: None,
        };
    }

    match domain {
        Some(row) => HostDecision {
            status: row.status.into(),
            source: DecisionSource::Domain,
            vendor_id: Some(row.vendor_id.clone()),
            domain_hostname: Some(row.hostname.clone()),
        },
        None => HostDecision::denied(),
    }
}

/// Resolve a host's allow status against the store
pub async fn check_host_status(
    pool: &PgPool,
    host: &str,
    vendor: Option<&str>,
    override_rules: Option<&OverrideRules>,
) -> IngestResult<HostDecision> {
    let host = normalize_hostname(host);

    if let Some(rules) = override_rules {
        return Ok(HostDecision {
            status: rules.decide(&host),
            source: DecisionSource::None,
            vendor_id: None,
            domain_hostname: None,
        });
    }

    let vendors = expand_vendor_aliases(vendor);
    let rules = domains::load_rules(pool, vendors.as_deref()).await?;
    let domain = domains::get_domain(pool, &host, vendors.as_deref()).await?;

    Ok(resolve_decision(&host, &rules, domain.as_ref()))
}

/// Convenience wrapper: is the host currently fetchable?
pub async fn is_host_allowed(
    pool: &PgPool,
    host: &str,
    vendor: Option<&str>,
) -> IngestResult<bool> {
    let decision = check_host_status(pool, host, vendor, None).await?;
    Ok(decision.status == HostStatus::Active)
}

/// Bump `last_seen_at` on the per-host record
pub async fn touch_allowed_domain(pool: &PgPool, host: &str) -> IngestResult<()> {
    domains::touch_domain(pool, &normalize_hostname(host)).await
}
