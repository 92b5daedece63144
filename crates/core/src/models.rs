//! Core domain models for schedule ingestion
//!
//! These models represent the persisted entities and map to database tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{OrgId, SourceId, UserId};

/// A schedule source owned by an organization
///
/// `source_url` is either a normal http(s) URL or the sentinel
/// `google://{calendarId}` for connected-account calendars. Mutated only
/// by the source runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[derive(sqlx::FromRow)]
pub struct ScheduleSource {
    pub id: SourceId,
    pub org_id: OrgId,
    pub vendor_id: String,
    pub source_url: String,
    pub connected_user_id: Option<UserId>,
    pub status: SourceStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_event_count: i32,
    pub last_imported: i32,
    pub last_updated: i32,
    pub last_cancelled: i32,
    pub updated_at: DateTime<Utc>,
}

/// Schedule source status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(sqlx::Type)]
#[sqlx(type_name = "schedule_source_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Active,
    Error,
}

/// A normalized event row, unique per `(source_id, external_uid)`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[derive(sqlx::FromRow)]
pub struct ScheduleEvent {
    pub id: Uuid,
    pub org_id: OrgId,
    pub source_id: SourceId,
    pub external_uid: String,
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub location: Option<String>,
    pub status: EventStatus,
    #[sqlx(json)]
    pub raw: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Event status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(sqlx::Type)]
#[sqlx(type_name = "schedule_event_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

/// Per-host allowlist record, keyed by normalized hostname
///
/// Never downgraded from `active` to `pending` except by explicit admin
/// action, and never auto-cleared from `blocked`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[derive(sqlx::FromRow)]
pub struct AllowedDomain {
    pub hostname: String,
    pub vendor_id: String,
    pub status: DomainStatus,
    pub verified_by_org_id: Option<OrgId>,
    pub verified_by_user_id: Option<UserId>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verification_method: Option<String>,
    #[sqlx(json)]
    pub fingerprint: serde_json::Value,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Allowlist domain status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(sqlx::Type)]
#[sqlx(type_name = "schedule_domain_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DomainStatus {
    Active,
    Pending,
    Blocked,
}

/// Pattern-based allowlist rule, taking precedence over per-host records
///
/// Patterns match an exact host, `*.suffix`, or `.suffix`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[derive(sqlx::FromRow)]
pub struct DomainRule {
    pub id: Uuid,
    pub pattern: String,
    pub vendor_id: String,
    pub status: RuleStatus,
    pub created_at: DateTime<Utc>,
}

/// Rule status: rules either force-allow or force-block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(sqlx::Type)]
#[sqlx(type_name = "schedule_rule_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Active,
    Blocked,
}
