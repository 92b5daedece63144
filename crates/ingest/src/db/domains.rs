//! Allowlist tables: domain rules and per-host records

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use teammeet_core::models::{AllowedDomain, DomainRule, DomainStatus};
use teammeet_core::types::{OrgId, UserId};
use teammeet_core::IngestResult;

/// Load all domain rules, optionally filtered to a vendor set
pub async fn load_rules(
    pool: &PgPool,
    vendors: Option<&[String]>,
) -> IngestResult<Vec<DomainRule>> {
    let rules = match vendors {
        Some(vendors) => {
            sqlx::query_as::<_, DomainRule>(
                "SELECT * FROM schedule_domain_rules WHERE vendor_id = ANY($1)",
            )
            .bind(vendors)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, DomainRule>("SELECT * FROM schedule_domain_rules")
                .fetch_all(pool)
                .await?
        }
    };

    Ok(rules)
}

/// Look up the per-host record by exact hostname
pub async fn get_domain(
    pool: &PgPool,
    hostname: &str,
    vendors: Option<&[String]>,
) -> IngestResult<Option<AllowedDomain>> {
    let domain = match vendors {
        Some(vendors) => {
            sqlx::query_as::<_, AllowedDomain>(
                "SELECT * FROM schedule_allowed_domains WHERE hostname = $1 AND vendor_id = ANY($2)",
            )
            .bind(hostname)
            .bind(vendors)
            .fetch_optional(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, AllowedDomain>(
                "SELECT * FROM schedule_allowed_domains WHERE hostname = $1",
            )
            .bind(hostname)
            .fetch_optional(pool)
            .await?
        }
    };

    Ok(domain)
}

/// Bump `last_seen_at` on a per-host record
pub async fn touch_domain(pool: &PgPool, hostname: &str) -> IngestResult<()> {
    sqlx::query("UPDATE schedule_allowed_domains SET last_seen_at = NOW() WHERE hostname = $1")
        .bind(hostname)
        .execute(pool)
        .await?;

    Ok(())
}

/// Fields written when a verification enrolls or refreshes a host
#[derive(Debug, Clone)]
pub struct EnrollmentWrite {
    pub hostname: String,
    pub vendor_id: String,
    pub status: DomainStatus,
    pub verified_by_org_id: OrgId,
    pub verified_by_user_id: Option<UserId>,
    pub verified_at: DateTime<Utc>,
    pub fingerprint: serde_json::Value,
}

/// Conditionally update an existing record
///
/// Only rows whose current status is in `replaceable` are touched, so a
/// concurrent `blocked` (or an already-`active` row being refreshed as
/// `pending`) is never overwritten. Returns the number of rows updated.
pub async fn promote_domain(
    pool: &PgPool,
    write: &EnrollmentWrite,
    replaceable: &[DomainStatus],
) -> IngestResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE schedule_allowed_domains
        SET vendor_id = $2,
            status = $3,
            verified_by_org_id = $4,
            verified_by_user_id = $5,
            verified_at = $6,
            verification_method = 'fingerprint',
            fingerprint = $7,
            last_seen_at = NOW()
        WHERE hostname = $1
          AND status <> 'blocked'
          AND status = ANY($8)
        "#,
    )
    .bind(&write.hostname)
    .bind(&write.vendor_id)
    .bind(write.status)
    .bind(write.verified_by_org_id)
    .bind(write.verified_by_user_id)
    .bind(write.verified_at)
    .bind(&write.fingerprint)
    .bind(replaceable)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Insert a fresh per-host record
///
/// Returns `false` on a unique-constraint collision with a concurrent
/// insert; the caller re-reads and honors what is there.
pub async fn insert_domain(pool: &PgPool, write: &EnrollmentWrite) -> IngestResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO schedule_allowed_domains (
            hostname, vendor_id, status,
            verified_by_org_id, verified_by_user_id, verified_at,
            verification_method, fingerprint, last_seen_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, 'fingerprint', $7, NOW())
        "#,
    )
    .bind(&write.hostname)
    .bind(&write.vendor_id)
    .bind(write.status)
    .bind(write.verified_by_org_id)
    .bind(write.verified_by_user_id)
    .bind(write.verified_at)
    .bind(&write.fingerprint)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(true),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(false),
        Err(e) => Err(e.into()),
    }
}
