//! Schedule source rows: run-status persistence and due-source claims

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use teammeet_core::models::{ScheduleSource, SourceStatus};
use teammeet_core::types::SourceId;
use teammeet_core::{IngestResult, SyncCounts};

/// Persist a successful run: counters, timestamp, cleared error
pub async fn persist_run_success(
    pool: &PgPool,
    source_id: SourceId,
    synced_at: DateTime<Utc>,
    event_count: u32,
    counts: SyncCounts,
) -> IngestResult<()> {
    sqlx::query(
        r#"
        UPDATE schedule_sources
        SET status = $2,
            last_synced_at = $3,
            last_error = NULL,
            last_event_count = $4,
            last_imported = $5,
            last_updated = $6,
            last_cancelled = $7,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(source_id)
    .bind(SourceStatus::Active)
    .bind(synced_at)
    .bind(i32::try_from(event_count).unwrap_or(i32::MAX))
    .bind(i32::try_from(counts.imported).unwrap_or(i32::MAX))
    .bind(i32::try_from(counts.updated).unwrap_or(i32::MAX))
    .bind(i32::try_from(counts.cancelled).unwrap_or(i32::MAX))
    .execute(pool)
    .await?;

    Ok(())
}

/// Persist a failed run: error status and message, counters untouched
pub async fn persist_run_failure(
    pool: &PgPool,
    source_id: SourceId,
    message: &str,
) -> IngestResult<()> {
    sqlx::query(
        r#"
        UPDATE schedule_sources
        SET status = $2,
            last_error = $3,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(source_id)
    .bind(SourceStatus::Error)
    .bind(message)
    .execute(pool)
    .await?;

    Ok(())
}

/// Claim sources due for a sync
///
/// The claim advances `last_synced_at` inside the locking update so
/// concurrent workers skip each other's batches and failing sources are
/// not retried hot; the runner overwrites the timestamp on completion.
pub async fn claim_due_sources(
    pool: &PgPool,
    batch_size: i64,
    due_before: DateTime<Utc>,
) -> IngestResult<Vec<ScheduleSource>> {
    let sources = sqlx::query_as::<_, ScheduleSource>(
        r#"
        UPDATE schedule_sources
        SET last_synced_at = NOW()
        WHERE id IN (
            SELECT id FROM schedule_sources
            WHERE last_synced_at IS NULL
               OR last_synced_at < $2
            ORDER BY last_synced_at ASC NULLS FIRST
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING *
        "#,
    )
    .bind(batch_size)
    .bind(due_before)
    .fetch_all(pool)
    .await?;

    Ok(sources)
}
