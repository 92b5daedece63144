//! Postgres-backed implementation of the event store trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, QueryBuilder};
use teammeet_core::models::{EventStatus, ScheduleEvent};
use teammeet_core::types::SourceId;
use teammeet_core::{IngestResult, SyncWindow};

use crate::reconcile::{EventRow, ScheduleEventStore, StoredEventRef};

/// List full event rows for a source within a time range
///
/// Read path for the schedule screens; the reconciler itself only needs
/// the narrower [`ScheduleEventStore`] view.
pub async fn list_events(
    pool: &PgPool,
    source_id: SourceId,
    window: &SyncWindow,
) -> IngestResult<Vec<ScheduleEvent>> {
    let events = sqlx::query_as::<_, ScheduleEvent>(
        r#"
        SELECT * FROM schedule_events
        WHERE source_id = $1
          AND start_at >= $2
          AND start_at <= $3
        ORDER BY start_at ASC
        "#,
    )
    .bind(source_id)
    .bind(window.from)
    .bind(window.to)
    .fetch_all(pool)
    .await?;

    Ok(events)
}

/// Event store over the `schedule_events` table
#[derive(Debug, Clone)]
pub struct PgScheduleEventStore {
    pool: PgPool,
}

impl PgScheduleEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleEventStore for PgScheduleEventStore {
    async fn events_in_window(
        &self,
        source_id: SourceId,
        window: &SyncWindow,
    ) -> IngestResult<Vec<StoredEventRef>> {
        let rows = sqlx::query_as::<_, StoredEventRef>(
            r#"
            SELECT external_uid, status FROM schedule_events
            WHERE source_id = $1
              AND start_at >= $2
              AND start_at <= $3
            ORDER BY start_at, external_uid
            "#,
        )
        .bind(source_id)
        .bind(window.from)
        .bind(window.to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn upsert_events(&self, rows: &[EventRow]) -> IngestResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
            "INSERT INTO schedule_events (org_id, source_id, external_uid, title, \
             start_at, end_at, location, status, raw, updated_at) ",
        );
        builder.push_values(rows, |mut b, row| {
            b.push_bind(row.org_id)
                .push_bind(row.source_id)
                .push_bind(&row.external_uid)
                .push_bind(&row.title)
                .push_bind(row.start_at)
                .push_bind(row.end_at)
                .push_bind(&row.location)
                .push_bind(row.status)
                .push_bind(&row.raw)
                .push_bind(row.updated_at);
        });
        builder.push(
            " ON CONFLICT (source_id, external_uid) DO UPDATE SET \
             title = EXCLUDED.title, \
             start_at = EXCLUDED.start_at, \
             end_at = EXCLUDED.end_at, \
             location = EXCLUDED.location, \
             status = EXCLUDED.status, \
             raw = EXCLUDED.raw, \
             updated_at = EXCLUDED.updated_at",
        );

        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn cancel_events(
        &self,
        source_id: SourceId,
        uids: &[String],
        now: DateTime<Utc>,
    ) -> IngestResult<()> {
        if uids.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE schedule_events
            SET status = $3, updated_at = $4
            WHERE source_id = $1
              AND external_uid = ANY($2)
              AND status <> $3
            "#,
        )
        .bind(source_id)
        .bind(uids)
        .bind(EventStatus::Cancelled)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
