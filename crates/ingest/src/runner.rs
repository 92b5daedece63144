//! Source runner: drives one schedule source through its connector and
//! persists the run outcome on the source row

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use teammeet_core::models::ScheduleSource;
use teammeet_core::{IngestResult, SyncCounts, SyncWindow};
use tracing::{info, warn};

use crate::connectors::{ConnectorContext, SyncArgs};
use crate::db::sources;
use crate::registry::ConnectorRegistry;

/// Run outcome handed back to the caller (UI or worker)
#[derive(Debug, Clone, Default)]
pub struct SourceRunOutcome {
    pub ok: bool,
    pub counts: SyncCounts,
    pub event_count: u32,
    pub error: Option<String>,
}

/// Sync one schedule source
///
/// The connector is resolved by the source's stored vendor tag. Every
/// failure path lands on the source row (`status=error`, `last_error`)
/// and returns `ok=false`; connector errors are not propagated.
pub async fn sync_schedule_source(
    pool: &PgPool,
    registry: &ConnectorRegistry,
    ctx: &ConnectorContext<'_>,
    source: &ScheduleSource,
    window: SyncWindow,
    now: DateTime<Utc>,
) -> IngestResult<SourceRunOutcome> {
    let Some(connector) = registry.by_vendor(&source.vendor_id) else {
        let message = format!("Unsupported vendor: {}", source.vendor_id);
        warn!(source_id = %source.id, vendor = %source.vendor_id, "Skipping source");
        sources::persist_run_failure(pool, source.id, &message).await?;
        return Ok(SourceRunOutcome {
            ok: false,
            error: Some(message),
            ..SourceRunOutcome::default()
        });
    };

    let args = SyncArgs {
        source_id: source.id,
        org_id: source.org_id,
        user_id: source.connected_user_id,
        url: &source.source_url,
        window,
        now,
    };

    match connector.sync(ctx, &args).await {
        Ok(outcome) => {
            info!(
                source_id = %source.id,
                vendor = %outcome.vendor,
                events = outcome.event_count,
                imported = outcome.counts.imported,
                updated = outcome.counts.updated,
                cancelled = outcome.counts.cancelled,
                "Source sync completed"
            );
            sources::persist_run_success(pool, source.id, now, outcome.event_count, outcome.counts)
                .await?;
            Ok(SourceRunOutcome {
                ok: true,
                counts: outcome.counts,
                event_count: outcome.event_count,
                error: None,
            })
        }
        Err(e) => {
            let message = e.to_string();
            warn!(
                source_id = %source.id,
                vendor = %source.vendor_id,
                kind = e.kind(),
                error = %message,
                "Source sync failed"
            );
            sources::persist_run_failure(pool, source.id, &message).await?;
            Ok(SourceRunOutcome {
                ok: false,
                error: Some(message),
                ..SourceRunOutcome::default()
            })
        }
    }
}
