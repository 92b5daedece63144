//! TeamMeet Worker - Background schedule sync driver
//!
//! Claims schedule sources due for a refresh and drives each one
//! through the ingestion core. Retries are not handled here: a failed
//! source keeps its `error` status and is simply picked up again on a
//! later cycle.

mod config;

pub use config::Config;

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use teammeet_core::SyncWindow;
use teammeet_ingest::connectors::google::UnconfiguredCalendar;
use teammeet_ingest::connectors::ConnectorContext;
use teammeet_ingest::db::sources::claim_due_sources;
use teammeet_ingest::db::PgScheduleEventStore;
use teammeet_ingest::{
    sync_schedule_source, AllowlistPolicy, ConnectorRegistry, SafeFetcher,
};
use tokio::task::JoinSet;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Run the sync worker loop until cancelled
pub async fn run_worker(
    pool: PgPool,
    config: Config,
    shutdown: Option<CancellationToken>,
) -> Result<()> {
    let fetcher = Arc::new(
        SafeFetcher::new(AllowlistPolicy::Enforce { pool: pool.clone() })
            .map_err(|e| anyhow::anyhow!("fetcher init: {e}"))?,
    );
    // The platform injects a real calendar client where connected
    // accounts are configured; without one google sources fail cleanly
    let registry = Arc::new(ConnectorRegistry::with_defaults(Arc::new(
        UnconfiguredCalendar,
    )));
    let events = Arc::new(PgScheduleEventStore::new(pool.clone()));
    let shutdown = shutdown.unwrap_or_default();

    info!(
        "Starting sync worker: poll_interval={}s, batch_size={}, sync_interval={}m",
        config.poll_interval_secs, config.batch_size, config.sync_interval_mins
    );

    loop {
        if shutdown.is_cancelled() {
            info!("Sync worker shutdown complete");
            return Ok(());
        }

        let due_before = Utc::now() - ChronoDuration::minutes(config.sync_interval_mins);
        match claim_due_sources(&pool, config.batch_size, due_before).await {
            Ok(batch) if batch.is_empty() => {}
            Ok(batch) => {
                info!("Claimed {} due sources", batch.len());
                let mut tasks = JoinSet::new();
                for source in batch {
                    let pool = pool.clone();
                    let fetcher = fetcher.clone();
                    let registry = registry.clone();
                    let events = events.clone();
                    let window_past = config.window_past_days;
                    let window_future = config.window_future_days;
                    tasks.spawn(async move {
                        let now = Utc::now();
                        let window = SyncWindow::around(now, window_past, window_future);
                        let ctx = ConnectorContext {
                            fetcher: fetcher.as_ref(),
                            events: events.as_ref(),
                        };
                        sync_schedule_source(&pool, &registry, &ctx, &source, window, now).await
                    });
                }

                // Drain the whole batch before claiming more
                while let Some(joined) = tasks.join_next().await {
                    match joined {
                        Ok(Ok(_outcome)) => {}
                        Ok(Err(e)) => error!(error = %e, "Source run could not be persisted"),
                        Err(e) => error!(error = %e, "Sync task panicked"),
                    }
                }
                continue;
            }
            Err(e) => {
                error!(error = %e, "Failed to claim due sources");
            }
        }

        tokio::select! {
            () = shutdown.cancelled() => {}
            () = tokio::time::sleep(Duration::from_secs(config.poll_interval_secs)) => {}
        }
    }
}
