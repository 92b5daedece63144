//! Sync worker entry point

use anyhow::Result;
use teammeet_worker::{run_worker, Config};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    teammeet_shared::bootstrap::init_env();
    let _guard = teammeet_shared::bootstrap::init_tracing("sync-worker");

    let config = Config::from_env()?;
    let pool = teammeet_shared::bootstrap::init_db(&config.core).await?;

    sqlx::migrate!("../../migrations").run(&pool).await?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
                shutdown.cancel();
            }
        });
    }

    run_worker(pool, config, Some(shutdown)).await
}
