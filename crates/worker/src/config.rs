//! Configuration for the sync worker
//!
//! Loads configuration from environment variables

use anyhow::{Context, Result};
use std::env;
use teammeet_core::config::CoreConfig;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared configuration (database)
    pub core: CoreConfig,

    /// Poll interval in seconds
    pub poll_interval_secs: u64,

    /// Maximum sources synced concurrently per cycle
    pub batch_size: i64,

    /// Minutes between syncs of the same source
    pub sync_interval_mins: i64,

    /// Sync window: days behind now
    pub window_past_days: i64,

    /// Sync window: days ahead of now
    pub window_future_days: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            core: CoreConfig::from_env()?,

            poll_interval_secs: env::var("WORKER_POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("WORKER_POLL_INTERVAL_SECS must be a valid integer")?,

            batch_size: env::var("WORKER_BATCH_SIZE")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .context("WORKER_BATCH_SIZE must be a valid integer")?,

            sync_interval_mins: env::var("SYNC_INTERVAL_MINS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("SYNC_INTERVAL_MINS must be a valid integer")?,

            window_past_days: env::var("SYNC_WINDOW_PAST_DAYS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .context("SYNC_WINDOW_PAST_DAYS must be a valid integer")?,

            window_future_days: env::var("SYNC_WINDOW_FUTURE_DAYS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .context("SYNC_WINDOW_FUTURE_DAYS must be a valid integer")?,
        })
    }
}
