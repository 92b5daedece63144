//! In-memory event shapes used by extractors and the reconciler

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::EventStatus;

/// Raw event emitted by an extractor, before normalization
///
/// `raw_title` preserves the title exactly as the vendor rendered it;
/// the stable event id hashes the raw title when present so that later
/// changes to sanitization rules do not invalidate ids.
#[derive(Debug, Clone)]
pub struct ParsedEvent {
    pub title: String,
    pub raw_title: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub status: Option<EventStatus>,
    pub raw: Option<serde_json::Value>,
    pub row_index: Option<usize>,
}

/// Normalized event ready for reconciliation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub external_uid: String,
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub status: Option<EventStatus>,
    pub raw: Option<serde_json::Value>,
}

/// Sliding time range for a sync run
///
/// Only events whose `start_at` lies in `[from, to]` participate in
/// cancellation for that run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl SyncWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// Window spanning `past_days` back to `future_days` ahead of `now`
    pub fn around(now: DateTime<Utc>, past_days: i64, future_days: i64) -> Self {
        Self {
            from: now - Duration::days(past_days),
            to: now + Duration::days(future_days),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at <= self.to
    }
}

/// Outcome counters of one reconciliation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub imported: u32,
    pub updated: u32,
    pub cancelled: u32,
}
