//! Idempotent reconciliation of extracted events against the store
//!
//! For the same inputs and store state the algorithm produces identical
//! writes and the same `{imported, updated, cancelled}` counts. Nothing
//! destructive happens before a successful parse: the reconciler only
//! ever upserts observed events and tombstones rows that disappeared
//! from the current window.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use teammeet_core::models::EventStatus;
use teammeet_core::types::{OrgId, SourceId};
use teammeet_core::{IngestResult, NormalizedEvent, SyncCounts, SyncWindow};
use tracing::debug;

/// Upsert batch size
const UPSERT_CHUNK: usize = 200;
/// Cancellation batch size
const CANCEL_CHUNK: usize = 250;

/// Existing row as loaded for comparison
#[derive(Debug, Clone)]
#[derive(sqlx::FromRow)]
pub struct StoredEventRef {
    pub external_uid: String,
    pub status: EventStatus,
}

/// Full row written by an upsert
#[derive(Debug, Clone)]
pub struct EventRow {
    pub org_id: OrgId,
    pub source_id: SourceId,
    pub external_uid: String,
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub location: Option<String>,
    pub status: EventStatus,
    pub raw: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// The narrow store interface the reconciler writes through
///
/// Three operations: select by `(source_id, start_at)` range, upsert by
/// `(source_id, external_uid)`, and update status for a uid set.
#[async_trait]
pub trait ScheduleEventStore: Send + Sync {
    async fn events_in_window(
        &self,
        source_id: SourceId,
        window: &SyncWindow,
    ) -> IngestResult<Vec<StoredEventRef>>;

    async fn upsert_events(&self, rows: &[EventRow]) -> IngestResult<()>;

    async fn cancel_events(
        &self,
        source_id: SourceId,
        uids: &[String],
        now: DateTime<Utc>,
    ) -> IngestResult<()>;
}

/// Per-run parameters
#[derive(Debug, Clone)]
pub struct ReconcileArgs {
    pub org_id: OrgId,
    pub source_id: SourceId,
    pub window: SyncWindow,
    pub now: DateTime<Utc>,
}

/// Reconcile one extracted event set against the store
pub async fn sync_schedule_events(
    store: &dyn ScheduleEventStore,
    args: &ReconcileArgs,
    events: Vec<NormalizedEvent>,
) -> IngestResult<SyncCounts> {
    // Deduplicate by uid, keeping the last occurrence
    let mut by_uid: HashMap<String, usize> = HashMap::new();
    let mut deduped: Vec<NormalizedEvent> = Vec::with_capacity(events.len());
    for event in events {
        match by_uid.get(&event.external_uid) {
            Some(&idx) => {
                debug!(
                    uid = %event.external_uid,
                    title = %event.title,
                    "Dropping duplicate event, keeping last occurrence"
                );
                deduped[idx] = event;
            }
            None => {
                by_uid.insert(event.external_uid.clone(), deduped.len());
                deduped.push(event);
            }
        }
    }

    // Only events inside the window participate in this run
    deduped.retain(|e| args.window.contains(e.start_at));
    let surviving: std::collections::HashSet<&str> =
        deduped.iter().map(|e| e.external_uid.as_str()).collect();

    let existing = store.events_in_window(args.source_id, &args.window).await?;
    let existing_status: HashMap<&str, EventStatus> = existing
        .iter()
        .map(|row| (row.external_uid.as_str(), row.status))
        .collect();

    let mut counts = SyncCounts::default();
    let mut rows: Vec<EventRow> = Vec::with_capacity(deduped.len());
    for event in &deduped {
        if existing_status.contains_key(event.external_uid.as_str()) {
            counts.updated += 1;
        } else {
            counts.imported += 1;
        }
        rows.push(EventRow {
            org_id: args.org_id,
            source_id: args.source_id,
            external_uid: event.external_uid.clone(),
            title: event.title.clone(),
            start_at: event.start_at,
            // Backstop: connectors normally fill the end themselves
            end_at: event.end_at.unwrap_or(event.start_at + Duration::hours(1)),
            location: event.location.clone(),
            status: event.status.unwrap_or(EventStatus::Confirmed),
            raw: event.raw.clone().unwrap_or(serde_json::Value::Null),
            updated_at: args.now,
        });
    }

    for chunk in rows.chunks(UPSERT_CHUNK) {
        store.upsert_events(chunk).await?;
    }

    // Tombstone rows that used to appear in the window but no longer do
    let gone: Vec<String> = existing
        .iter()
        .filter(|row| row.status != EventStatus::Cancelled)
        .filter(|row| !surviving.contains(row.external_uid.as_str()))
        .map(|row| row.external_uid.clone())
        .collect();

    for chunk in gone.chunks(CANCEL_CHUNK) {
        store.cancel_events(args.source_id, chunk, args.now).await?;
    }
    counts.cancelled = u32::try_from(gone.len()).unwrap_or(u32::MAX);

    Ok(counts)
}

/// In-memory event store
///
/// Backs reconciler tests and connector previews that must not touch a
/// real database; also records its batches so tests can assert on exact
/// write shapes.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    inner: std::sync::Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    rows: HashMap<(SourceId, String), EventRow>,
    upsert_batches: Vec<usize>,
    cancel_batches: Vec<Vec<String>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(&self, source_id: SourceId, uid: &str) -> Option<EventRow> {
        let inner = self.inner.lock().expect("store poisoned");
        inner.rows.get(&(source_id, uid.to_string())).cloned()
    }

    pub fn row_count(&self) -> usize {
        self.inner.lock().expect("store poisoned").rows.len()
    }

    /// Sizes of the upsert batches seen so far
    pub fn upsert_batches(&self) -> Vec<usize> {
        self.inner.lock().expect("store poisoned").upsert_batches.clone()
    }

    /// Uid sets of the cancel batches seen so far
    pub fn cancel_batches(&self) -> Vec<Vec<String>> {
        self.inner.lock().expect("store poisoned").cancel_batches.clone()
    }
}

#[async_trait]
impl ScheduleEventStore for MemoryEventStore {
    async fn events_in_window(
        &self,
        source_id: SourceId,
        window: &SyncWindow,
    ) -> IngestResult<Vec<StoredEventRef>> {
        let inner = self.inner.lock().expect("store poisoned");
        let mut rows: Vec<&EventRow> = inner
            .rows
            .values()
            .filter(|row| row.source_id == source_id && window.contains(row.start_at))
            .collect();
        rows.sort_by_key(|row| (row.start_at, row.external_uid.clone()));
        Ok(rows
            .into_iter()
            .map(|row| StoredEventRef {
                external_uid: row.external_uid.clone(),
                status: row.status,
            })
            .collect())
    }

    async fn upsert_events(&self, rows: &[EventRow]) -> IngestResult<()> {
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.upsert_batches.push(rows.len());
        for row in rows {
            inner
                .rows
                .insert((row.source_id, row.external_uid.clone()), row.clone());
        }
        Ok(())
    }

    async fn cancel_events(
        &self,
        source_id: SourceId,
        uids: &[String],
        now: DateTime<Utc>,
    ) -> IngestResult<()> {
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.cancel_batches.push(uids.to_vec());
        for uid in uids {
            if let Some(row) = inner.rows.get_mut(&(source_id, uid.clone())) {
                if row.status != EventStatus::Cancelled {
                    row.status = EventStatus::Cancelled;
                    row.updated_at = now;
                }
            }
        }
        Ok(())
    }
}
