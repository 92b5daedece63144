//! TeamMeet Ingest - Schedule ingestion core
//!
//! Fetches athletic/event schedules from third-party websites and
//! normalizes them into per-organization event rows. The pipeline for one
//! sync is: source runner → registry (if the vendor is unknown) →
//! connector → safe fetcher (gated by the allowlist/verifier) →
//! extractors → normalization → reconciler → store.

pub mod allowlist;
pub mod connectors;
pub mod db;
pub mod extract;
pub mod fetch;
pub mod reconcile;
pub mod registry;
pub mod runner;
pub mod verify;

pub use fetch::{AllowlistPolicy, FetchMode, FetchOptions, FetchPolicy, FetchedPage, SafeFetcher};
pub use reconcile::{sync_schedule_events, ScheduleEventStore};
pub use registry::ConnectorRegistry;
pub use runner::sync_schedule_source;
pub use verify::verify_and_enroll;
