//! Store access: sqlx queries over the schedule ingestion tables

pub mod domains;
pub mod events;
pub mod sources;

pub use events::PgScheduleEventStore;
