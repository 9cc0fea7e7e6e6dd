//! Storage adapters for the Relens reanalysis engine.
//!
//! The engine talks to storage through the [`JobStore`] and [`RecordStore`]
//! traits; the SQLite implementations here are the reference backend. Any
//! backend must report overload through [`StoreError::Throttled`] so the
//! engine's backoff wrapper can tell transient pressure from real failures.

pub mod error;
pub mod sqlite_jobs;
pub mod sqlite_records;
pub mod store;

pub use error::StoreError;
pub use sqlite_jobs::SqliteJobStore;
pub use sqlite_records::SqliteRecordStore;
pub use store::{AnalysisUpdate, JobStore, RecordFilter, RecordStore};
