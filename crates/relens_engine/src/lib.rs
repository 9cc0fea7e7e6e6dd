//! Reanalysis Job Engine
//!
//! Re-derives tool-mention classifications across the record collection when
//! the ruleset changes. One job runs at a time; progress is checkpointed after
//! every batch so an interrupted run resumes without reprocessing; storage
//! throttling is retried with exponential backoff; one bad record never
//! poisons a batch.
//!
//! # Concurrency
//!
//! A job executes as a single long-lived task suspending cooperatively at
//! every store call and sleep. The single-active-job check is read-then-create
//! against the job store and therefore best-effort: two near-simultaneous
//! creates can race. See DESIGN.md.

pub mod batch;
pub mod config;
pub mod context;
pub mod controller;
pub mod detect;
pub mod error;
pub mod processor;
pub mod retry;

pub use config::EngineConfig;
pub use context::JobRunContext;
pub use controller::JobEngine;
pub use detect::{AliasResolver, Detector};
pub use error::EngineError;
pub use processor::{RecordError, RecordOutcome, RecordProcessor};
pub use retry::RetryPolicy;
