//! Store trait seams between the engine and storage backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relens_protocol::{JobId, JobStatus, ReanalysisJob, RecordId, TextRecord, ToolId};
use std::collections::BTreeSet;

use crate::error::Result;

/// Scope of a record query: optional date bounds, the alias-expanded target
/// tool family, and the resume predicate.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// recorded_at >= from
    pub from: Option<DateTime<Utc>>,
    /// recorded_at <= to
    pub to: Option<DateTime<Utc>>,
    /// Only records currently carrying at least one of these tool ids.
    /// Already expanded to the full alias family by the caller.
    pub tool_ids: Option<BTreeSet<ToolId>>,
    /// Only records with id strictly greater than this (checkpoint resume)
    pub after_id: Option<RecordId>,
}

/// The three record fields the engine owns.
#[derive(Debug, Clone)]
pub struct AnalysisUpdate {
    pub detected_tool_ids: Vec<ToolId>,
    pub last_analyzed_at: DateTime<Utc>,
    pub analysis_version: String,
}

/// Point read/write access to persisted job documents.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or replace the job document keyed by its id.
    async fn put(&self, job: &ReanalysisJob) -> Result<()>;

    /// Point read by id.
    async fn get(&self, id: &JobId) -> Result<Option<ReanalysisJob>>;

    /// Jobs holding status QUEUED or RUNNING (the single-active-job check).
    async fn find_active(&self) -> Result<Vec<ReanalysisJob>>;

    /// Jobs newest first, optionally filtered by status.
    async fn list(&self, status: Option<JobStatus>, limit: u32) -> Result<Vec<ReanalysisJob>>;
}

/// Ordered, range-filterable, paginated access to the record collection.
///
/// Implementations must return pages in ascending id order, with ids strictly
/// monotonic with respect to insertion/visibility order - checkpoint resume
/// relies on `id > cursor` never skipping an unseen record.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Number of records matching the filter.
    async fn count(&self, filter: &RecordFilter) -> Result<u64>;

    /// One page, ascending by id, at `offset` within the filtered ordering.
    async fn fetch_page(
        &self,
        filter: &RecordFilter,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<TextRecord>>;

    /// Write back the engine-owned analysis fields of one record.
    async fn apply_analysis(&self, id: RecordId, update: &AnalysisUpdate) -> Result<()>;
}
