//! Job document types.
//!
//! `ReanalysisJob` is the persisted document consumed by operators polling job
//! status. Field names are part of the contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Storage key of a text record. Strictly increasing with insertion order in
/// the reference store; doubles as the checkpoint cursor.
pub type RecordId = i64;

/// Unique job identifier (uuid-v4 backed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new random job ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of a tool in the catalog (primary or alias).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolId(pub String);

impl ToolId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ToolId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Status & transitions
// ============================================================================

/// Reanalysis job lifecycle status.
/// This is the CANONICAL definition - use this everywhere for job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Created, waiting to run
    Queued,
    /// Batch loop in progress
    Running,
    /// Ran to the end of the collection
    Completed,
    /// An error escaped the batch loop
    Failed,
    /// Cancelled before it started
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Explicit transition allow-list. Everything not listed here is rejected;
    /// legality is never inferred from terminal-ness alone.
    ///
    /// Running -> Running is the resume path: an interrupted process leaves the
    /// job RUNNING, and a restart picks it up from its checkpoint.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Running)
                | (Running, Completed)
                | (Running, Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "QUEUED" => Ok(JobStatus::Queued),
            "RUNNING" => Ok(JobStatus::Running),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            "CANCELLED" => Ok(JobStatus::Cancelled),
            _ => Err(format!("Invalid job status: '{}'", s)),
        }
    }
}

/// Rejected job status transition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid job transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// What caused a job to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    /// An operator asked for it
    Manual,
    /// A catalog change hook asked for it
    Automatic,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Manual => "MANUAL",
            TriggerType::Automatic => "AUTOMATIC",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// Smallest accepted batch size.
pub const MIN_BATCH_SIZE: u32 = 1;
/// Largest accepted batch size.
pub const MAX_BATCH_SIZE: u32 = 1000;
/// Batch size used when the caller does not supply one.
pub const DEFAULT_BATCH_SIZE: u32 = 100;

/// Caller-supplied scope of a reanalysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobParameters {
    /// Only records recorded at or after this instant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,

    /// Only records recorded at or before this instant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,

    /// Restrict to these tools (expanded to the full alias family at run time)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_tool_ids: Option<Vec<ToolId>>,

    /// Records fetched and checkpointed per page
    pub batch_size: u32,
}

impl JobParameters {
    /// Clamp batch_size into [MIN_BATCH_SIZE, MAX_BATCH_SIZE].
    pub fn normalized(mut self) -> Self {
        self.batch_size = self.batch_size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE);
        self
    }
}

impl Default for JobParameters {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            target_tool_ids: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

// ============================================================================
// Progress, statistics, error log
// ============================================================================

/// Live progress of a job run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobProgress {
    /// Matching records counted at job creation
    pub total_count: u64,

    /// Records attempted so far ("processed" means attempted, not succeeded)
    pub processed_count: u64,

    /// processed/total * 100, clamped to [0, 100]; 100 when total is 0
    pub percentage: f64,

    /// Id of the last record of the last persisted batch. Monotonically
    /// non-decreasing; restart resumes strictly after it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checkpoint_id: Option<RecordId>,

    /// Seconds left at the observed rate; absent until a rate exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<f64>,
}

impl JobProgress {
    /// Fresh progress for a job over `total_count` records.
    pub fn new(total_count: u64) -> Self {
        let mut progress = Self {
            total_count,
            ..Default::default()
        };
        progress.recompute(0, 0.0);
        progress
    }

    /// Recompute percentage and ETA from the counters and elapsed wall time.
    ///
    /// ETA is `(total - processed) / rate` with `rate = processed_this_run /
    /// elapsed`; undefined while nothing has been processed this run or no
    /// time has passed. The rate comes from this run's work only: after a
    /// resume `processed_count` includes records attempted before the
    /// restart, while `elapsed_secs` does not.
    pub fn recompute(&mut self, processed_this_run: u64, elapsed_secs: f64) {
        self.percentage = if self.total_count == 0 {
            100.0
        } else {
            ((self.processed_count as f64 / self.total_count as f64) * 100.0).clamp(0.0, 100.0)
        };

        self.estimated_time_remaining = if processed_this_run == 0 || elapsed_secs <= 0.0 {
            None
        } else {
            let rate = processed_this_run as f64 / elapsed_secs;
            let remaining = self.total_count.saturating_sub(self.processed_count);
            Some(remaining as f64 / rate)
        };
    }

    /// Advance the checkpoint. Never moves backwards.
    pub fn advance_checkpoint(&mut self, id: RecordId) {
        match self.last_checkpoint_id {
            Some(current) if current >= id => {}
            _ => self.last_checkpoint_id = Some(id),
        }
    }
}

/// Outcome tallies of a job run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStatistics {
    /// tool id -> number of records it was detected in
    pub tools_detected: BTreeMap<ToolId, u64>,

    /// Records whose processing raised an error
    pub errors_count: u64,

    /// Records with at least one detected tool
    pub categorized_count: u64,

    /// Records with no detected tool (empty payloads included)
    pub uncategorized_count: u64,
}

/// One entry of the bounded per-job error log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobErrorEntry {
    /// Absent for batch-level failures (a page fetch, not one record)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<RecordId>,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl JobErrorEntry {
    pub fn record(record_id: RecordId, error: impl Into<String>) -> Self {
        Self {
            record_id: Some(record_id),
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn batch(error: impl Into<String>) -> Self {
        Self {
            record_id: None,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// Job document
// ============================================================================

/// The persisted reanalysis job document.
///
/// Jobs are append-only audit records: the engine creates and mutates them
/// through the transition helpers below but never deletes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReanalysisJob {
    pub id: JobId,
    pub status: JobStatus,
    pub trigger_type: TriggerType,
    pub triggered_by: String,
    pub parameters: JobParameters,
    pub progress: JobProgress,
    pub statistics: JobStatistics,
    pub error_log: Vec<JobErrorEntry>,

    /// Set when the job leaves QUEUED
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    /// Set when the job enters a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl ReanalysisJob {
    /// Create a new queued job over `total_count` matching records.
    pub fn new(
        parameters: JobParameters,
        trigger_type: TriggerType,
        triggered_by: impl Into<String>,
        total_count: u64,
    ) -> Self {
        Self {
            id: JobId::new(),
            status: JobStatus::Queued,
            trigger_type,
            triggered_by: triggered_by.into(),
            parameters: parameters.normalized(),
            progress: JobProgress::new(total_count),
            statistics: JobStatistics::default(),
            error_log: Vec::new(),
            start_time: None,
            end_time: None,
            created_at: Utc::now(),
        }
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(to) {
            return Err(InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// QUEUED -> RUNNING (fresh start) or RUNNING -> RUNNING (resume).
    /// start_time is only stamped on the fresh start.
    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        let resuming = self.status == JobStatus::Running;
        self.transition(JobStatus::Running)?;
        if !resuming {
            self.start_time = Some(Utc::now());
        }
        Ok(())
    }

    /// RUNNING -> COMPLETED. Percentage is forced to 100 on completion.
    pub fn complete(&mut self) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Completed)?;
        self.progress.percentage = 100.0;
        self.progress.estimated_time_remaining = None;
        self.end_time = Some(Utc::now());
        Ok(())
    }

    /// RUNNING -> FAILED, recording the escaping error. Partial progress is
    /// preserved, not rolled back.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Failed)?;
        self.error_log.push(JobErrorEntry::batch(error));
        self.end_time = Some(Utc::now());
        Ok(())
    }

    /// QUEUED -> CANCELLED with an audit note. Only queued jobs are
    /// cancellable; a running batch loop is never preempted.
    pub fn cancel(&mut self, cancelled_by: &str) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Cancelled)?;
        self.error_log
            .push(JobErrorEntry::batch(format!("Cancelled by {}", cancelled_by)));
        self.end_time = Some(Utc::now());
        Ok(())
    }
}

/// Returned to the caller that created a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub status: JobStatus,
    pub estimated_docs: u64,
}

// ============================================================================
// Target record
// ============================================================================

/// A text record in the collection being reprocessed.
///
/// Owned by the record store; the engine only writes `detected_tool_ids`,
/// `last_analyzed_at` and `analysis_version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRecord {
    pub id: RecordId,
    pub body: String,
    pub detected_tool_ids: Vec<ToolId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_analyzed_at: Option<DateTime<Utc>>,
    /// Semantic `major.minor.patch`; patch is bumped on each reclassification
    pub analysis_version: String,
    pub recorded_at: DateTime<Utc>,
}
