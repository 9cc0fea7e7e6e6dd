//! Engine error types.

use relens_db::StoreError;
use relens_protocol::{InvalidTransition, JobId, ToolId};
use thiserror::Error;

/// Engine operation result type.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the job controller's public operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A QUEUED or RUNNING job already exists; no job was created
    #[error("A reanalysis job is already active: {active_job_id}")]
    ActiveJobConflict { active_job_id: JobId },

    /// Unknown job id
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// The requested lifecycle transition is not on the allow-list
    #[error(transparent)]
    InvalidStateTransition(#[from] InvalidTransition),

    /// A store operation failed after retries (or was not retryable)
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// The tool filter could not be expanded to its alias family
    #[error("Alias resolution failed for {tool_id}: {source}")]
    AliasResolution {
        tool_id: ToolId,
        #[source]
        source: anyhow::Error,
    },
}
