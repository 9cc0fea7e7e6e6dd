//! Canonical domain types for Relens.
//!
//! The persisted job document defined here is a stable contract: dashboards and
//! operators poll it by field name. Changes to field names or status strings are
//! breaking changes for consumers outside this workspace.

pub mod types;
pub mod version;

// Re-export types for convenience
pub use types::{
    InvalidTransition,
    JobErrorEntry,
    JobId,
    JobParameters,
    JobProgress,
    JobStatistics,
    JobStatus,
    JobSummary,
    ReanalysisJob,
    RecordId,
    TextRecord,
    ToolId,
    TriggerType,
    DEFAULT_BATCH_SIZE,
    MAX_BATCH_SIZE,
    MIN_BATCH_SIZE,
};
pub use version::{AnalysisVersion, VersionParseError};
