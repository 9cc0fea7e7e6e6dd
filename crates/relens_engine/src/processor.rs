//! Per-record processing: detect, write back, classify the outcome.

use crate::detect::Detector;
use crate::retry::{with_backoff, RetryPolicy};
use chrono::Utc;
use relens_db::{AnalysisUpdate, RecordStore, StoreError};
use relens_protocol::{AnalysisVersion, TextRecord, ToolId, VersionParseError};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

/// How one attempted record ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// At least one tool detected
    Categorized(BTreeSet<ToolId>),
    /// No tool detected (empty payloads land here without a detector call)
    Uncategorized,
}

/// Why one record failed. All variants are containable: the controller logs
/// them and moves to the next record.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Detector failed: {0}")]
    Detector(#[source] anyhow::Error),

    #[error(transparent)]
    Version(#[from] VersionParseError),

    #[error("Write-back failed: {0}")]
    Store(#[from] StoreError),
}

pub struct RecordProcessor {
    detector: Arc<dyn Detector>,
    records: Arc<dyn RecordStore>,
    retry: RetryPolicy,
}

impl RecordProcessor {
    pub fn new(
        detector: Arc<dyn Detector>,
        records: Arc<dyn RecordStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            detector,
            records,
            retry,
        }
    }

    /// Reclassify one record.
    ///
    /// Empty payloads are uncategorized and untouched; otherwise the new tool
    /// set is written back together with a refreshed `last_analyzed_at` and a
    /// patch-bumped analysis version. The write retries on throttling like
    /// every other store call.
    pub async fn process(&self, record: &TextRecord) -> Result<RecordOutcome, RecordError> {
        if record.body.trim().is_empty() {
            return Ok(RecordOutcome::Uncategorized);
        }

        let detected = self
            .detector
            .detect(&record.body)
            .await
            .map_err(RecordError::Detector)?;

        let version: AnalysisVersion = record.analysis_version.parse()?;
        let update = AnalysisUpdate {
            detected_tool_ids: detected.iter().cloned().collect(),
            last_analyzed_at: Utc::now(),
            analysis_version: version.bump_patch().to_string(),
        };

        let records = &self.records;
        let update_ref = &update;
        with_backoff(&self.retry, || async move {
            records.apply_analysis(record.id, update_ref).await
        })
        .await?;

        if detected.is_empty() {
            Ok(RecordOutcome::Uncategorized)
        } else {
            Ok(RecordOutcome::Categorized(detected))
        }
    }
}
