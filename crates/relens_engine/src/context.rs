//! Mutable state of one job run, carried as a single explicit value instead of
//! loose locals threaded through the batch loop.

use crate::processor::RecordOutcome;
use relens_protocol::{JobErrorEntry, ReanalysisJob, RecordId};
use std::time::Instant;
use tracing::debug;

pub struct JobRunContext {
    /// The job document being updated; folded back to the store at every
    /// checkpoint.
    pub job: ReanalysisJob,
    run_started: Instant,
    /// processed_count when this run started; nonzero on a resume
    processed_at_start: u64,
    error_log_limit: usize,
}

impl JobRunContext {
    pub fn new(job: ReanalysisJob, error_log_limit: usize) -> Self {
        let processed_at_start = job.progress.processed_count;
        Self {
            job,
            run_started: Instant::now(),
            processed_at_start,
            error_log_limit,
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.run_started.elapsed().as_secs_f64()
    }

    /// Records attempted since this run started. The ETA rate comes from
    /// this, not the cumulative counter, so a resume does not inherit the
    /// throughput of work done before the restart.
    pub fn processed_this_run(&self) -> u64 {
        self.job
            .progress
            .processed_count
            .saturating_sub(self.processed_at_start)
    }

    /// Record one attempted record that processed without raising.
    pub fn record_outcome(&mut self, outcome: RecordOutcome) {
        self.job.progress.processed_count += 1;
        match outcome {
            RecordOutcome::Categorized(tools) => {
                self.job.statistics.categorized_count += 1;
                for tool in tools {
                    *self.job.statistics.tools_detected.entry(tool).or_insert(0) += 1;
                }
            }
            RecordOutcome::Uncategorized => {
                self.job.statistics.uncategorized_count += 1;
            }
        }
    }

    /// Record one attempted record that raised. "Processed" means attempted,
    /// so the counter still advances.
    pub fn record_failure(&mut self, record_id: RecordId, error: impl Into<String>) {
        self.job.progress.processed_count += 1;
        self.job.statistics.errors_count += 1;
        self.push_error(JobErrorEntry::record(record_id, error));
    }

    /// Record a page fetch that failed outright (batch skipped, job continues).
    pub fn record_batch_failure(&mut self, error: impl Into<String>) {
        self.job.statistics.errors_count += 1;
        self.push_error(JobErrorEntry::batch(error));
    }

    fn push_error(&mut self, entry: JobErrorEntry) {
        if self.job.error_log.len() < self.error_log_limit {
            self.job.error_log.push(entry);
        } else {
            debug!(
                "Error log for job {} at capacity ({}), dropping entry",
                self.job.id, self.error_log_limit
            );
        }
    }

    /// Advance the checkpoint past a persisted batch and refresh
    /// percentage/ETA. The caller persists the document afterwards; that
    /// write is the resumability point.
    pub fn checkpoint(&mut self, last_record_id: RecordId) {
        self.job.progress.advance_checkpoint(last_record_id);
        let elapsed = self.elapsed_secs();
        let this_run = self.processed_this_run();
        self.job.progress.recompute(this_run, elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relens_protocol::{JobParameters, ToolId, TriggerType};
    use std::collections::BTreeSet;

    fn make_ctx(total: u64, limit: usize) -> JobRunContext {
        let job = ReanalysisJob::new(JobParameters::default(), TriggerType::Manual, "ops", total);
        JobRunContext::new(job, limit)
    }

    #[test]
    fn test_outcomes_update_statistics() {
        let mut ctx = make_ctx(10, 100);

        let tools: BTreeSet<_> = [ToolId::new("tool-a"), ToolId::new("tool-b")]
            .into_iter()
            .collect();
        ctx.record_outcome(RecordOutcome::Categorized(tools));
        ctx.record_outcome(RecordOutcome::Uncategorized);
        ctx.record_failure(7, "detector exploded");

        let stats = &ctx.job.statistics;
        assert_eq!(stats.categorized_count, 1);
        assert_eq!(stats.uncategorized_count, 1);
        assert_eq!(stats.errors_count, 1);
        assert_eq!(stats.tools_detected[&ToolId::new("tool-a")], 1);
        assert_eq!(stats.tools_detected[&ToolId::new("tool-b")], 1);

        // All three were attempted
        assert_eq!(ctx.job.progress.processed_count, 3);
    }

    #[test]
    fn test_error_log_is_bounded() {
        let mut ctx = make_ctx(1000, 5);
        for i in 0..20 {
            ctx.record_failure(i, "bad record");
        }
        assert_eq!(ctx.job.error_log.len(), 5);
        assert_eq!(ctx.job.statistics.errors_count, 20);
        assert_eq!(ctx.job.progress.processed_count, 20);
    }

    #[test]
    fn test_batch_failure_has_no_record_id() {
        let mut ctx = make_ctx(10, 100);
        ctx.record_batch_failure("page fetch failed");
        assert_eq!(ctx.job.error_log.len(), 1);
        assert!(ctx.job.error_log[0].record_id.is_none());
        // A failed fetch attempted no records
        assert_eq!(ctx.job.progress.processed_count, 0);
    }

    #[test]
    fn test_resumed_run_counts_only_its_own_work() {
        let mut job =
            ReanalysisJob::new(JobParameters::default(), TriggerType::Manual, "ops", 100);
        // Interrupted run got through 60 before dying
        job.progress.processed_count = 60;

        let mut ctx = JobRunContext::new(job, 100);
        assert_eq!(ctx.processed_this_run(), 0);

        for _ in 0..10 {
            ctx.record_outcome(RecordOutcome::Uncategorized);
        }
        assert_eq!(ctx.job.progress.processed_count, 70);
        assert_eq!(ctx.processed_this_run(), 10);
    }

    #[test]
    fn test_checkpoint_refreshes_percentage() {
        let mut ctx = make_ctx(100, 100);
        for _ in 0..25 {
            ctx.record_outcome(RecordOutcome::Uncategorized);
        }
        ctx.checkpoint(25);
        assert_eq!(ctx.job.progress.last_checkpoint_id, Some(25));
        assert_eq!(ctx.job.progress.percentage, 25.0);
    }
}
