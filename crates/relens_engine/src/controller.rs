//! Job Controller: owns the state machine and orchestrates one job run.

use crate::batch::BatchIterator;
use crate::config::EngineConfig;
use crate::context::JobRunContext;
use crate::detect::{AliasResolver, Detector};
use crate::error::{EngineError, Result};
use crate::processor::RecordProcessor;
use crate::retry::with_backoff;
use relens_db::{JobStore, RecordFilter, RecordStore, StoreError};
use relens_protocol::{
    JobId, JobParameters, JobStatus, JobSummary, ReanalysisJob, TriggerType,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// The reanalysis engine. Explicitly constructed by a composition root and
/// passed by reference to callers; there is no process-wide instance.
pub struct JobEngine {
    jobs: Arc<dyn JobStore>,
    records: Arc<dyn RecordStore>,
    detector: Arc<dyn Detector>,
    resolver: Arc<dyn AliasResolver>,
    config: EngineConfig,
}

impl JobEngine {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        records: Arc<dyn RecordStore>,
        detector: Arc<dyn Detector>,
        resolver: Arc<dyn AliasResolver>,
        config: EngineConfig,
    ) -> Self {
        Self {
            jobs,
            records,
            detector,
            resolver,
            config,
        }
    }

    /// Create a new QUEUED job.
    ///
    /// Rejected with `ActiveJobConflict` while any job is QUEUED or RUNNING.
    /// The check is read-then-create and not atomic; see DESIGN.md for the
    /// known race window between near-simultaneous creates.
    pub async fn create_job(
        &self,
        parameters: JobParameters,
        trigger_type: TriggerType,
        triggered_by: &str,
    ) -> Result<JobSummary> {
        let jobs = &self.jobs;
        let active = with_backoff(&self.config.retry, || async move {
            jobs.find_active().await
        })
        .await?;

        if let Some(active_job) = active.into_iter().next() {
            return Err(EngineError::ActiveJobConflict {
                active_job_id: active_job.id,
            });
        }

        // total_count applies the date filter only; the tool filter is
        // expanded at run time
        let count_filter = RecordFilter {
            from: parameters.from,
            to: parameters.to,
            ..Default::default()
        };
        let records = &self.records;
        let filter_ref = &count_filter;
        let total = with_backoff(&self.config.retry, || async move {
            records.count(filter_ref).await
        })
        .await?;

        let job = ReanalysisJob::new(parameters, trigger_type, triggered_by, total);
        self.persist_job(&job).await?;

        info!(
            "Created job {} ({} trigger by {}): {} records in scope",
            job.id, job.trigger_type, job.triggered_by, total
        );

        Ok(JobSummary {
            job_id: job.id,
            status: job.status,
            estimated_docs: total,
        })
    }

    /// Drive a job to a terminal state.
    ///
    /// QUEUED jobs start fresh; a RUNNING job is an interrupted run and
    /// resumes strictly after its checkpoint. Terminal jobs are rejected. The
    /// terminal document is persisted on both the success and failure path.
    pub async fn run_job(&self, id: &JobId) -> Result<ReanalysisJob> {
        let mut job = self.load_job(id).await?;
        let resuming = job.status == JobStatus::Running;

        job.start()?;
        self.persist_job(&job).await?;
        if resuming {
            info!(
                "Resuming job {} from checkpoint {:?} ({} already processed)",
                job.id, job.progress.last_checkpoint_id, job.progress.processed_count
            );
        } else {
            info!("Started job {}", job.id);
        }

        let mut ctx = JobRunContext::new(job, self.config.error_log_limit);

        match self.run_batches(&mut ctx).await {
            Ok(()) => {
                ctx.job.complete()?;
                self.persist_job(&ctx.job).await?;
                info!(
                    "Job {} completed: {} processed, {} categorized, {} uncategorized, {} errors",
                    ctx.job.id,
                    ctx.job.progress.processed_count,
                    ctx.job.statistics.categorized_count,
                    ctx.job.statistics.uncategorized_count,
                    ctx.job.statistics.errors_count
                );
                Ok(ctx.job)
            }
            Err(err) => {
                error!("Job {} failed: {}", ctx.job.id, err);
                if let Err(transition_err) = ctx.job.fail(err.to_string()) {
                    error!(
                        "Could not mark job {} failed: {}",
                        ctx.job.id, transition_err
                    );
                }
                // Persist the terminal state even along the failure path;
                // partial progress is preserved, not rolled back
                if let Err(persist_err) = self.persist_job(&ctx.job).await {
                    error!(
                        "Failed to persist FAILED state of job {}: {}",
                        ctx.job.id, persist_err
                    );
                }
                Err(err)
            }
        }
    }

    /// Cancel a QUEUED job. Running jobs are never preempted.
    pub async fn cancel_job(&self, id: &JobId, cancelled_by: &str) -> Result<ReanalysisJob> {
        let mut job = self.load_job(id).await?;
        job.cancel(cancelled_by)?;
        self.persist_job(&job).await?;
        info!("Cancelled job {} (by {})", job.id, cancelled_by);
        Ok(job)
    }

    /// Point read for the trigger surface.
    pub async fn get_job(&self, id: &JobId) -> Result<ReanalysisJob> {
        self.load_job(id).await
    }

    /// Jobs newest first, optionally filtered by status.
    pub async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: u32,
    ) -> Result<Vec<ReanalysisJob>> {
        let jobs = &self.jobs;
        Ok(with_backoff(&self.config.retry, || async move {
            jobs.list(status, limit).await
        })
        .await?)
    }

    /// Jobs left RUNNING by an interrupted process. With a single engine
    /// process any RUNNING job found at startup is dead and can be re-run.
    pub async fn recover_interrupted(&self) -> Result<Vec<JobId>> {
        let jobs = &self.jobs;
        let active = with_backoff(&self.config.retry, || async move {
            jobs.find_active().await
        })
        .await?;

        Ok(active
            .into_iter()
            .filter(|j| j.status == JobStatus::Running)
            .map(|j| j.id)
            .collect())
    }

    async fn load_job(&self, id: &JobId) -> Result<ReanalysisJob> {
        let jobs = &self.jobs;
        let job = with_backoff(&self.config.retry, || async move { jobs.get(id).await }).await?;
        job.ok_or_else(|| EngineError::JobNotFound(id.clone()))
    }

    async fn persist_job(&self, job: &ReanalysisJob) -> std::result::Result<(), StoreError> {
        let jobs = &self.jobs;
        with_backoff(&self.config.retry, || async move { jobs.put(job).await }).await
    }

    /// Expand the run filter: date bounds, alias-resolved tool family, and
    /// the resume predicate from the last checkpoint.
    async fn build_filter(&self, job: &ReanalysisJob) -> Result<RecordFilter> {
        let tool_ids = match &job.parameters.target_tool_ids {
            Some(targets) if !targets.is_empty() => {
                let mut family = BTreeSet::new();
                for tool_id in targets {
                    let resolved = self.resolver.resolve(tool_id).await.map_err(|source| {
                        EngineError::AliasResolution {
                            tool_id: tool_id.clone(),
                            source,
                        }
                    })?;
                    family.insert(tool_id.clone());
                    family.extend(resolved);
                }
                Some(family)
            }
            _ => None,
        };

        Ok(RecordFilter {
            from: job.parameters.from,
            to: job.parameters.to,
            tool_ids,
            after_id: job.progress.last_checkpoint_id,
        })
    }

    /// The batch loop. Errors escaping here are job-fatal; per-record and
    /// per-batch failures are contained inside.
    async fn run_batches(&self, ctx: &mut JobRunContext) -> Result<()> {
        let filter = self.build_filter(&ctx.job).await?;
        let total = ctx.job.progress.total_count;
        let mut iter = BatchIterator::new(
            self.records.clone(),
            filter,
            ctx.job.parameters.batch_size,
            self.config.retry.clone(),
        );
        let processor = RecordProcessor::new(
            self.detector.clone(),
            self.records.clone(),
            self.config.retry.clone(),
        );

        loop {
            match iter.next_page().await {
                Ok(None) => break,
                Ok(Some(page)) => {
                    for record in &page {
                        match processor.process(record).await {
                            Ok(outcome) => ctx.record_outcome(outcome),
                            Err(err) => {
                                warn!(
                                    "Job {}: record {} failed: {}",
                                    ctx.job.id, record.id, err
                                );
                                ctx.record_failure(record.id, err.to_string());
                            }
                        }
                    }

                    if let Some(last) = page.last() {
                        ctx.checkpoint(last.id);
                    }
                    self.persist_job(&ctx.job).await?;
                    debug!(
                        "Job {}: checkpointed batch of {} at {:?} ({:.1}%)",
                        ctx.job.id,
                        page.len(),
                        ctx.job.progress.last_checkpoint_id,
                        ctx.job.progress.percentage
                    );
                }
                Err(err) => {
                    // Batch-level containment: log, skip the offset, move on
                    warn!(
                        "Job {}: page fetch failed, skipping batch: {}",
                        ctx.job.id, err
                    );
                    ctx.record_batch_failure(err.to_string());
                    self.persist_job(&ctx.job).await?;

                    // A store that fails every fetch would otherwise never
                    // produce the terminating empty page
                    if iter.offset() >= total {
                        break;
                    }
                }
            }

            tokio::time::sleep(self.config.inter_batch_delay).await;
        }

        Ok(())
    }
}
