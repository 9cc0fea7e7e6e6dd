//! In-memory test doubles with failure injection for engine scenarios.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use relens_db::{AnalysisUpdate, JobStore, RecordFilter, RecordStore, StoreError};
use relens_engine::{AliasResolver, Detector, EngineConfig, JobEngine, RetryPolicy};
use relens_protocol::{
    JobId, JobStatus, ReanalysisJob, RecordId, TextRecord, ToolId,
};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, ReanalysisJob>>,
    puts: Mutex<Vec<(JobStatus, u64)>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            puts: Mutex::new(Vec::new()),
        }
    }

    /// processed_count at every persist that happened in RUNNING state,
    /// in order. Checkpoint cadence is visible here.
    pub fn running_processed_history(&self) -> Vec<u64> {
        self.puts
            .lock()
            .unwrap()
            .iter()
            .filter(|(status, _)| *status == JobStatus::Running)
            .map(|(_, processed)| *processed)
            .collect()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn put(&self, job: &ReanalysisJob) -> Result<(), StoreError> {
        self.puts
            .lock()
            .unwrap()
            .push((job.status, job.progress.processed_count));
        self.jobs
            .lock()
            .unwrap()
            .insert(job.id.0.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Option<ReanalysisJob>, StoreError> {
        Ok(self.jobs.lock().unwrap().get(&id.0).cloned())
    }

    async fn find_active(&self) -> Result<Vec<ReanalysisJob>, StoreError> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| matches!(j.status, JobStatus::Queued | JobStatus::Running))
            .cloned()
            .collect())
    }

    async fn list(
        &self,
        status: Option<JobStatus>,
        limit: u32,
    ) -> Result<Vec<ReanalysisJob>, StoreError> {
        let mut jobs: Vec<_> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| status.map(|s| j.status == s).unwrap_or(true))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit as usize);
        Ok(jobs)
    }
}

pub struct MemoryRecordStore {
    records: Mutex<Vec<TextRecord>>,
    fetch_faults: Mutex<VecDeque<StoreError>>,
    pub fetch_attempts: AtomicU32,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fetch_faults: Mutex::new(VecDeque::new()),
            fetch_attempts: AtomicU32::new(0),
        }
    }

    /// Insert records with sequential ids and staggered timestamps.
    pub fn seed(&self, bodies: &[&str]) -> Vec<RecordId> {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut records = self.records.lock().unwrap();
        let mut ids = Vec::new();
        for body in bodies {
            let id = records.len() as RecordId + 1;
            records.push(TextRecord {
                id,
                body: body.to_string(),
                detected_tool_ids: Vec::new(),
                last_analyzed_at: None,
                analysis_version: "1.0.0".to_string(),
                recorded_at: base + ChronoDuration::minutes(id),
            });
            ids.push(id);
        }
        ids
    }

    pub fn seed_n(&self, n: usize, body: &str) -> Vec<RecordId> {
        let bodies: Vec<&str> = std::iter::repeat(body).take(n).collect();
        self.seed(&bodies)
    }

    /// Fail the next fetch attempt with this error (FIFO per attempt, so a
    /// throttling fault consumes one retry).
    pub fn inject_fetch_fault(&self, err: StoreError) {
        self.fetch_faults.lock().unwrap().push_back(err);
    }

    pub fn record(&self, id: RecordId) -> TextRecord {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .expect("record not seeded")
    }

    pub fn corrupt_version(&self, id: RecordId, version: &str) {
        let mut records = self.records.lock().unwrap();
        let record = records.iter_mut().find(|r| r.id == id).unwrap();
        record.analysis_version = version.to_string();
    }

    pub fn set_detected(&self, id: RecordId, tools: &[&str]) {
        let mut records = self.records.lock().unwrap();
        let record = records.iter_mut().find(|r| r.id == id).unwrap();
        record.detected_tool_ids = tools.iter().map(|t| ToolId::new(*t)).collect();
    }

    fn matches(filter: &RecordFilter, record: &TextRecord) -> bool {
        if let Some(from) = filter.from {
            if record.recorded_at < from {
                return false;
            }
        }
        if let Some(to) = filter.to {
            if record.recorded_at > to {
                return false;
            }
        }
        if let Some(after_id) = filter.after_id {
            if record.id <= after_id {
                return false;
            }
        }
        if let Some(tool_ids) = &filter.tool_ids {
            if !record
                .detected_tool_ids
                .iter()
                .any(|t| tool_ids.contains(t))
            {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn count(&self, filter: &RecordFilter) -> Result<u64, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| Self::matches(filter, r))
            .count() as u64)
    }

    async fn fetch_page(
        &self,
        filter: &RecordFilter,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<TextRecord>, StoreError> {
        self.fetch_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(fault) = self.fetch_faults.lock().unwrap().pop_front() {
            return Err(fault);
        }

        let mut matching: Vec<TextRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| Self::matches(filter, r))
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.id);
        Ok(matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn apply_analysis(
        &self,
        id: RecordId,
        update: &AnalysisUpdate,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::not_found(format!("record {}", id)))?;
        record.detected_tool_ids = update.detected_tool_ids.clone();
        record.last_analyzed_at = Some(update.last_analyzed_at);
        record.analysis_version = update.analysis_version.clone();
        Ok(())
    }
}

/// Substring-vocabulary detector; crashes on payloads containing "BOOM".
pub struct KeywordDetector {
    vocab: Vec<ToolId>,
    pub calls: AtomicU32,
}

impl KeywordDetector {
    pub fn new(vocab: &[&str]) -> Self {
        Self {
            vocab: vocab.iter().map(|t| ToolId::new(*t)).collect(),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Detector for KeywordDetector {
    async fn detect(&self, text: &str) -> anyhow::Result<BTreeSet<ToolId>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("BOOM") {
            anyhow::bail!("detector crashed");
        }
        Ok(self
            .vocab
            .iter()
            .filter(|t| text.contains(t.as_ref()))
            .cloned()
            .collect())
    }
}

/// Alias table resolver; unknown tools resolve to an empty family.
pub struct StaticResolver {
    aliases: HashMap<String, Vec<String>>,
}

impl StaticResolver {
    pub fn empty() -> Self {
        Self {
            aliases: HashMap::new(),
        }
    }

    pub fn with_alias(mut self, primary: &str, aliases: &[&str]) -> Self {
        self.aliases.insert(
            primary.to_string(),
            aliases.iter().map(|a| a.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl AliasResolver for StaticResolver {
    async fn resolve(&self, tool_id: &ToolId) -> anyhow::Result<BTreeSet<ToolId>> {
        Ok(self
            .aliases
            .get(tool_id.as_ref())
            .map(|family| family.iter().map(ToolId::new).collect())
            .unwrap_or_default())
    }
}

/// Millisecond-scale engine config so scenarios run fast.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        retry: RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(8),
        },
        inter_batch_delay: Duration::from_millis(1),
        error_log_limit: 100,
    }
}

pub struct Harness {
    pub jobs: Arc<MemoryJobStore>,
    pub records: Arc<MemoryRecordStore>,
    pub detector: Arc<KeywordDetector>,
    pub engine: JobEngine,
}

pub fn harness_with(vocab: &[&str], resolver: StaticResolver) -> Harness {
    let jobs = Arc::new(MemoryJobStore::new());
    let records = Arc::new(MemoryRecordStore::new());
    let detector = Arc::new(KeywordDetector::new(vocab));
    let engine = JobEngine::new(
        jobs.clone(),
        records.clone(),
        detector.clone(),
        Arc::new(resolver),
        fast_config(),
    );
    Harness {
        jobs,
        records,
        detector,
        engine,
    }
}

pub fn harness(vocab: &[&str]) -> Harness {
    harness_with(vocab, StaticResolver::empty())
}
