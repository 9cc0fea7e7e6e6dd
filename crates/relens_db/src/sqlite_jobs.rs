//! SQLite job store.
//!
//! Jobs are persisted as whole JSON documents alongside a status column so the
//! active-job check and listings stay a plain indexed query. The document is
//! the contract; the columns are bookkeeping.

use async_trait::async_trait;
use relens_protocol::{JobId, JobStatus, ReanalysisJob};
use sqlx::{Pool, Row, Sqlite};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::store::JobStore;

pub struct SqliteJobStore {
    pool: Pool<Sqlite>,
}

impl SqliteJobStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Create the jobs table and its status index.
    pub async fn init_schema(pool: &Pool<Sqlite>) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rl_jobs (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                document TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rl_jobs_status ON rl_jobs(status)")
            .execute(pool)
            .await
            .map_err(StoreError::from_sqlx)?;

        Ok(())
    }

    fn job_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ReanalysisJob> {
        let document: String = row.try_get("document").map_err(StoreError::from_sqlx)?;
        let job: ReanalysisJob = serde_json::from_str(&document)?;
        Ok(job)
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn put(&self, job: &ReanalysisJob) -> Result<()> {
        let document = serde_json::to_string(job)?;

        sqlx::query(
            r#"
            INSERT INTO rl_jobs (id, status, created_at, document)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                document = excluded.document
            "#,
        )
        .bind(job.id.as_ref())
        .bind(job.status.as_str())
        .bind(job.created_at.to_rfc3339())
        .bind(&document)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        debug!("Persisted job {} ({})", job.id, job.status);
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Option<ReanalysisJob>> {
        let row = sqlx::query("SELECT document FROM rl_jobs WHERE id = ?")
            .bind(id.as_ref())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;

        row.map(|r| Self::job_from_row(&r)).transpose()
    }

    async fn find_active(&self) -> Result<Vec<ReanalysisJob>> {
        let rows = sqlx::query(
            r#"
            SELECT document FROM rl_jobs
            WHERE status IN ('QUEUED', 'RUNNING')
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        rows.iter().map(Self::job_from_row).collect()
    }

    async fn list(&self, status: Option<JobStatus>, limit: u32) -> Result<Vec<ReanalysisJob>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    r#"
                    SELECT document FROM rl_jobs
                    WHERE status = ?
                    ORDER BY created_at DESC
                    LIMIT ?
                    "#,
                )
                .bind(status.as_str())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT document FROM rl_jobs
                    ORDER BY created_at DESC
                    LIMIT ?
                    "#,
                )
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(StoreError::from_sqlx)?;

        rows.iter().map(Self::job_from_row).collect()
    }
}
