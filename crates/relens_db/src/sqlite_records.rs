//! SQLite record store.
//!
//! Records live in scalar columns with `detected_tool_ids` as a JSON array
//! column; the tool filter matches through `json_each`. Ids are autoincrement
//! rowids, so ascending id order is insertion order and `id > cursor` is a
//! safe resume predicate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relens_protocol::{RecordId, TextRecord, ToolId};
use sqlx::{Pool, QueryBuilder, Row, Sqlite};

use crate::error::{Result, StoreError};
use crate::store::{AnalysisUpdate, RecordFilter, RecordStore};

pub struct SqliteRecordStore {
    pool: Pool<Sqlite>,
}

impl SqliteRecordStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Create the records table and its range-scan index.
    pub async fn init_schema(pool: &Pool<Sqlite>) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rl_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                body TEXT NOT NULL,
                detected_tool_ids TEXT NOT NULL DEFAULT '[]',
                last_analyzed_at TEXT,
                analysis_version TEXT NOT NULL DEFAULT '1.0.0',
                recorded_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_rl_records_recorded_at ON rl_records(recorded_at)",
        )
        .execute(pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(())
    }

    /// Insert a record (operator seeding / ingest tooling, not the engine).
    pub async fn insert_record(
        &self,
        body: &str,
        recorded_at: DateTime<Utc>,
    ) -> Result<RecordId> {
        let result = sqlx::query(
            r#"
            INSERT INTO rl_records (body, detected_tool_ids, analysis_version, recorded_at)
            VALUES (?, '[]', '1.0.0', ?)
            "#,
        )
        .bind(body)
        .bind(recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(result.last_insert_rowid())
    }

    fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &RecordFilter) {
        if let Some(from) = filter.from {
            qb.push(" AND recorded_at >= ");
            qb.push_bind(from.to_rfc3339());
        }
        if let Some(to) = filter.to {
            qb.push(" AND recorded_at <= ");
            qb.push_bind(to.to_rfc3339());
        }
        if let Some(after_id) = filter.after_id {
            qb.push(" AND id > ");
            qb.push_bind(after_id);
        }
        if let Some(tool_ids) = &filter.tool_ids {
            qb.push(
                " AND EXISTS (SELECT 1 FROM json_each(rl_records.detected_tool_ids) \
                 WHERE json_each.value IN (",
            );
            let mut separated = qb.separated(", ");
            for tool_id in tool_ids {
                separated.push_bind(tool_id.as_ref().to_string());
            }
            qb.push("))");
        }
    }

    fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<TextRecord> {
        let tool_ids_json: String = row
            .try_get("detected_tool_ids")
            .map_err(StoreError::from_sqlx)?;
        let detected_tool_ids: Vec<ToolId> = serde_json::from_str(&tool_ids_json)?;

        let last_analyzed_at: Option<String> = row
            .try_get("last_analyzed_at")
            .map_err(StoreError::from_sqlx)?;
        let last_analyzed_at = last_analyzed_at
            .map(|s| parse_timestamp(&s, "last_analyzed_at"))
            .transpose()?;

        let recorded_at: String = row.try_get("recorded_at").map_err(StoreError::from_sqlx)?;

        Ok(TextRecord {
            id: row.try_get("id").map_err(StoreError::from_sqlx)?,
            body: row.try_get("body").map_err(StoreError::from_sqlx)?,
            detected_tool_ids,
            last_analyzed_at,
            analysis_version: row
                .try_get("analysis_version")
                .map_err(StoreError::from_sqlx)?,
            recorded_at: parse_timestamp(&recorded_at, "recorded_at")?,
        })
    }
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::corrupt(format!("bad {} '{}': {}", column, value, e)))
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn count(&self, filter: &RecordFilter) -> Result<u64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM rl_records WHERE 1=1");
        Self::push_filter(&mut qb, filter);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;

        Ok(count as u64)
    }

    async fn fetch_page(
        &self,
        filter: &RecordFilter,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<TextRecord>> {
        let mut qb = QueryBuilder::new(
            "SELECT id, body, detected_tool_ids, last_analyzed_at, analysis_version, recorded_at \
             FROM rl_records WHERE 1=1",
        );
        Self::push_filter(&mut qb, filter);
        qb.push(" ORDER BY id ASC LIMIT ");
        qb.push_bind(limit as i64);
        qb.push(" OFFSET ");
        qb.push_bind(offset as i64);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;

        rows.iter().map(Self::record_from_row).collect()
    }

    async fn apply_analysis(&self, id: RecordId, update: &AnalysisUpdate) -> Result<()> {
        let tool_ids_json = serde_json::to_string(&update.detected_tool_ids)?;

        let result = sqlx::query(
            r#"
            UPDATE rl_records
            SET detected_tool_ids = ?,
                last_analyzed_at = ?,
                analysis_version = ?
            WHERE id = ?
            "#,
        )
        .bind(&tool_ids_json)
        .bind(update.last_analyzed_at.to_rfc3339())
        .bind(&update.analysis_version)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("record {}", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_store() -> SqliteRecordStore {
        let pool = SqlitePoolOptions::new().connect(":memory:").await.unwrap();
        SqliteRecordStore::init_schema(&pool).await.unwrap();
        SqliteRecordStore::new(pool)
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, d, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_insert_ids_are_strictly_increasing() {
        let store = setup_store().await;

        let mut last = 0;
        for i in 0..5 {
            let id = store
                .insert_record(&format!("record {}", i), day(1))
                .await
                .unwrap();
            assert!(id > last);
            last = id;
        }
    }

    #[tokio::test]
    async fn test_count_with_date_bounds() {
        let store = setup_store().await;
        for d in 1..=10 {
            store.insert_record("body", day(d)).await.unwrap();
        }

        let all = store.count(&RecordFilter::default()).await.unwrap();
        assert_eq!(all, 10);

        let filter = RecordFilter {
            from: Some(day(3)),
            to: Some(day(7)),
            ..Default::default()
        };
        assert_eq!(store.count(&filter).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_fetch_page_orders_and_paginates() {
        let store = setup_store().await;
        for i in 0..7 {
            store
                .insert_record(&format!("record {}", i), day(1))
                .await
                .unwrap();
        }

        let filter = RecordFilter::default();
        let first = store.fetch_page(&filter, 0, 3).await.unwrap();
        let second = store.fetch_page(&filter, 3, 3).await.unwrap();
        let third = store.fetch_page(&filter, 6, 3).await.unwrap();
        let past_end = store.fetch_page(&filter, 9, 3).await.unwrap();

        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 3);
        assert_eq!(third.len(), 1);
        assert!(past_end.is_empty());

        let ids: Vec<_> = first
            .iter()
            .chain(&second)
            .chain(&third)
            .map(|r| r.id)
            .collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[tokio::test]
    async fn test_after_id_resume_predicate() {
        let store = setup_store().await;
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(store.insert_record(&format!("r{}", i), day(1)).await.unwrap());
        }

        let filter = RecordFilter {
            after_id: Some(ids[2]),
            ..Default::default()
        };
        let page = store.fetch_page(&filter, 0, 100).await.unwrap();
        assert_eq!(page.len(), 2);
        assert!(page.iter().all(|r| r.id > ids[2]));
    }

    #[tokio::test]
    async fn test_apply_analysis_roundtrip() {
        let store = setup_store().await;
        let id = store.insert_record("uses hammerwrench daily", day(1)).await.unwrap();

        let update = AnalysisUpdate {
            detected_tool_ids: vec![ToolId::new("hammerwrench")],
            last_analyzed_at: day(2),
            analysis_version: "1.0.1".to_string(),
        };
        store.apply_analysis(id, &update).await.unwrap();

        let page = store.fetch_page(&RecordFilter::default(), 0, 10).await.unwrap();
        let record = &page[0];
        assert_eq!(record.detected_tool_ids, vec![ToolId::new("hammerwrench")]);
        assert_eq!(record.analysis_version, "1.0.1");
        assert_eq!(record.last_analyzed_at, Some(day(2)));
    }

    #[tokio::test]
    async fn test_apply_analysis_unknown_record() {
        let store = setup_store().await;
        let update = AnalysisUpdate {
            detected_tool_ids: vec![],
            last_analyzed_at: day(1),
            analysis_version: "1.0.1".to_string(),
        };
        let err = store.apply_analysis(999, &update).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_tool_filter_matches_any_of_family() {
        let store = setup_store().await;
        let a = store.insert_record("a", day(1)).await.unwrap();
        let b = store.insert_record("b", day(1)).await.unwrap();
        let _c = store.insert_record("c", day(1)).await.unwrap();

        for (id, tool) in [(a, "saw-pro"), (b, "saw-classic")] {
            store
                .apply_analysis(
                    id,
                    &AnalysisUpdate {
                        detected_tool_ids: vec![ToolId::new(tool)],
                        last_analyzed_at: day(1),
                        analysis_version: "1.0.1".to_string(),
                    },
                )
                .await
                .unwrap();
        }

        // Family of saw-pro and its merged alias saw-classic
        let filter = RecordFilter {
            tool_ids: Some(
                [ToolId::new("saw-pro"), ToolId::new("saw-classic")]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        };
        let matched = store.fetch_page(&filter, 0, 10).await.unwrap();
        assert_eq!(matched.len(), 2);
        assert_eq!(store.count(&filter).await.unwrap(), 2);
    }
}
