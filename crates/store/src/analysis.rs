//! Per-session analysis rows: duration/utterance-length stats plus an
//! LLM-derived structured verdict, with the same pending/processing/
//! completed/failed state machine as growth summaries, capped by a retry
//! counter.

use aitoys_domain::model::{AnalysisStatus, SessionAnalysis};
use aitoys_domain::{Error, Result};
use async_trait::async_trait;
use uuid::Uuid;

const MAX_RETRIES: u32 = 3;

#[async_trait]
pub trait SessionAnalyzer: Send + Sync {
    async fn analyze(&self, session_id: Uuid, duration_secs: u32, avg_child_utterance_len: f32) -> Result<serde_json::Value>;
}

pub struct AnalysisStore {
    pool: crate::pool::StorePool,
}

impl AnalysisStore {
    pub fn new(pool: crate::pool::StorePool) -> Self {
        Self { pool }
    }

    /// Inserts a `pending` row for a completed session. A second call for
    /// the same session is rejected — `session_id` is unique.
    pub async fn schedule(&self, session_id: Uuid, duration_secs: u32, avg_child_utterance_len: f32) -> Result<i64> {
        let rec = sqlx::query(
            r#"INSERT INTO session_analysis (session_id, duration_secs, avg_child_utterance_len, status)
               VALUES (?, ?, ?, 'pending')"#,
        )
        .bind(session_id.to_string())
        .bind(duration_secs as i64)
        .bind(avg_child_utterance_len as f64)
        .execute(self.pool.background())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rec.last_insert_rowid())
    }

    /// Runs the analyzer for one `pending` row, marking it `processing`
    /// first so a concurrent worker does not pick up the same row. On
    /// failure, increments `retry_count`; after `MAX_RETRIES` the row is
    /// left `failed` and requires a manual reset (clearing `retry_count`
    /// back to pending) to be retried again.
    pub async fn process_one(&self, id: i64, analyzer: &dyn SessionAnalyzer) -> Result<()> {
        let row: Option<(String, i64, f64, i64)> = sqlx::query_as(
            "SELECT session_id, duration_secs, avg_child_utterance_len, retry_count FROM session_analysis WHERE id = ? AND status = 'pending'",
        )
        .bind(id)
        .fetch_optional(self.pool.background())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let Some((session_id_str, duration_secs, avg_len, retry_count)) = row else {
            return Ok(());
        };
        let retry_count = retry_count as u32;

        sqlx::query("UPDATE session_analysis SET status = 'processing' WHERE id = ?")
            .bind(id)
            .execute(self.pool.background())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let session_id = Uuid::parse_str(&session_id_str).map_err(|e| Error::Database(e.to_string()))?;

        match analyzer.analyze(session_id, duration_secs as u32, avg_len as f32).await {
            Ok(result) => {
                let payload = serde_json::to_string(&result).map_err(Error::Json)?;
                sqlx::query(
                    "UPDATE session_analysis SET analysis_result = ?, status = 'completed' WHERE id = ?",
                )
                .bind(payload)
                .bind(id)
                .execute(self.pool.background())
                .await
                .map_err(|e| Error::Database(e.to_string()))?;
            }
            Err(err) => {
                let next_retry = retry_count + 1;
                let status = if next_retry >= MAX_RETRIES { "failed" } else { "pending" };
                tracing::warn!(error = %err, session_analysis_id = id, retry_count = next_retry, "session analysis failed");
                sqlx::query("UPDATE session_analysis SET status = ?, retry_count = ? WHERE id = ?")
                    .bind(status)
                    .bind(next_retry)
                    .bind(id)
                    .execute(self.pool.background())
                    .await
                    .map_err(|e| Error::Database(e.to_string()))?;
            }
        }
        Ok(())
    }

    pub async fn get(&self, session_id: Uuid) -> Result<Option<SessionAnalysis>> {
        let row: Option<(i64, i64, f64, String, String, i64)> = sqlx::query_as(
            "SELECT id, duration_secs, avg_child_utterance_len, analysis_result, status, retry_count FROM session_analysis WHERE session_id = ?",
        )
        .bind(session_id.to_string())
        .fetch_optional(self.pool.background())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let Some((id, duration_secs, avg_len, analysis_json, status, retry_count)) = row else {
            return Ok(None);
        };

        Ok(Some(SessionAnalysis {
            id,
            session_id,
            duration_secs: duration_secs as u32,
            avg_child_utterance_len: avg_len as f32,
            analysis: serde_json::from_str(&analysis_json).map_err(Error::Json)?,
            status: parse_status(&status)?,
            retry_count: retry_count as u32,
        }))
    }
}

fn parse_status(s: &str) -> Result<AnalysisStatus> {
    crate::models::parse_analysis_status(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aitoys_domain::config::StoreConfig;
    use crate::pool::StorePool;

    struct StubAnalyzer;

    #[async_trait]
    impl SessionAnalyzer for StubAnalyzer {
        async fn analyze(&self, _session_id: Uuid, _d: u32, _a: f32) -> Result<serde_json::Value> {
            Ok(serde_json::json!({"sentiment": "positive"}))
        }
    }

    struct AlwaysFailAnalyzer;

    #[async_trait]
    impl SessionAnalyzer for AlwaysFailAnalyzer {
        async fn analyze(&self, _session_id: Uuid, _d: u32, _a: f32) -> Result<serde_json::Value> {
            Err(Error::Other("provider unavailable".into()))
        }
    }

    async fn memory_store() -> AnalysisStore {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.db");
        std::mem::forget(dir);
        let config = StoreConfig {
            database_url: format!("sqlite://{}?mode=rwc", path.display()),
            max_connections: 1,
            background_connections: 1,
            ..StoreConfig::default()
        };
        let pool = StorePool::connect(&config).await.unwrap();
        AnalysisStore::new(pool)
    }

    #[tokio::test]
    async fn process_one_marks_completed() {
        let store = memory_store().await;
        let session_id = Uuid::new_v4();
        let id = store.schedule(session_id, 120, 4.5).await.unwrap();
        store.process_one(id, &StubAnalyzer).await.unwrap();

        let analysis = store.get(session_id).await.unwrap().unwrap();
        assert_eq!(analysis.status, AnalysisStatus::Completed);
        assert_eq!(analysis.analysis["sentiment"], "positive");
    }

    #[tokio::test]
    async fn process_one_stays_pending_until_retry_ceiling_then_fails() {
        let store = memory_store().await;
        let session_id = Uuid::new_v4();
        let id = store.schedule(session_id, 60, 3.0).await.unwrap();

        for _ in 0..MAX_RETRIES - 1 {
            store.process_one(id, &AlwaysFailAnalyzer).await.unwrap();
            let analysis = store.get(session_id).await.unwrap().unwrap();
            assert_eq!(analysis.status, AnalysisStatus::Pending);
        }

        store.process_one(id, &AlwaysFailAnalyzer).await.unwrap();
        let analysis = store.get(session_id).await.unwrap().unwrap();
        assert_eq!(analysis.status, AnalysisStatus::Failed);
        assert_eq!(analysis.retry_count, MAX_RETRIES);
    }
}
