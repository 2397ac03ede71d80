//! Scheduled growth-summary rollups. A single background worker pulls
//! `pending` rows whose `scheduled_at` has elapsed, runs the LLM, and
//! writes the result back.

use aitoys_domain::model::{GrowthSummary, SummaryType};
use aitoys_domain::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::models::GrowthSummaryRow;
use crate::pool::StorePool;

#[async_trait]
pub trait GrowthSummarizer: Send + Sync {
    async fn summarize(&self, agent_id: i64, date: NaiveDate, summary_type: SummaryType) -> Result<String>;
}

pub struct GrowthStore {
    pool: StorePool,
}

impl GrowthStore {
    pub fn new(pool: StorePool) -> Self {
        Self { pool }
    }

    /// Enqueue a pending rollup due at `scheduled_at`. A duplicate (agent,
    /// date, type) is a no-op — the row is already scheduled or done.
    pub async fn schedule(
        &self,
        agent_id: i64,
        date: NaiveDate,
        summary_type: SummaryType,
        scheduled_at: DateTime<Utc>,
    ) -> Result<()> {
        let type_str = summary_type_str(summary_type);
        sqlx::query(
            r#"INSERT INTO growth_summaries (agent_id, summary_date, summary_type, status, scheduled_at)
               VALUES (?, ?, ?, 'pending', ?)
               ON CONFLICT (agent_id, summary_date, summary_type) DO NOTHING"#,
        )
        .bind(agent_id)
        .bind(date.format("%Y-%m-%d").to_string())
        .bind(type_str)
        .bind(scheduled_at.to_rfc3339())
        .execute(self.pool.background())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    /// Picks up to `batch_size` pending rows whose `scheduled_at` has
    /// elapsed and runs them through `summarizer`, writing `completed` or
    /// `failed` per-row. Each row is processed independently; a failure on
    /// one does not block others.
    pub async fn run_pending(&self, summarizer: &dyn GrowthSummarizer, batch_size: u32) -> Result<u32> {
        let now = Utc::now().to_rfc3339();
        let rows: Vec<GrowthSummaryRow> = sqlx::query_as(
            r#"SELECT id, agent_id, summary_date, summary_type, content, status, scheduled_at
               FROM growth_summaries
               WHERE status = 'pending' AND scheduled_at <= ?
               ORDER BY id ASC
               LIMIT ?"#,
        )
        .bind(now)
        .bind(batch_size as i64)
        .fetch_all(self.pool.background())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let mut processed = 0;
        for row in rows {
            let id = row.id;
            let summary = GrowthSummary::try_from(row)?;
            match summarizer
                .summarize(summary.agent_id, summary.summary_date, summary.summary_type)
                .await
            {
                Ok(content) => {
                    sqlx::query(
                        "UPDATE growth_summaries SET content = ?, status = 'completed' WHERE id = ?",
                    )
                    .bind(content)
                    .bind(id)
                    .execute(self.pool.background())
                    .await
                    .map_err(|e| Error::Database(e.to_string()))?;
                }
                Err(err) => {
                    tracing::warn!(error = %err, growth_summary_id = id, "growth summary generation failed");
                    sqlx::query("UPDATE growth_summaries SET status = 'failed' WHERE id = ?")
                        .bind(id)
                        .execute(self.pool.background())
                        .await
                        .map_err(|e| Error::Database(e.to_string()))?;
                }
            }
            processed += 1;
        }
        Ok(processed)
    }
}

fn summary_type_str(t: SummaryType) -> &'static str {
    match t {
        SummaryType::Daily => "daily",
        SummaryType::Weekly => "weekly",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aitoys_domain::config::StoreConfig;

    struct StubSummarizer;

    #[async_trait]
    impl GrowthSummarizer for StubSummarizer {
        async fn summarize(&self, agent_id: i64, _date: NaiveDate, _t: SummaryType) -> Result<String> {
            Ok(format!("rollup for agent {agent_id}"))
        }
    }

    struct FailingSummarizer;

    #[async_trait]
    impl GrowthSummarizer for FailingSummarizer {
        async fn summarize(&self, _agent_id: i64, _date: NaiveDate, _t: SummaryType) -> Result<String> {
            Err(Error::Other("provider down".into()))
        }
    }

    async fn memory_store() -> GrowthStore {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("growth.db");
        std::mem::forget(dir);
        let config = StoreConfig {
            database_url: format!("sqlite://{}?mode=rwc", path.display()),
            max_connections: 1,
            background_connections: 1,
            ..StoreConfig::default()
        };
        let pool = StorePool::connect(&config).await.unwrap();
        GrowthStore::new(pool)
    }

    #[tokio::test]
    async fn scheduling_twice_for_same_key_is_a_noop() {
        let store = memory_store().await;
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        store.schedule(1, date, SummaryType::Daily, Utc::now()).await.unwrap();
        store.schedule(1, date, SummaryType::Daily, Utc::now()).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM growth_summaries")
            .fetch_one(store.pool.background())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn run_pending_marks_completed_on_success() {
        let store = memory_store().await;
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        store.schedule(42, date, SummaryType::Weekly, Utc::now()).await.unwrap();

        let processed = store.run_pending(&StubSummarizer, 10).await.unwrap();
        assert_eq!(processed, 1);

        let status: String = sqlx::query_scalar("SELECT status FROM growth_summaries WHERE agent_id = 42")
            .fetch_one(store.pool.background())
            .await
            .unwrap();
        assert_eq!(status, "completed");
    }

    #[tokio::test]
    async fn run_pending_marks_failed_without_blocking_other_rows() {
        let store = memory_store().await;
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        store.schedule(1, date, SummaryType::Daily, Utc::now()).await.unwrap();

        let processed = store.run_pending(&FailingSummarizer, 10).await.unwrap();
        assert_eq!(processed, 1);

        let status: String = sqlx::query_scalar("SELECT status FROM growth_summaries WHERE agent_id = 1")
            .fetch_one(store.pool.background())
            .await
            .unwrap();
        assert_eq!(status, "failed");
    }

    #[tokio::test]
    async fn run_pending_skips_rows_scheduled_in_the_future() {
        let store = memory_store().await;
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let not_due_yet = Utc::now() + chrono::Duration::hours(1);
        store.schedule(7, date, SummaryType::Daily, not_due_yet).await.unwrap();

        let processed = store.run_pending(&StubSummarizer, 10).await.unwrap();
        assert_eq!(processed, 0);

        let status: String = sqlx::query_scalar("SELECT status FROM growth_summaries WHERE agent_id = 7")
            .fetch_one(store.pool.background())
            .await
            .unwrap();
        assert_eq!(status, "pending");
    }
}
