//! Batch persistence for `AiMetric` rows produced by
//! `aitoys_modules::metrics::MetricsRecorder`. The recorder owns buffering
//! and the in-memory quota cache; this module only knows how to write a
//! batch to SQL and how to requeue it on failure.

use aitoys_domain::model::AiMetric;
use aitoys_domain::{Error, Result};
use aitoys_modules::metrics::MetricsRecorder;

use crate::pool::StorePool;

pub struct MetricsStore {
    pool: StorePool,
}

impl MetricsStore {
    pub fn new(pool: StorePool) -> Self {
        Self { pool }
    }

    /// Drains whatever `recorder` has buffered and inserts it in one
    /// transaction. On failure, the drained rows are requeued into the
    /// recorder so the next flush tick retries them.
    pub async fn flush(&self, agent_id: i64, recorder: &MetricsRecorder) -> Result<usize> {
        let batch = recorder.drain_batch();
        if batch.is_empty() {
            return Ok(0);
        }

        match self.insert_batch(&batch).await {
            Ok(()) => Ok(batch.len()),
            Err(err) => {
                tracing::warn!(error = %err, agent_id, rows = batch.len(), "metrics flush failed, requeuing");
                recorder.requeue(batch);
                Err(err)
            }
        }
    }

    async fn insert_batch(&self, batch: &[AiMetric]) -> Result<()> {
        let mut tx = self
            .pool
            .background()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        for row in batch {
            sqlx::query(
                r#"INSERT INTO ai_metrics
                    (monitor_id, provider, model, session_id, started_at, ended_at,
                     input_tokens, output_tokens, input_chars, output_chars, tool_call_count,
                     input_cost, output_cost, total_cost,
                     first_byte_latency_ms, first_token_latency_ms, total_time_ms)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&row.monitor_id)
            .bind(&row.provider)
            .bind(&row.model)
            .bind(row.session_id.to_string())
            .bind(row.started_at.to_rfc3339())
            .bind(row.ended_at.to_rfc3339())
            .bind(row.input_tokens as i64)
            .bind(row.output_tokens as i64)
            .bind(row.input_chars as i64)
            .bind(row.output_chars as i64)
            .bind(row.tool_call_count as i64)
            .bind(row.cost.input_cost)
            .bind(row.cost.output_cost)
            .bind(row.cost.total_cost)
            .bind(row.first_byte_latency_ms.map(|v| v as i64))
            .bind(row.first_token_latency_ms.map(|v| v as i64))
            .bind(row.total_time_ms as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        }

        tx.commit().await.map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aitoys_domain::config::StoreConfig;
    use aitoys_modules::metrics::MonitorScope;
    use uuid::Uuid;

    async fn memory_store() -> MetricsStore {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.db");
        std::mem::forget(dir);
        let config = StoreConfig {
            database_url: format!("sqlite://{}?mode=rwc", path.display()),
            max_connections: 1,
            background_connections: 1,
            ..StoreConfig::default()
        };
        let pool = StorePool::connect(&config).await.unwrap();
        MetricsStore::new(pool)
    }

    #[tokio::test]
    async fn flush_writes_all_buffered_rows() {
        let store = memory_store().await;
        let recorder = MetricsRecorder::new(1_000, 100.0);
        for _ in 0..3 {
            let metric = MonitorScope::open("openai-compat", "gpt-4o", Uuid::new_v4(), 10).close(
                5,
                20,
                10,
                0,
                Default::default(),
            );
            recorder.record(1, metric);
        }

        let flushed = store.flush(1, &recorder).await.unwrap();
        assert_eq!(flushed, 3);
        assert_eq!(recorder.buffered_len(), 0);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ai_metrics")
            .fetch_one(store.pool.background())
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn flush_of_empty_buffer_is_a_noop() {
        let store = memory_store().await;
        let recorder = MetricsRecorder::new(1_000, 100.0);
        assert_eq!(store.flush(1, &recorder).await.unwrap(), 0);
    }
}
