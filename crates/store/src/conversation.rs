//! Conversation history operations: append, bounded recent-window reads,
//! and threshold-triggered compaction into `CompressedHistory` rows.

use aitoys_domain::model::{ChatMessage, ChatRole, CompressedHistory};
use aitoys_domain::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::locks::{compaction_key, KeyedLockMap};
use crate::models::{parse_role, parse_timestamp, parse_uuid, ChatMessageRow, CompressedHistoryRow};
use crate::pool::StorePool;

/// Abstracts the LLM call used to condense a run of messages into a
/// summary. The store crate has no knowledge of module registration or
/// provider selection; the caller supplies this.
#[async_trait]
pub trait ConversationSummarizer: Send + Sync {
    async fn summarize(&self, messages: &[ChatMessage], prior_summary: Option<&str>) -> Result<String>;
}

pub struct ConversationStore {
    pool: StorePool,
    locks: KeyedLockMap,
}

/// The newest compressed-history row plus the raw messages that follow it,
/// oldest-first — exactly what a prompt builder needs.
pub struct ConversationWindow {
    pub compressed_summary: Option<String>,
    pub messages: Vec<ChatMessage>,
}

impl ConversationStore {
    pub fn new(pool: StorePool) -> Self {
        Self {
            pool,
            locks: KeyedLockMap::new(),
        }
    }

    pub async fn append_message(
        &self,
        session_id: Uuid,
        agent_id: i64,
        role: ChatRole,
        content: &str,
        audio_path: Option<&str>,
        emotion: Option<&str>,
        copilot_mode: bool,
    ) -> Result<i64> {
        let role_str = match role {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };
        let rec = sqlx::query(
            r#"INSERT INTO chat_messages
                (session_id, agent_id, role, content, audio_path, emotion, copilot_mode)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(session_id.to_string())
        .bind(agent_id)
        .bind(role_str)
        .bind(content)
        .bind(audio_path)
        .bind(emotion)
        .bind(copilot_mode)
        .execute(self.pool.interactive())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(rec.last_insert_rowid())
    }

    pub async fn recent_window(
        &self,
        agent_id: i64,
        copilot_mode: bool,
        limit: u32,
    ) -> Result<ConversationWindow> {
        let latest_compressed: Option<CompressedHistoryRow> = sqlx::query_as(
            r#"SELECT id, agent_id, copilot_mode, summary, content_last_time, created_at
               FROM compressed_history
               WHERE agent_id = ? AND copilot_mode = ?
               ORDER BY content_last_time DESC
               LIMIT 1"#,
        )
        .bind(agent_id)
        .bind(copilot_mode)
        .fetch_optional(self.pool.interactive())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let cutoff = match &latest_compressed {
            Some(row) => Some(row.content_last_time.clone()),
            None => None,
        };

        let rows: Vec<ChatMessageRow> = if let Some(cutoff) = &cutoff {
            sqlx::query_as(
                r#"SELECT id, session_id, agent_id, role, content, audio_path, emotion, copilot_mode, created_at
                   FROM chat_messages
                   WHERE agent_id = ? AND copilot_mode = ? AND created_at > ?
                   ORDER BY created_at DESC
                   LIMIT ?"#,
            )
            .bind(agent_id)
            .bind(copilot_mode)
            .bind(cutoff.as_str())
            .bind(limit as i64)
            .fetch_all(self.pool.interactive())
            .await
        } else {
            sqlx::query_as(
                r#"SELECT id, session_id, agent_id, role, content, audio_path, emotion, copilot_mode, created_at
                   FROM chat_messages
                   WHERE agent_id = ? AND copilot_mode = ?
                   ORDER BY created_at DESC
                   LIMIT ?"#,
            )
            .bind(agent_id)
            .bind(copilot_mode)
            .bind(limit as i64)
            .fetch_all(self.pool.interactive())
            .await
        }
        .map_err(|e| Error::Database(e.to_string()))?;

        let mut messages = rows
            .into_iter()
            .map(ChatMessage::try_from)
            .collect::<Result<Vec<_>>>()?;
        messages.reverse();

        let compressed = match latest_compressed {
            Some(row) => Some(CompressedHistory::try_from(row)?.summary),
            None => None,
        };

        Ok(ConversationWindow {
            compressed_summary: compressed,
            messages,
        })
    }

    /// Summarize and delete the oldest raw messages beyond `threshold` for
    /// this (agent, copilot_mode). No-op (returns `Ok(None)`) if the raw
    /// count is already within the threshold. Serialized per
    /// (agent, copilot_mode) so two sessions never double-compress the
    /// same range.
    pub async fn compact_if_needed(
        &self,
        agent_id: i64,
        copilot_mode: bool,
        threshold: u32,
        summarizer: &dyn ConversationSummarizer,
    ) -> Result<Option<CompressedHistory>> {
        let _permit = self
            .locks
            .acquire(&compaction_key(agent_id, copilot_mode))
            .await;

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chat_messages WHERE agent_id = ? AND copilot_mode = ?",
        )
        .bind(agent_id)
        .bind(copilot_mode)
        .fetch_one(self.pool.background())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if count <= threshold as i64 {
            return Ok(None);
        }

        let overflow = (count - threshold as i64) as i64;
        let stale_rows: Vec<ChatMessageRow> = sqlx::query_as(
            r#"SELECT id, session_id, agent_id, role, content, audio_path, emotion, copilot_mode, created_at
               FROM chat_messages
               WHERE agent_id = ? AND copilot_mode = ?
               ORDER BY created_at ASC
               LIMIT ?"#,
        )
        .bind(agent_id)
        .bind(copilot_mode)
        .bind(overflow)
        .fetch_all(self.pool.background())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if stale_rows.is_empty() {
            return Ok(None);
        }

        let prior_summary: Option<String> = sqlx::query_scalar(
            r#"SELECT summary FROM compressed_history
               WHERE agent_id = ? AND copilot_mode = ?
               ORDER BY content_last_time DESC
               LIMIT 1"#,
        )
        .bind(agent_id)
        .bind(copilot_mode)
        .fetch_optional(self.pool.background())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let stale_ids: Vec<i64> = stale_rows.iter().map(|r| r.id).collect();
        let content_last_time: String = stale_rows
            .last()
            .expect("checked non-empty above")
            .created_at
            .clone();
        let stale_messages = stale_rows
            .into_iter()
            .map(ChatMessage::try_from)
            .collect::<Result<Vec<_>>>()?;

        let summary = summarizer
            .summarize(&stale_messages, prior_summary.as_deref())
            .await?;

        let mut tx = self
            .pool
            .background()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let rec = sqlx::query(
            r#"INSERT INTO compressed_history (agent_id, copilot_mode, summary, content_last_time)
               VALUES (?, ?, ?, ?)"#,
        )
        .bind(agent_id)
        .bind(copilot_mode)
        .bind(summary.as_str())
        .bind(content_last_time.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        for id in &stale_ids {
            sqlx::query("DELETE FROM chat_messages WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::Database(e.to_string()))?;
        }

        tx.commit().await.map_err(|e| Error::Database(e.to_string()))?;

        Ok(Some(CompressedHistory {
            id: rec.last_insert_rowid(),
            agent_id,
            copilot_mode,
            summary,
            content_last_time: parse_timestamp(&content_last_time)?,
            created_at: Utc::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aitoys_domain::config::StoreConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubSummarizer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ConversationSummarizer for StubSummarizer {
        async fn summarize(&self, messages: &[ChatMessage], _prior: Option<&str>) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("summary of {} messages", messages.len()))
        }
    }

    async fn memory_store() -> ConversationStore {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        // Leak the tempdir so it outlives the pool for the duration of the test process.
        std::mem::forget(dir);
        let config = StoreConfig {
            database_url: format!("sqlite://{}?mode=rwc", path.display()),
            max_connections: 1,
            background_connections: 1,
            ..StoreConfig::default()
        };
        let pool = StorePool::connect(&config).await.unwrap();
        ConversationStore::new(pool)
    }

    async fn seed_agent(store: &ConversationStore) -> i64 {
        sqlx::query(
            "INSERT INTO users (login_name, login_type, display_name, password_hash) VALUES ('u', 'password', 'U', 'x')",
        )
        .execute(store.pool.interactive())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO agent_templates (name, target_device_type) VALUES ('t', 'speaker')",
        )
        .execute(store.pool.interactive())
        .await
        .unwrap();
        let rec = sqlx::query(
            "INSERT INTO agent_instances (template_id, owner_user_id) VALUES (1, 1)",
        )
        .execute(store.pool.interactive())
        .await
        .unwrap();
        rec.last_insert_rowid()
    }

    #[tokio::test]
    async fn append_then_recent_window_round_trips() {
        let store = memory_store().await;
        let agent_id = seed_agent(&store).await;
        let session_id = Uuid::new_v4();

        store
            .append_message(session_id, agent_id, ChatRole::User, "hi", None, None, false)
            .await
            .unwrap();
        store
            .append_message(session_id, agent_id, ChatRole::Assistant, "hello", None, None, false)
            .await
            .unwrap();

        let window = store.recent_window(agent_id, false, 10).await.unwrap();
        assert_eq!(window.messages.len(), 2);
        assert_eq!(window.messages[0].content, "hi");
        assert_eq!(window.messages[1].content, "hello");
        assert!(window.compressed_summary.is_none());
    }

    #[tokio::test]
    async fn compact_if_needed_is_noop_below_threshold() {
        let store = memory_store().await;
        let agent_id = seed_agent(&store).await;
        let session_id = Uuid::new_v4();
        for i in 0..5 {
            store
                .append_message(session_id, agent_id, ChatRole::User, &format!("m{i}"), None, None, false)
                .await
                .unwrap();
        }
        let summarizer = StubSummarizer { calls: AtomicUsize::new(0) };
        let result = store
            .compact_if_needed(agent_id, false, 150, &summarizer)
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn compact_if_needed_trims_to_threshold_and_is_idempotent() {
        let store = memory_store().await;
        let agent_id = seed_agent(&store).await;
        let session_id = Uuid::new_v4();
        for i in 0..200 {
            store
                .append_message(session_id, agent_id, ChatRole::User, &format!("m{i}"), None, None, false)
                .await
                .unwrap();
        }

        let summarizer = Arc::new(StubSummarizer { calls: AtomicUsize::new(0) });
        let first = store
            .compact_if_needed(agent_id, false, 150, summarizer.as_ref())
            .await
            .unwrap();
        assert!(first.is_some());
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);

        let window = store.recent_window(agent_id, false, 1_000).await.unwrap();
        assert!(window.messages.len() <= 150);
        assert!(window.compressed_summary.is_some());

        let second = store
            .compact_if_needed(agent_id, false, 150, summarizer.as_ref())
            .await
            .unwrap();
        assert!(second.is_none());
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
    }
}
