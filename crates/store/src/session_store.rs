//! Session row CRUD plus the resolve/reconnect lookup the gateway uses on
//! `hello`: given a client-supplied `session_id`, find the still-live
//! session row so a reconnecting client can be reattached instead of
//! starting a new conversation thread.

use aitoys_domain::model::{OrchestratorState, Session};
use aitoys_domain::{Error, Result};
use uuid::Uuid;

use crate::models::{parse_state, parse_timestamp, parse_uuid};
use crate::pool::StorePool;

pub struct SessionStore {
    pool: StorePool,
}

impl SessionStore {
    pub fn new(pool: StorePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user_id: i64, agent_id: i64, copilot_mode: bool) -> Result<Session> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"INSERT INTO sessions (id, user_id, agent_id, copilot_mode, state)
               VALUES (?, ?, ?, ?, 'idle')"#,
        )
        .bind(id.to_string())
        .bind(user_id)
        .bind(agent_id)
        .bind(copilot_mode)
        .execute(self.pool.interactive())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        self.get(id).await?.ok_or_else(|| Error::Database("session vanished after insert".into()))
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Session>> {
        let row: Option<(String, i64, i64, bool, String, String, String)> = sqlx::query_as(
            "SELECT id, user_id, agent_id, copilot_mode, state, created_at, last_activity_at FROM sessions WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(self.pool.interactive())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let Some((id_str, user_id, agent_id, copilot_mode, state, created_at, last_activity_at)) = row else {
            return Ok(None);
        };

        Ok(Some(Session {
            id: parse_uuid(&id_str)?,
            user_id,
            agent_id,
            copilot_mode,
            state: parse_state(&state)?,
            created_at: parse_timestamp(&created_at)?,
            last_activity_at: parse_timestamp(&last_activity_at)?,
        }))
    }

    /// Resolve-or-create for the `hello` handshake: if `session_id` is
    /// `Some` and the row exists, that session is reattached (its
    /// `last_activity_at` is bumped); otherwise a fresh session is created.
    pub async fn resolve_or_create(
        &self,
        session_id: Option<Uuid>,
        user_id: i64,
        agent_id: i64,
        copilot_mode: bool,
    ) -> Result<(Session, bool)> {
        if let Some(id) = session_id {
            if let Some(existing) = self.get(id).await? {
                self.touch(id).await?;
                return Ok((existing, true));
            }
        }
        let created = self.create(user_id, agent_id, copilot_mode).await?;
        Ok((created, false))
    }

    pub async fn touch(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE sessions SET last_activity_at = datetime('now') WHERE id = ?")
            .bind(id.to_string())
            .execute(self.pool.interactive())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn set_state(&self, id: Uuid, state: OrchestratorState) -> Result<()> {
        let state_str = match state {
            OrchestratorState::Idle => "idle",
            OrchestratorState::Listening => "listening",
            OrchestratorState::Thinking => "thinking",
            OrchestratorState::Speaking => "speaking",
        };
        sqlx::query("UPDATE sessions SET state = ? WHERE id = ?")
            .bind(state_str)
            .bind(id.to_string())
            .execute(self.pool.interactive())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aitoys_domain::config::StoreConfig;

    async fn memory_store() -> (SessionStore, StorePool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        std::mem::forget(dir);
        let config = StoreConfig {
            database_url: format!("sqlite://{}?mode=rwc", path.display()),
            max_connections: 1,
            background_connections: 1,
            ..StoreConfig::default()
        };
        let pool = StorePool::connect(&config).await.unwrap();
        (SessionStore::new(pool.clone()), pool)
    }

    async fn seed_agent(pool: &StorePool) -> i64 {
        sqlx::query(
            "INSERT INTO users (login_name, login_type, display_name, password_hash) VALUES ('u', 'password', 'U', 'x')",
        )
        .execute(pool.interactive())
        .await
        .unwrap();
        sqlx::query("INSERT INTO agent_templates (name, target_device_type) VALUES ('t', 'speaker')")
            .execute(pool.interactive())
            .await
            .unwrap();
        let rec = sqlx::query("INSERT INTO agent_instances (template_id, owner_user_id) VALUES (1, 1)")
            .execute(pool.interactive())
            .await
            .unwrap();
        rec.last_insert_rowid()
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let (store, pool) = memory_store().await;
        let agent_id = seed_agent(&pool).await;
        let session = store.create(1, agent_id, false).await.unwrap();
        let fetched = store.get(session.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, session.id);
        assert_eq!(fetched.state, OrchestratorState::Idle);
    }

    #[tokio::test]
    async fn resolve_or_create_reattaches_known_session() {
        let (store, pool) = memory_store().await;
        let agent_id = seed_agent(&pool).await;
        let session = store.create(1, agent_id, false).await.unwrap();

        let (resolved, resumed) = store
            .resolve_or_create(Some(session.id), 1, agent_id, false)
            .await
            .unwrap();
        assert!(resumed);
        assert_eq!(resolved.id, session.id);
    }

    #[tokio::test]
    async fn resolve_or_create_makes_new_session_for_unknown_id() {
        let (store, pool) = memory_store().await;
        let agent_id = seed_agent(&pool).await;
        let unknown = Uuid::new_v4();

        let (resolved, resumed) = store
            .resolve_or_create(Some(unknown), 1, agent_id, false)
            .await
            .unwrap();
        assert!(!resumed);
        assert_ne!(resolved.id, unknown);
    }
}
