//! Resolves the effective configuration for an agent instance: its own
//! `module_params`/`agent_config` JSON blobs shallow-merged over the
//! owning template's, so an instance only needs to carry the keys it
//! overrides.

use aitoys_domain::model::{AgentConfig, ModuleParams};
use aitoys_domain::{Error, Result};
use serde_json::Value;

use crate::pool::StorePool;

pub struct EffectiveAgentConfig {
    pub agent_id: i64,
    pub owner_user_id: i64,
    pub bound_device_id: Option<uuid::Uuid>,
    pub module_params: ModuleParams,
    pub agent_config: AgentConfig,
}

pub struct AgentStore {
    pool: StorePool,
}

/// Shallow (one level deep) merge: keys present in `over` win; anything
/// `over` doesn't mention falls back to `base`. Matches the "typed config
/// record, extra keys as opaque map" design for the JSON-valued config
/// columns — deep merging per nested key is not attempted.
fn merge_json(base: Value, over: Value) -> Value {
    match (base, over) {
        (Value::Object(mut base_map), Value::Object(over_map)) => {
            for (k, v) in over_map {
                base_map.insert(k, v);
            }
            Value::Object(base_map)
        }
        (_, over) if !over.is_null() => over,
        (base, _) => base,
    }
}

impl AgentStore {
    pub fn new(pool: StorePool) -> Self {
        Self { pool }
    }

    /// All live agent instance ids, for periodic sweeps (e.g. the daily
    /// growth-summary trigger) that need to check every agent's config.
    pub async fn list_ids(&self) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM agent_instances")
            .fetch_all(self.pool.interactive())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn get(&self, agent_id: i64) -> Result<Option<EffectiveAgentConfig>> {
        let row: Option<(i64, Option<String>, String, String)> = sqlx::query_as(
            "SELECT owner_user_id, bound_device_id, module_params, agent_config \
             FROM agent_instances WHERE id = ?",
        )
        .bind(agent_id)
        .fetch_optional(self.pool.interactive())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let Some((owner_user_id, bound_device_id, instance_module_params, instance_agent_config)) = row else {
            return Ok(None);
        };

        let template_row: Option<(String, String)> = sqlx::query_as(
            "SELECT at.module_params, at.agent_config \
             FROM agent_templates at \
             JOIN agent_instances ai ON ai.template_id = at.id \
             WHERE ai.id = ?",
        )
        .bind(agent_id)
        .fetch_optional(self.pool.interactive())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let (template_module_params, template_agent_config) =
            template_row.unwrap_or_else(|| ("{}".into(), "{}".into()));

        let module_params_json = merge_json(
            serde_json::from_str(&template_module_params)?,
            serde_json::from_str(&instance_module_params)?,
        );
        let agent_config_json = merge_json(
            serde_json::from_str(&template_agent_config)?,
            serde_json::from_str(&instance_agent_config)?,
        );

        let module_params: ModuleParams = serde_json::from_value(module_params_json)?;
        let agent_config: AgentConfig = serde_json::from_value(agent_config_json)?;

        let bound_device_id = bound_device_id
            .map(|s| uuid::Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| Error::Database(format!("bad device uuid: {e}")))?;

        Ok(Some(EffectiveAgentConfig {
            agent_id,
            owner_user_id,
            bound_device_id,
            module_params,
            agent_config,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aitoys_domain::config::StoreConfig;

    async fn memory_pool() -> StorePool {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.db");
        std::mem::forget(dir);
        let config = StoreConfig {
            database_url: format!("sqlite://{}?mode=rwc", path.display()),
            max_connections: 1,
            background_connections: 1,
            ..StoreConfig::default()
        };
        StorePool::connect(&config).await.unwrap()
    }

    #[tokio::test]
    async fn instance_overrides_template_shallowly() {
        let pool = memory_pool().await;
        sqlx::query(
            "INSERT INTO users (login_name, login_type, display_name, password_hash) VALUES ('u', 'password', 'U', 'x')",
        )
        .execute(pool.interactive())
        .await
        .unwrap();
        sqlx::query(
            r#"INSERT INTO agent_templates (name, target_device_type, module_params, agent_config)
               VALUES ('t', 'speaker', '{"llm":{"code":"openai-compat","config":{}}}', '{"character":{"name":"Default"}}')"#,
        )
        .execute(pool.interactive())
        .await
        .unwrap();
        sqlx::query(
            r#"INSERT INTO agent_instances (template_id, owner_user_id, module_params, agent_config)
               VALUES (1, 1, '{}', '{"character":{"name":"Buddy"}}')"#,
        )
        .execute(pool.interactive())
        .await
        .unwrap();

        let store = AgentStore::new(pool);
        let cfg = store.get(1).await.unwrap().unwrap();
        assert_eq!(cfg.module_params.llm.unwrap().code, "openai-compat");
        assert_eq!(cfg.agent_config.character.name.as_deref(), Some("Buddy"));
    }

    #[tokio::test]
    async fn unknown_agent_returns_none() {
        let pool = memory_pool().await;
        let store = AgentStore::new(pool);
        assert!(store.get(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_ids_returns_every_instance() {
        let pool = memory_pool().await;
        sqlx::query(
            "INSERT INTO users (login_name, login_type, display_name, password_hash) VALUES ('u', 'password', 'U', 'x')",
        )
        .execute(pool.interactive())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO agent_templates (name, target_device_type) VALUES ('t', 'speaker')",
        )
        .execute(pool.interactive())
        .await
        .unwrap();
        sqlx::query("INSERT INTO agent_instances (template_id, owner_user_id) VALUES (1, 1)")
            .execute(pool.interactive())
            .await
            .unwrap();
        sqlx::query("INSERT INTO agent_instances (template_id, owner_user_id) VALUES (1, 1)")
            .execute(pool.interactive())
            .await
            .unwrap();

        let store = AgentStore::new(pool);
        assert_eq!(store.list_ids().await.unwrap(), vec![1, 2]);
    }
}
