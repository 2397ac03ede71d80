use serde::{Deserialize, Serialize};

/// Connection settings for the conversation store's SQLite (or, behind the
/// same `sqlx` trait boundary, Postgres) pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "d_url")]
    pub database_url: String,
    #[serde(default = "d_max_connections")]
    pub max_connections: u32,
    /// Dedicated connections reserved for long-running compaction/summary
    /// jobs, carved out of `max_connections` rather than sharing the
    /// interactive-write pool.
    #[serde(default = "d_background_connections")]
    pub background_connections: u32,
    #[serde(default = "d_compaction_threshold")]
    pub compaction_message_threshold: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: d_url(),
            max_connections: d_max_connections(),
            background_connections: d_background_connections(),
            compaction_message_threshold: d_compaction_threshold(),
        }
    }
}

fn d_url() -> String {
    "sqlite://aitoys.db".into()
}
fn d_max_connections() -> u32 {
    10
}
fn d_background_connections() -> u32 {
    2
}
fn d_compaction_threshold() -> u32 {
    50
}
