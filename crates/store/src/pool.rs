use aitoys_domain::config::StoreConfig;
use aitoys_domain::{Error, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// The conversation store's connection pool, plus a separate handle
/// carved out for long-running background jobs (compaction, summary
/// generation) so they cannot starve interactive writes.
#[derive(Clone)]
pub struct StorePool {
    interactive: SqlitePool,
    background: SqlitePool,
}

impl StorePool {
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let interactive = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let background = SqlitePoolOptions::new()
            .max_connections(config.background_connections)
            .connect(&config.database_url)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        sqlx::migrate!("./migrations")
            .run(&interactive)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Self {
            interactive,
            background,
        })
    }

    /// Pool for request-path reads/writes (append, recent window).
    pub fn interactive(&self) -> &SqlitePool {
        &self.interactive
    }

    /// Pool for compaction/summary/analysis background jobs.
    pub fn background(&self) -> &SqlitePool {
        &self.background
    }
}
