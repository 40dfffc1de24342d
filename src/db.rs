use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use crate::config::AppConfig;

/// Owns the connection pool for the lifetime of the process.
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;
        info!("connected to database");
        Ok(Self { pool })
    }

    /// Applies pending migrations. Failure is logged, not fatal.
    pub async fn migrate(&self) {
        if let Err(e) = sqlx::migrate!("./migrations").run(&self.pool).await {
            warn!(error = %e, "migration failed; continuing");
        }
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    pub async fn close(self) {
        info!("closing database pool");
        self.pool.close().await;
    }
}
