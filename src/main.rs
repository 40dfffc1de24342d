use std::sync::Arc;

mod app;
mod auth;
mod config;
mod dataset;
mod db;
mod error;
mod state;

use crate::{auth::repo::PgUserStore, config::AppConfig, db::Database, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "tidd_dataset=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = Arc::new(AppConfig::from_env()?);

    // startup
    let db = Database::connect(&config).await?;
    db.migrate().await;
    let users = Arc::new(PgUserStore::new(db.pool()));
    let state = AppState::new(config, users);

    let served = app::serve(app::build_app(state)).await;

    // shutdown
    db.close().await;
    served
}
