use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use shared_config::AppConfig;

/// Open the connection pool backing the transactional booking tables.
pub async fn connect_pool(config: &AppConfig) -> Result<PgPool> {
    info!(
        "Connecting to Postgres with up to {} connections",
        config.database_max_connections
    );

    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to Postgres")
}
