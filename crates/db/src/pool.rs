use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySql, Pool};

pub async fn create_pool(database_url: &str) -> Result<Pool<MySql>> {
    let pool = MySqlPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .context("failed to connect to MySQL")?;

    tracing::info!("Database pool created");
    Ok(pool)
}

/// Applies the embedded migrations in `crates/db/migrations`.
pub async fn migrate(pool: &Pool<MySql>) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("failed to run migrations")?;

    tracing::info!("Database migrations applied");
    Ok(())
}
