//! Database Module
//!
//! PostgreSQL connection pool and embedded migrations for the message store.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::DatabaseSettings;

/// Connect the message store pool. Connections are checked before use.
pub async fn create_pool(settings: &DatabaseSettings) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout))
        .test_before_acquire(true)
        .connect(&settings.url)
        .await?;

    tracing::debug!(
        max_connections = settings.max_connections,
        "Message store pool connected"
    );
    Ok(pool)
}

/// Apply `messages` / `message_reads` migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
