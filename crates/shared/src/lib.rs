#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Subdesk Shared
//!
//! Pieces used by more than one binary: database pool construction.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Default pool size when the caller has no preference
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Create a connection pool for request-path queries
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await?;

    tracing::info!(max_connections = max_connections, "Database pool created");
    Ok(pool)
}
