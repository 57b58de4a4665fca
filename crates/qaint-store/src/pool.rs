//! Connection pooling and schema bootstrap for the SQLite-backed store.

use crate::error::StoreError;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

const OPERATIONS_SCHEMA: &str = include_str!("migrations/operations.sql");
const EVENTS_SCHEMA: &str = include_str!("migrations/events.sql");
const MAPPINGS_SCHEMA: &str = include_str!("migrations/mappings.sql");

/// Open a connection pool against `database_url`.
///
/// `database_url` is an sqlx SQLite connection string, e.g.
/// `sqlite://./data/qaint.db?mode=rwc` or `sqlite::memory:` for tests.
///
/// # Errors
///
/// Returns a [`StoreError`] if the connection cannot be established.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, StoreError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Create the `operations`, `events`, and `mappings` tables and their
/// indexes if they do not already exist.
///
/// Statements are plain `CREATE TABLE IF NOT EXISTS` / `CREATE INDEX IF NOT
/// EXISTS`, so calling this repeatedly (every process start) is safe.
///
/// # Errors
///
/// Returns a [`StoreError`] if any statement fails.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
    for schema in [OPERATIONS_SCHEMA, EVENTS_SCHEMA, MAPPINGS_SCHEMA] {
        for statement in schema.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement).execute(pool).await?;
        }
    }
    tracing::info!("durable store schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='operations'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }
}
