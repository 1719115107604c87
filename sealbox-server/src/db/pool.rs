use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::{Result, ServerError};

/// Open (or create) the SQLite database and build the connection pool.
///
/// WAL journal mode for concurrent readers; the busy timeout makes writers
/// queue instead of failing fast when a transaction is in flight.
pub async fn create_pool(file: &str, busy_timeout: Duration) -> Result<SqlitePool> {
    let pool = create_pool_with(file, busy_timeout, 10).await?;
    tracing::info!(file, "database connection pool created");
    Ok(pool)
}

/// [`create_pool`] with explicit pool sizing.
pub async fn create_pool_with(
    file: &str,
    busy_timeout: Duration,
    max_connections: u32,
) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(file)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(busy_timeout);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(busy_timeout + Duration::from_secs(5))
        .connect_with(options)
        .await
        .map_err(|e| ServerError::Database(format!("failed to open database {file}: {e}")))
}

/// Run the initial schema migration (idempotent, uses IF NOT EXISTS).
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS storage (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            key         TEXT NOT NULL UNIQUE,
            text        TEXT NOT NULL DEFAULT '',
            file_meta   TEXT NOT NULL DEFAULT '',
            file_path   TEXT NOT NULL DEFAULT '',
            count_text  INTEGER NOT NULL DEFAULT 0,
            count_meta  INTEGER NOT NULL DEFAULT 0,
            count_file  INTEGER NOT NULL DEFAULT 0,
            hash_text   TEXT NOT NULL DEFAULT '',
            hash_meta   TEXT NOT NULL DEFAULT '',
            hash_file   TEXT NOT NULL DEFAULT '',
            salt_text   TEXT NOT NULL DEFAULT '',
            salt_meta   TEXT NOT NULL DEFAULT '',
            salt_file   TEXT NOT NULL DEFAULT '',
            created     TEXT NOT NULL,
            updated     TEXT NOT NULL,
            expired     TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| ServerError::Database(format!("migration (storage) failed: {e}")))?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_storage_live
         ON storage (expired, count_text, count_file)",
    )
    .execute(pool)
    .await
    .map_err(|e| ServerError::Database(format!("migration (index) failed: {e}")))?;

    tracing::info!("database migrations applied");
    Ok(())
}
