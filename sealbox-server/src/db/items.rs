use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{Result, ServerError};

/// One row of the `storage` table.
#[derive(Debug, Clone)]
pub struct ItemRow {
    pub id: i64,
    pub key: String,
    pub text: String,
    pub file_meta: String,
    pub file_path: String,
    pub count_text: i64,
    pub count_meta: i64,
    pub count_file: i64,
    pub hash_text: String,
    pub hash_meta: String,
    pub hash_file: String,
    pub salt_text: String,
    pub salt_meta: String,
    pub salt_file: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub expired: DateTime<Utc>,
}

impl ItemRow {
    pub fn has_text(&self) -> bool {
        !self.text.is_empty()
    }

    pub fn has_meta(&self) -> bool {
        !self.file_meta.is_empty()
    }

    pub fn has_file(&self) -> bool {
        !self.file_path.is_empty()
    }
}

/// Field values for a row insert; the id is assigned by the database.
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub key: String,
    pub text: String,
    pub file_meta: String,
    pub file_path: String,
    pub count_text: i64,
    pub count_meta: i64,
    pub count_file: i64,
    pub hash_text: String,
    pub hash_meta: String,
    pub hash_file: String,
    pub salt_text: String,
    pub salt_meta: String,
    pub salt_file: String,
    pub created: DateTime<Utc>,
    pub expired: DateTime<Utc>,
}

/// Advisory liveness probe result for the download landing page.
#[derive(Debug, Clone, Copy)]
pub struct Presence {
    pub has_text: bool,
    pub has_file: bool,
}

/// Item repository over the SQLite pool.
///
/// SQLite is a single-writer engine; the tokio mutex serializes write
/// transactions app-side so that read-then-update transactions never hit a
/// stale-snapshot conflict. Read-only probes go straight to the pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

/// An open write transaction holding the single-writer permit. Dropping it
/// without [`WriteTx::commit`] rolls the transaction back.
pub struct WriteTx {
    tx: sqlx::Transaction<'static, sqlx::Sqlite>,
    _serial: OwnedMutexGuard<()>,
}

impl WriteTx {
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| ServerError::Database(format!("commit failed: {e}")))
    }
}

const ROW_COLUMNS: &str = "id, key, text, file_meta, file_path, \
     count_text, count_meta, count_file, \
     hash_text, hash_meta, hash_file, salt_text, salt_meta, salt_file, \
     created, updated, expired";

fn row_to_item(row: &SqliteRow) -> std::result::Result<ItemRow, sqlx::Error> {
    Ok(ItemRow {
        id: row.try_get("id")?,
        key: row.try_get("key")?,
        text: row.try_get("text")?,
        file_meta: row.try_get("file_meta")?,
        file_path: row.try_get("file_path")?,
        count_text: row.try_get("count_text")?,
        count_meta: row.try_get("count_meta")?,
        count_file: row.try_get("count_file")?,
        hash_text: row.try_get("hash_text")?,
        hash_meta: row.try_get("hash_meta")?,
        hash_file: row.try_get("hash_file")?,
        salt_text: row.try_get("salt_text")?,
        salt_meta: row.try_get("salt_meta")?,
        salt_file: row.try_get("salt_file")?,
        created: row.try_get("created")?,
        updated: row.try_get("updated")?,
        expired: row.try_get("expired")?,
    })
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a write transaction, queueing behind other writers.
    pub async fn begin_write(&self) -> Result<WriteTx> {
        let serial = self.write_lock.clone().lock_owned().await;
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ServerError::Database(format!("begin failed: {e}")))?;
        Ok(WriteTx { tx, _serial: serial })
    }

    /// Insert a new item row, returning its id.
    pub async fn save(&self, conn: &mut SqliteConnection, item: &NewItem) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO storage \
             (key, text, file_meta, file_path, count_text, count_meta, count_file, \
              hash_text, hash_meta, hash_file, salt_text, salt_meta, salt_file, \
              created, updated, expired) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.key)
        .bind(&item.text)
        .bind(&item.file_meta)
        .bind(&item.file_path)
        .bind(item.count_text)
        .bind(item.count_meta)
        .bind(item.count_file)
        .bind(&item.hash_text)
        .bind(&item.hash_meta)
        .bind(&item.hash_file)
        .bind(&item.salt_text)
        .bind(&item.salt_meta)
        .bind(&item.salt_file)
        .bind(item.created)
        .bind(item.created)
        .bind(item.expired)
        .execute(conn)
        .await
        .map_err(|e| ServerError::Database(format!("insert item failed: {e}")))?;

        Ok(result.last_insert_rowid())
    }

    /// Non-consuming liveness probe for the download page. Advisory only:
    /// it races with counter updates by design.
    pub async fn exists(&self, key: &str) -> Result<Option<Presence>> {
        let row: Option<(i64, i64)> = sqlx::query_as(
            "SELECT count_text, count_file FROM storage \
             WHERE key = ? AND expired >= ? AND (count_text > 0 OR count_file > 0) \
             LIMIT 1",
        )
        .bind(key)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ServerError::Database(format!("exists probe failed: {e}")))?;

        Ok(row.map(|(count_text, count_file)| Presence {
            has_text: count_text > 0,
            has_file: count_file > 0,
        }))
    }

    /// Select the full row of a live item. Must run inside a write
    /// transaction; the caller decrements before committing.
    pub async fn read_locked(
        &self,
        conn: &mut SqliteConnection,
        key: &str,
    ) -> Result<Option<ItemRow>> {
        let row = sqlx::query(&format!(
            "SELECT {ROW_COLUMNS} FROM storage \
             WHERE key = ? AND expired >= ? AND (count_text > 0 OR count_file > 0) \
             LIMIT 1"
        ))
        .bind(key)
        .bind(Utc::now())
        .fetch_optional(conn)
        .await
        .map_err(|e| ServerError::Database(format!("read item failed: {e}")))?;

        row.map(|r| row_to_item(&r))
            .transpose()
            .map_err(|e| ServerError::Database(format!("scan item failed: {e}")))
    }

    /// Subtract the given deltas from the counters of one row.
    ///
    /// The WHERE clause re-checks the budgets, so a race with another reader
    /// or the reaper surfaces as `DecrementFailed` instead of a negative
    /// counter.
    pub async fn decrement(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
        d_text: i64,
        d_meta: i64,
        d_file: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE storage \
             SET count_text = count_text - ?, \
                 count_meta = count_meta - ?, \
                 count_file = count_file - ?, \
                 updated = ? \
             WHERE id = ? AND count_text >= ? AND count_meta >= ? AND count_file >= ?",
        )
        .bind(d_text)
        .bind(d_meta)
        .bind(d_file)
        .bind(Utc::now())
        .bind(id)
        .bind(d_text)
        .bind(d_meta)
        .bind(d_file)
        .execute(conn)
        .await
        .map_err(|e| ServerError::Database(format!("decrement failed: {e}")))?;

        if result.rows_affected() != 1 {
            return Err(ServerError::DecrementFailed);
        }
        Ok(())
    }

    /// Rows whose TTL has passed or whose text and file budgets are both
    /// spent, in id order.
    pub async fn expired_or_exhausted(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<(i64, String)>> {
        sqlx::query_as(
            "SELECT id, file_path FROM storage \
             WHERE expired < ? OR (count_text < 1 AND count_file < 1) \
             ORDER BY id",
        )
        .bind(Utc::now())
        .fetch_all(conn)
        .await
        .map_err(|e| ServerError::Database(format!("expired query failed: {e}")))
    }

    /// Delete rows by id, returning the number of rows removed.
    pub async fn delete_by_ids(&self, conn: &mut SqliteConnection, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!("DELETE FROM storage WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let result = query
            .execute(conn)
            .await
            .map_err(|e| ServerError::Database(format!("delete items failed: {e}")))?;
        Ok(result.rows_affected())
    }
}
