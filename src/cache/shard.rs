//! One SQLite-backed cache shard.
//!
//! Shards open lazily on first use. A shard whose database cannot be opened
//! (corrupt file, permissions, full disk) stays unavailable for the life of
//! the process and behaves like an empty cache.

use std::path::PathBuf;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::sync::OnceCell;

use super::{CacheError, Namespace};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    namespace TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    PRIMARY KEY (namespace, key)
)
"#;

/// Where a shard keeps its data.
#[derive(Debug, Clone)]
pub(crate) enum ShardLocation {
    File(PathBuf),
    Memory,
}

/// A raw row as stored.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EntryRow {
    pub value: String,
    pub expires_at: i64,
}

pub(crate) struct Shard {
    index: usize,
    location: ShardLocation,
    pool: OnceCell<Option<SqlitePool>>,
}

impl Shard {
    pub fn new(index: usize, location: ShardLocation) -> Self {
        Self {
            index,
            location,
            pool: OnceCell::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The connection pool, opening it on first use. `None` if unavailable.
    pub async fn pool(&self) -> Option<&SqlitePool> {
        self.pool
            .get_or_init(|| async {
                match open(&self.location).await {
                    Ok(pool) => {
                        tracing::debug!(shard = self.index, "Opened cache shard");
                        Some(pool)
                    }
                    Err(e) => {
                        tracing::warn!(
                            shard = self.index,
                            "Cache shard unavailable, treating as empty: {}",
                            e
                        );
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    pub async fn fetch(
        &self,
        namespace: Namespace,
        key: &str,
    ) -> Result<Option<EntryRow>, CacheError> {
        let Some(pool) = self.pool().await else {
            return Err(CacheError::Unavailable(self.index));
        };
        let row = sqlx::query_as::<_, EntryRow>(
            "SELECT value, expires_at FROM entries WHERE namespace = ? AND key = ?",
        )
        .bind(namespace.as_str())
        .bind(key)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    pub async fn store(
        &self,
        namespace: Namespace,
        key: &str,
        value: &str,
        expires_at: i64,
    ) -> Result<(), CacheError> {
        let Some(pool) = self.pool().await else {
            return Err(CacheError::Unavailable(self.index));
        };
        sqlx::query(
            r#"
            INSERT INTO entries (namespace, key, value, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(namespace, key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(namespace.as_str())
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Delete one entry only if it is still the expired row we read.
    pub async fn remove_expired(
        &self,
        namespace: Namespace,
        key: &str,
        now: i64,
    ) -> Result<(), CacheError> {
        let Some(pool) = self.pool().await else {
            return Ok(());
        };
        sqlx::query("DELETE FROM entries WHERE namespace = ? AND key = ? AND expires_at <= ?")
            .bind(namespace.as_str())
            .bind(key)
            .bind(now)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn remove_prefix(&self, namespace: Namespace, prefix: &str) -> Result<u64, CacheError> {
        let Some(pool) = self.pool().await else {
            return Err(CacheError::Unavailable(self.index));
        };
        let prefix_len = i64::try_from(prefix.chars().count()).unwrap_or(i64::MAX);
        let result = sqlx::query(
            "DELETE FROM entries WHERE namespace = ? AND substr(key, 1, ?) = ?",
        )
        .bind(namespace.as_str())
        .bind(prefix_len)
        .bind(prefix)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn purge_expired(&self, now: i64) -> Result<u64, CacheError> {
        let Some(pool) = self.pool().await else {
            return Err(CacheError::Unavailable(self.index));
        };
        let result = sqlx::query("DELETE FROM entries WHERE expires_at <= ?")
            .bind(now)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Entry counts per namespace, live and expired alike.
    pub async fn counts(&self) -> Result<Vec<(String, i64)>, CacheError> {
        let Some(pool) = self.pool().await else {
            return Err(CacheError::Unavailable(self.index));
        };
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT namespace, COUNT(*) FROM entries GROUP BY namespace ORDER BY namespace",
        )
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }
}

async fn open(location: &ShardLocation) -> Result<SqlitePool, sqlx::Error> {
    let options = match location {
        ShardLocation::File(path) => SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true),
        ShardLocation::Memory => SqliteConnectOptions::from_str("sqlite::memory:")?,
    };

    // One connection per shard: an in-memory database lives exactly as long
    // as its connection, and a single writer avoids SQLITE_BUSY.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    sqlx::query(SCHEMA).execute(&pool).await?;
    Ok(pool)
}
