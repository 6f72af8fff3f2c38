//! SQLite implementation of the CacheStore trait.
//!
//! The primary, durable backend. Uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use mailseal_core::PolicyHash;

use crate::credential::Credential;
use crate::error::{CacheError, Result};
use crate::migration;
use crate::traits::CacheStore;

/// SQLite-based credential cache.
///
/// Thread-safe via an internal Mutex; every operation hops to a
/// blocking thread so the async runtime is never held up by disk I/O.
pub struct SqliteCache {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCache {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database. Useful for testing the SQL
    /// paths without touching disk.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on a blocking thread.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| CacheError::Poisoned(e.to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| CacheError::TaskFailed(e.to_string()))?
    }
}

#[async_trait]
impl CacheStore for SqliteCache {
    async fn get(&self, hash: &PolicyHash, now: i64) -> Result<Option<Credential>> {
        let key = hash.to_hex();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT bearer, expires_at FROM credentials
                     WHERE hash = ?1 AND expires_at > ?2",
                    params![key, now],
                    |row| {
                        Ok(Credential {
                            bearer: row.get(0)?,
                            expires_at: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
        .await
    }

    async fn put(&self, hash: &PolicyHash, credential: &Credential) -> Result<()> {
        let key = hash.to_hex();
        let credential = credential.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO credentials (hash, bearer, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(hash) DO UPDATE SET bearer = ?2, expires_at = ?3",
                params![key, credential.bearer, credential.expires_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn evict_expired(&self, now: i64) -> Result<usize> {
        let removed = self
            .with_conn(move |conn| {
                let removed = conn
                    .execute("DELETE FROM credentials WHERE expires_at <= ?1", params![now])?;
                Ok(removed)
            })
            .await?;
        if removed > 0 {
            tracing::debug!(removed, "dropped expired credentials");
        }
        Ok(removed)
    }

    async fn master_key(&self) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let key = conn
                .query_row("SELECT key FROM master_key WHERE id = 0", [], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(key)
        })
        .await
    }

    async fn set_master_key(&self, key: &str) -> Result<()> {
        let key = key.to_owned();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO master_key (id, key) VALUES (0, ?1)
                 ON CONFLICT(id) DO UPDATE SET key = ?1",
                params![key],
            )?;
            Ok(())
        })
        .await
    }
}
