//! Database schema migrations for SQLite.
//!
//! A simple versioned migration system: each migration transforms the
//! schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{CacheError, Result};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// Idempotent; safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;
        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, strftime('%s','now'))",
                [version],
            )?;
        }
        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => {
            conn.execute_batch(
                "CREATE TABLE credentials (
                    hash TEXT PRIMARY KEY,
                    bearer TEXT NOT NULL,
                    expires_at INTEGER NOT NULL
                );
                CREATE INDEX idx_credentials_expiry ON credentials (expires_at);
                CREATE TABLE master_key (
                    id INTEGER PRIMARY KEY CHECK (id = 0),
                    key TEXT NOT NULL
                );",
            )?;
            Ok(())
        }
        v => Err(CacheError::Migration(format!("unknown schema version {v}"))),
    }
}
