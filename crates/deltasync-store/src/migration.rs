//! SQLite schema versions.
//!
//! Each entry in [`MIGRATIONS`] moves the schema from the previous version
//! to its own. Applied versions are recorded in `schema_migrations`; a
//! database written by a newer build is refused rather than guessed at.

use rusqlite::{params, Connection, Transaction};

use crate::error::{Result, StoreError};
use crate::now_millis;

/// Ordered schema steps, starting at version 1.
const MIGRATIONS: &[(u32, &str)] = &[
    (
        1,
        r#"
        -- Immutable values: commit records and map payloads
        CREATE TABLE chunks (
            hash BLOB PRIMARY KEY,            -- 32 bytes, Blake3 hash of data
            data BLOB NOT NULL,
            created_at INTEGER NOT NULL
        );

        -- One mutable head per dataset
        CREATE TABLE heads (
            dataset TEXT PRIMARY KEY,
            hash BLOB NOT NULL,               -- 32 bytes, head commit
            updated_at INTEGER NOT NULL
        );
        "#,
    ),
    (
        2,
        "CREATE INDEX idx_heads_updated ON heads(updated_at);",
    ),
];

/// Schema version this build writes.
pub const CURRENT_VERSION: u32 = MIGRATIONS[MIGRATIONS.len() - 1].0;

/// Bring the schema up to [`CURRENT_VERSION`]. Safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        );",
    )?;

    let found = schema_version(conn)?;
    if found > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{found} is newer than supported v{CURRENT_VERSION}"
        )));
    }
    if found == CURRENT_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > found) {
        step(&tx, *version, sql)?;
    }
    tx.commit()?;

    tracing::info!(from = found, to = CURRENT_VERSION, "migrated store schema");
    Ok(())
}

/// Highest applied version, 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<u32> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?)
}

fn step(tx: &Transaction<'_>, version: u32, sql: &str) -> Result<()> {
    tx.execute_batch(sql)
        .map_err(|e| StoreError::Migration(format!("v{version}: {e}")))?;
    tx.execute(
        "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        params![version, now_millis()],
    )?;
    tracing::debug!(version, "applied schema step");
    Ok(())
}
