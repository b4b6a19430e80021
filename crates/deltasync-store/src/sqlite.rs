//! SQLite implementation of the ContentStore trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use deltasync_core::ContentHash;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::now_millis;
use crate::traits::{CasResult, ContentStore};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn hash_from_blob(blob: Vec<u8>) -> Result<ContentHash> {
    ContentHash::try_from(blob.as_slice())
        .map_err(|_| StoreError::InvalidData(format!("hash column has {} bytes", blob.len())))
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn write_value(&self, bytes: &[u8]) -> Result<ContentHash> {
        let hash = ContentHash::of(bytes);
        let data = bytes.to_vec();

        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO chunks (hash, data, created_at) VALUES (?1, ?2, ?3)",
                params![hash.as_bytes().as_slice(), data, now_millis()],
            )?;
            Ok(hash)
        })
        .await
    }

    async fn read_value(&self, hash: &ContentHash) -> Result<Option<Bytes>> {
        let hash = *hash;

        self.blocking(move |conn| {
            let data: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT data FROM chunks WHERE hash = ?1",
                    params![hash.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(data.map(Bytes::from))
        })
        .await
    }

    async fn has_value(&self, hash: &ContentHash) -> Result<bool> {
        let hash = *hash;

        self.blocking(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM chunks WHERE hash = ?1",
                    params![hash.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn get_head(&self, dataset: &str) -> Result<Option<ContentHash>> {
        let dataset = dataset.to_string();

        self.blocking(move |conn| {
            let blob: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT hash FROM heads WHERE dataset = ?1",
                    params![dataset],
                    |row| row.get(0),
                )
                .optional()?;
            blob.map(hash_from_blob).transpose()
        })
        .await
    }

    async fn cas_head(
        &self,
        dataset: &str,
        expected: Option<&ContentHash>,
        new: &ContentHash,
    ) -> Result<CasResult> {
        let dataset = dataset.to_string();
        let expected = expected.copied();
        let new = *new;

        self.blocking(move |conn| {
            // Write lock is held from the read through the update.
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let current: Option<Vec<u8>> = tx
                .query_row(
                    "SELECT hash FROM heads WHERE dataset = ?1",
                    params![dataset],
                    |row| row.get(0),
                )
                .optional()?;
            let current = current.map(hash_from_blob).transpose()?;

            if current != expected {
                return Ok(CasResult::Conflict { current });
            }

            tx.execute(
                "INSERT INTO heads (dataset, hash, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(dataset) DO UPDATE SET hash = excluded.hash,
                                                    updated_at = excluded.updated_at",
                params![dataset, new.as_bytes().as_slice(), now_millis()],
            )?;
            tx.commit()?;

            Ok(CasResult::Updated)
        })
        .await
    }

    async fn list_datasets(&self) -> Result<Vec<String>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT dataset FROM heads ORDER BY dataset")?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(names)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read_value() {
        let store = SqliteStore::open_memory().unwrap();

        let hash = store.write_value(b"payload").await.unwrap();
        assert_eq!(hash, ContentHash::of(b"payload"));

        let bytes = store.read_value(&hash).await.unwrap().unwrap();
        assert_eq!(bytes.as_ref(), b"payload");
        assert!(store.has_value(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_is_idempotent() {
        let store = SqliteStore::open_memory().unwrap();

        let h1 = store.write_value(b"same").await.unwrap();
        let h2 = store.write_value(b"same").await.unwrap();
        assert_eq!(h1, h2);

        let count: i64 = store
            .blocking(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_missing_value() {
        let store = SqliteStore::open_memory().unwrap();
        let hash = ContentHash::of(b"never written");
        assert!(store.read_value(&hash).await.unwrap().is_none());
        assert!(!store.has_value(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_cas_head() {
        let store = SqliteStore::open_memory().unwrap();
        let a = ContentHash::of(b"a");
        let b = ContentHash::of(b"b");

        assert!(store.cas_head("acct/client", None, &a).await.unwrap().is_updated());
        assert_eq!(store.get_head("acct/client").await.unwrap(), Some(a));

        let conflict = store.cas_head("acct/client", Some(&b), &b).await.unwrap();
        assert_eq!(conflict, CasResult::Conflict { current: Some(a) });

        assert!(store.cas_head("acct/client", Some(&a), &b).await.unwrap().is_updated());
        assert_eq!(store.get_head("acct/client").await.unwrap(), Some(b));
        assert_eq!(store.list_datasets().await.unwrap(), vec!["acct/client"]);
    }
}
