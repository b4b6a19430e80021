//! In-memory implementation of the ContentStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;
use deltasync_core::ContentHash;

use crate::error::{Result, StoreError};
use crate::traits::{CasResult, ContentStore};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Values indexed by content hash.
    values: HashMap<ContentHash, Bytes>,

    /// Dataset heads.
    heads: BTreeMap<String, ContentHash>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    /// Number of distinct values stored.
    pub fn value_count(&self) -> Result<usize> {
        Ok(self.read()?.values.len())
    }

    /// Overwrite the bytes under `hash` without rehashing.
    ///
    /// Lets tests simulate on-disk corruption.
    pub fn corrupt_value(&self, hash: &ContentHash, bytes: impl Into<Bytes>) -> Result<()> {
        self.write()?.values.insert(*hash, bytes.into());
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn write_value(&self, bytes: &[u8]) -> Result<ContentHash> {
        let hash = ContentHash::of(bytes);
        let mut inner = self.write()?;
        inner
            .values
            .entry(hash)
            .or_insert_with(|| Bytes::copy_from_slice(bytes));
        Ok(hash)
    }

    async fn read_value(&self, hash: &ContentHash) -> Result<Option<Bytes>> {
        Ok(self.read()?.values.get(hash).cloned())
    }

    async fn has_value(&self, hash: &ContentHash) -> Result<bool> {
        Ok(self.read()?.values.contains_key(hash))
    }

    async fn get_head(&self, dataset: &str) -> Result<Option<ContentHash>> {
        Ok(self.read()?.heads.get(dataset).copied())
    }

    async fn cas_head(
        &self,
        dataset: &str,
        expected: Option<&ContentHash>,
        new: &ContentHash,
    ) -> Result<CasResult> {
        let mut inner = self.write()?;

        let current = inner.heads.get(dataset).copied();
        if current.as_ref() != expected {
            return Ok(CasResult::Conflict { current });
        }

        inner.heads.insert(dataset.to_string(), *new);
        Ok(CasResult::Updated)
    }

    async fn list_datasets(&self) -> Result<Vec<String>> {
        Ok(self.read()?.heads.keys().cloned().collect())
    }
}
