//! ContentStore trait: the abstract interface for values and dataset heads.
//!
//! The sync engine is storage-agnostic. Implementations include SQLite
//! (primary) and in-memory (for tests).

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use deltasync_core::ContentHash;

use crate::error::{Result, StoreError};

/// Result of a compare-and-swap on a dataset head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasResult {
    /// The head now points at the new hash.
    Updated,
    /// The head was not the expected value; nothing changed.
    Conflict {
        /// The head observed at the time of the swap.
        current: Option<ContentHash>,
    },
}

impl CasResult {
    /// Whether the swap took effect.
    pub fn is_updated(&self) -> bool {
        matches!(self, CasResult::Updated)
    }
}

/// Async interface to an immutable value store plus one mutable head
/// pointer per named dataset.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Idempotent writes**: writing the same bytes twice returns the same hash
///   and stores one copy.
/// - **Optimistic heads**: heads only move through [`ContentStore::cas_head`];
///   a concurrent writer is reported as [`CasResult::Conflict`], never as an
///   error.
#[async_trait]
pub trait ContentStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Value Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Store `bytes` and return their content hash.
    async fn write_value(&self, bytes: &[u8]) -> Result<ContentHash>;

    /// Read the bytes stored under `hash`.
    async fn read_value(&self, hash: &ContentHash) -> Result<Option<Bytes>>;

    /// Check whether a value exists.
    async fn has_value(&self, hash: &ContentHash) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Head Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the head of a dataset, if it has one.
    async fn get_head(&self, dataset: &str) -> Result<Option<ContentHash>>;

    /// Move the head of `dataset` to `new` if it currently equals `expected`.
    ///
    /// `expected = None` means "the dataset has no head yet".
    async fn cas_head(
        &self,
        dataset: &str,
        expected: Option<&ContentHash>,
        new: &ContentHash,
    ) -> Result<CasResult>;

    /// List every dataset that has a head, in name order.
    async fn list_datasets(&self) -> Result<Vec<String>>;
}

#[async_trait]
impl<S: ContentStore + ?Sized> ContentStore for Arc<S> {
    async fn write_value(&self, bytes: &[u8]) -> Result<ContentHash> {
        (**self).write_value(bytes).await
    }

    async fn read_value(&self, hash: &ContentHash) -> Result<Option<Bytes>> {
        (**self).read_value(hash).await
    }

    async fn has_value(&self, hash: &ContentHash) -> Result<bool> {
        (**self).has_value(hash).await
    }

    async fn get_head(&self, dataset: &str) -> Result<Option<ContentHash>> {
        (**self).get_head(dataset).await
    }

    async fn cas_head(
        &self,
        dataset: &str,
        expected: Option<&ContentHash>,
        new: &ContentHash,
    ) -> Result<CasResult> {
        (**self).cas_head(dataset, expected, new).await
    }

    async fn list_datasets(&self) -> Result<Vec<String>> {
        (**self).list_datasets().await
    }
}

/// Extension trait for common store patterns.
pub trait StoreExt: ContentStore {
    /// Read a value that must exist.
    fn read_required(
        &self,
        hash: &ContentHash,
    ) -> impl std::future::Future<Output = Result<Bytes>> + Send;
}

impl<S: ContentStore + ?Sized> StoreExt for S {
    async fn read_required(&self, hash: &ContentHash) -> Result<Bytes> {
        self.read_value(hash)
            .await?
            .ok_or_else(|| StoreError::NotFound(hash.to_hex()))
    }
}
