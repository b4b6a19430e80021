//! Commit chain: the append-only history of one dataset.
//!
//! Each commit is written as an immutable value next to its map payload,
//! then published by moving the dataset's head with a compare-and-swap.
//! A dataset with no head is Empty; the first successful commit makes it
//! Committed, and it stays that way.

use std::fmt;

use deltasync_core::{codec, escape_key, Checksum, Commit, ContentHash, VersionedMap};
use deltasync_store::{CasResult, ContentStore};

use crate::error::ChainError;

/// Result type for chain operations.
pub type Result<T> = std::result::Result<T, ChainError>;

/// Name of a dataset in the content store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetName(String);

impl DatasetName {
    /// Wrap an arbitrary name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The dataset holding one client's view of an account.
    ///
    /// Both ids are escaped before joining, so distinct pairs never share
    /// a name even when the ids themselves contain `/`.
    pub fn for_client(account_id: &str, client_id: &str) -> Self {
        Self(format!("{}/{}", escape_key(account_id), escape_key(client_id)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A commit together with its hash and materialized map.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub hash: ContentHash,
    pub commit: Commit,
    pub map: VersionedMap,
}

impl Snapshot {
    pub fn checksum(&self) -> Checksum {
        self.commit.checksum
    }

    pub fn last_mutation_id(&self) -> u64 {
        self.commit.last_mutation_id
    }
}

/// Handle on one dataset's commit chain.
pub struct CommitChain<'a, S: ?Sized> {
    store: &'a S,
    dataset: DatasetName,
}

impl<'a, S: ContentStore + ?Sized> CommitChain<'a, S> {
    pub fn new(store: &'a S, dataset: DatasetName) -> Self {
        Self { store, dataset }
    }

    pub fn dataset(&self) -> &DatasetName {
        &self.dataset
    }

    /// Load the current head, or `None` if the dataset is Empty.
    pub async fn load(&self) -> Result<Option<Snapshot>> {
        let Some(hash) = self.store.get_head(self.dataset.as_str()).await? else {
            return Ok(None);
        };
        // A head that no longer resolves is corruption, not emptiness.
        let commit = self
            .read_commit(&hash)
            .await?
            .ok_or(ChainError::MissingValue(hash))?;
        let map = self.read_map(&hash, &commit).await?;
        Ok(Some(Snapshot { hash, commit, map }))
    }

    /// Load the current head, creating a genesis commit for an Empty dataset.
    ///
    /// The genesis commit holds the empty map, checksum `00000000` and last
    /// mutation id 0. If another writer initializes the dataset first, its
    /// head is returned instead.
    pub async fn load_or_init(&self) -> Result<Snapshot> {
        if let Some(head) = self.load().await? {
            return Ok(head);
        }

        match self.commit(None, &VersionedMap::new(), 0).await {
            Ok(genesis) => {
                tracing::info!(dataset = %self.dataset, hash = %genesis.hash, "initialized dataset");
                Ok(genesis)
            }
            Err(ChainError::RetryConflict { .. }) => {
                let head = self.load().await?;
                head.ok_or_else(|| ChainError::RetryConflict {
                    dataset: self.dataset.to_string(),
                    current: None,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Commit `map` on top of `basis`.
    ///
    /// `basis` must be the head the caller loaded (`None` for an Empty
    /// dataset). If the head has moved since, nothing is published and
    /// [`ChainError::RetryConflict`] is returned; the written values stay
    /// behind as unreferenced garbage for the store to collect.
    pub async fn commit(
        &self,
        basis: Option<&ContentHash>,
        map: &VersionedMap,
        last_mutation_id: u64,
    ) -> Result<Snapshot> {
        let payload = codec::encode_map_payload(map)?;
        let value = self.store.write_value(&payload).await?;

        let commit = Commit {
            basis: basis.copied(),
            value,
            checksum: map.checksum(),
            last_mutation_id,
        };
        let hash = self.store.write_value(&commit.encode()?).await?;

        match self
            .store
            .cas_head(self.dataset.as_str(), basis, &hash)
            .await?
        {
            CasResult::Updated => {
                tracing::debug!(
                    dataset = %self.dataset,
                    %hash,
                    checksum = %commit.checksum,
                    last_mutation_id,
                    "committed"
                );
                Ok(Snapshot {
                    hash,
                    commit,
                    map: map.clone(),
                })
            }
            CasResult::Conflict { current } => Err(ChainError::RetryConflict {
                dataset: self.dataset.to_string(),
                current,
            }),
        }
    }

    /// Read and decode a commit. `None` if no value is stored under `hash`.
    pub async fn read_commit(&self, hash: &ContentHash) -> Result<Option<Commit>> {
        let Some(bytes) = self.store.read_value(hash).await? else {
            return Ok(None);
        };
        Commit::decode(&bytes)
            .map(Some)
            .map_err(|e| ChainError::CorruptCommit {
                hash: *hash,
                reason: e.to_string(),
            })
    }

    /// Load the map a commit references and verify it against the commit's
    /// checksum.
    pub async fn read_map(&self, hash: &ContentHash, commit: &Commit) -> Result<VersionedMap> {
        let bytes = self
            .store
            .read_value(&commit.value)
            .await?
            .ok_or(ChainError::MissingValue(commit.value))?;

        let map = codec::decode_map_payload(&bytes).map_err(|e| ChainError::CorruptCommit {
            hash: *hash,
            reason: format!("map payload: {e}"),
        })?;

        if map.checksum() != commit.checksum {
            return Err(ChainError::CorruptCommit {
                hash: *hash,
                reason: format!(
                    "map checksum {} does not match recorded {}",
                    map.checksum(),
                    commit.checksum
                ),
            });
        }

        Ok(map)
    }

    /// Walk basis links from `hash`, newest first, returning at most `limit`
    /// commits (including `hash` itself).
    pub async fn ancestors(
        &self,
        hash: &ContentHash,
        limit: usize,
    ) -> Result<Vec<(ContentHash, Commit)>> {
        let mut out = Vec::new();
        let mut next = Some(*hash);

        while let Some(current) = next {
            if out.len() >= limit {
                break;
            }
            let commit = self
                .read_commit(&current)
                .await?
                .ok_or(ChainError::MissingValue(current))?;
            next = commit.basis;
            out.push((current, commit));
        }

        Ok(out)
    }

    /// Whether `target` is the head or one of its first `depth` ancestors.
    ///
    /// Commits are content-addressed across all datasets, so a hash that
    /// decodes is not necessarily part of this chain.
    pub async fn contains(&self, target: &ContentHash, depth: usize) -> Result<bool> {
        let mut next = self.store.get_head(self.dataset.as_str()).await?;
        let mut seen = 0;

        while let Some(current) = next {
            if current == *target {
                return Ok(true);
            }
            if seen >= depth {
                break;
            }
            seen += 1;
            next = self
                .read_commit(&current)
                .await?
                .ok_or(ChainError::MissingValue(current))?
                .basis;
        }

        Ok(false)
    }
}
