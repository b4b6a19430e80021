//! Versioned map: an immutable, checksum-tracked snapshot of key/value data.
//!
//! A [`VersionedMap`] is never mutated. Changes go through an [`Editor`],
//! which starts from a shared reference to the snapshot's entries and only
//! copies them on the first write. [`Editor::build`] consumes the editor and
//! freezes the working copy into a new snapshot, so an editor cannot be
//! reused after building.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::canonical::canonicalize;
use crate::checksum::Checksum;
use crate::error::{CoreError, Result};

/// An immutable mapping from non-empty string keys to canonical JSON bytes.
///
/// Cloning is cheap: the entries are shared.
#[derive(Clone, Default)]
pub struct VersionedMap {
    entries: Arc<BTreeMap<String, Bytes>>,
    checksum: Checksum,
}

impl VersionedMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the canonical JSON bytes stored at `key`.
    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.entries.get(key)
    }

    /// Check whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// The checksum of the current contents.
    pub fn checksum(&self) -> Checksum {
        self.checksum
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Open an editor seeded from this snapshot.
    pub fn edit(&self) -> Editor {
        Editor {
            entries: Arc::clone(&self.entries),
            checksum: self.checksum,
        }
    }

    /// Recompute the checksum from scratch.
    ///
    /// Used to verify snapshots loaded from storage, where the running
    /// checksum cannot be trusted.
    pub fn recompute_checksum(&self) -> Checksum {
        let mut checksum = Checksum::new();
        for (key, value) in self.entries.iter() {
            checksum.add(key, value);
        }
        checksum
    }

    /// Rebuild a map from entries that are already canonical, such as a
    /// decoded storage payload.
    ///
    /// The checksum is recomputed; keys are still validated.
    pub fn from_canonical_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Bytes)>,
    {
        let mut map = BTreeMap::new();
        let mut checksum = Checksum::new();
        for (key, value) in entries {
            if key.is_empty() {
                return Err(CoreError::InvalidKey);
            }
            if let Some(old) = map.insert(key.clone(), value.clone()) {
                checksum.remove(&key, &old);
            }
            checksum.add(&key, &value);
        }
        Ok(Self {
            entries: Arc::new(map),
            checksum,
        })
    }

    /// Whether two snapshots share the same underlying storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

impl std::fmt::Debug for VersionedMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedMap")
            .field("len", &self.entries.len())
            .field("checksum", &self.checksum)
            .finish()
    }
}

/// Mutable builder for a new [`VersionedMap`] snapshot.
///
/// Owned by a single operation; not shared between threads.
pub struct Editor {
    entries: Arc<BTreeMap<String, Bytes>>,
    checksum: Checksum,
}

impl Editor {
    /// Set `key` to a JSON value.
    ///
    /// The value is canonicalized before it is stored or checksummed. On
    /// error the editor is left unchanged.
    pub fn set(&mut self, key: &str, raw: impl AsRef<[u8]>) -> Result<()> {
        if key.is_empty() {
            return Err(CoreError::InvalidKey);
        }
        let value = canonicalize(raw.as_ref()).map_err(|e| CoreError::MalformedValue {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.set_canonical(key, value);
        Ok(())
    }

    /// Set `key` to bytes that are already canonical.
    fn set_canonical(&mut self, key: &str, value: Bytes) {
        if self.entries.get(key) == Some(&value) {
            return;
        }
        let entries = Arc::make_mut(&mut self.entries);
        match entries.insert(key.to_string(), value) {
            Some(old) => {
                let new = &entries[key];
                self.checksum.replace(key, &old, new);
            }
            None => self.checksum.add(key, &entries[key]),
        }
    }

    /// Remove `key`. Returns false if it was absent.
    pub fn remove(&mut self, key: &str) -> bool {
        if !self.entries.contains_key(key) {
            return false;
        }
        let entries = Arc::make_mut(&mut self.entries);
        match entries.remove(key) {
            Some(old) => {
                self.checksum.remove(key, &old);
                true
            }
            None => false,
        }
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries = Arc::new(BTreeMap::new());
        self.checksum = Checksum::new();
    }

    /// Read through to the working copy.
    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.entries.get(key)
    }

    /// The running checksum of the working copy.
    pub fn checksum(&self) -> Checksum {
        self.checksum
    }

    /// Freeze the working copy into an immutable snapshot.
    pub fn build(self) -> VersionedMap {
        VersionedMap {
            entries: self.entries,
            checksum: self.checksum,
        }
    }
}
