//! Commit: an immutable, content-addressed snapshot reference.
//!
//! A commit points at its basis (the previous head, absent for the first
//! commit of a dataset) and at a separately stored map payload. The map's
//! checksum is copied into the commit so it can be compared against a
//! client's claim without loading the payload.

use ciborium::value::{Integer, Value};
use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::codec::{decode_canonical, encode_canonical};
use crate::error::{CoreError, Result};
use crate::types::ContentHash;

/// The current commit schema version.
pub const COMMIT_VERSION: u8 = 0;

/// Commit field keys (integer keys for compact encoding).
mod keys {
    pub const VERSION: u64 = 0;
    pub const BASIS: u64 = 1;
    pub const VALUE: u64 = 2;
    pub const CHECKSUM: u64 = 3;
    pub const LAST_MUTATION_ID: u64 = 4;
}

/// An immutable record in a dataset's commit chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// The previous head, if any.
    pub basis: Option<ContentHash>,

    /// Hash of the encoded map payload.
    pub value: ContentHash,

    /// Checksum of the referenced map.
    pub checksum: Checksum,

    /// Last client mutation reflected in this snapshot.
    pub last_mutation_id: u64,
}

impl Commit {
    /// Encode to canonical CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut entries = Vec::with_capacity(5);

        entries.push((uint(keys::VERSION), Value::Integer(COMMIT_VERSION.into())));
        entries.push((
            uint(keys::BASIS),
            match &self.basis {
                Some(hash) => Value::Bytes(hash.as_bytes().to_vec()),
                None => Value::Null,
            },
        ));
        entries.push((uint(keys::VALUE), Value::Bytes(self.value.as_bytes().to_vec())));
        entries.push((uint(keys::CHECKSUM), Value::Integer(self.checksum.as_u32().into())));
        entries.push((
            uint(keys::LAST_MUTATION_ID),
            Value::Integer(self.last_mutation_id.into()),
        ));

        encode_canonical(&Value::Map(entries))
    }

    /// Decode a commit from canonical CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value = decode_canonical(bytes)?;
        let Value::Map(map) = value else {
            return Err(malformed("expected map"));
        };
        if map.len() != 5 {
            return Err(malformed("unexpected field count"));
        }

        let get = |key: u64| -> Option<&Value> {
            map.iter()
                .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == i128::from(key)))
                .map(|(_, v)| v)
        };

        match get(keys::VERSION) {
            Some(Value::Integer(i)) if i128::from(*i) == i128::from(COMMIT_VERSION) => {}
            Some(Value::Integer(i)) => {
                return Err(malformed(&format!("unsupported version {}", i128::from(*i))))
            }
            _ => return Err(malformed("missing version")),
        }

        let basis = match get(keys::BASIS) {
            Some(Value::Null) => None,
            Some(Value::Bytes(b)) => Some(hash_field(b, "basis")?),
            _ => return Err(malformed("invalid basis")),
        };

        let value = match get(keys::VALUE) {
            Some(Value::Bytes(b)) => hash_field(b, "value")?,
            _ => return Err(malformed("invalid value")),
        };

        let checksum = match get(keys::CHECKSUM) {
            Some(Value::Integer(i)) => u32::try_from(*i)
                .map(Checksum::from_u32)
                .map_err(|_| malformed("checksum out of range"))?,
            _ => return Err(malformed("missing checksum")),
        };

        let last_mutation_id = match get(keys::LAST_MUTATION_ID) {
            Some(Value::Integer(i)) => {
                u64::try_from(*i).map_err(|_| malformed("last mutation id out of range"))?
            }
            _ => return Err(malformed("missing last mutation id")),
        };

        Ok(Self {
            basis,
            value,
            checksum,
            last_mutation_id,
        })
    }

    /// Content hash of the encoded commit.
    pub fn compute_hash(&self) -> Result<ContentHash> {
        Ok(ContentHash::of(&self.encode()?))
    }

    /// Whether this is the first commit of its dataset.
    pub fn is_root(&self) -> bool {
        self.basis.is_none()
    }
}

fn uint(n: u64) -> Value {
    Value::Integer(Integer::from(n))
}

fn hash_field(bytes: &[u8], field: &str) -> Result<ContentHash> {
    ContentHash::try_from(bytes).map_err(|_| malformed(&format!("{field} must be 32 bytes")))
}

fn malformed(reason: &str) -> CoreError {
    CoreError::Decoding(format!("commit: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(basis: Option<ContentHash>) -> Commit {
        Commit {
            basis,
            value: ContentHash::of(b"payload"),
            checksum: Checksum::from_u32(0xdead_beef),
            last_mutation_id: 42,
        }
    }

    #[test]
    fn test_commit_roundtrip() {
        for commit in [sample(None), sample(Some(ContentHash::of(b"parent")))] {
            let bytes = commit.encode().unwrap();
            assert_eq!(Commit::decode(&bytes).unwrap(), commit);
        }
    }

    #[test]
    fn test_hash_is_deterministic_and_sensitive() {
        let a = sample(None);
        assert_eq!(a.compute_hash().unwrap(), a.clone().compute_hash().unwrap());

        let mut b = a.clone();
        b.last_mutation_id += 1;
        assert_ne!(a.compute_hash().unwrap(), b.compute_hash().unwrap());

        let c = sample(Some(a.compute_hash().unwrap()));
        assert_ne!(a.compute_hash().unwrap(), c.compute_hash().unwrap());
        assert!(a.is_root());
        assert!(!c.is_root());
    }

    #[test]
    fn test_decode_rejects_truncated() {
        let bytes = sample(None).encode().unwrap();
        assert!(matches!(
            Commit::decode(&bytes[..bytes.len() - 1]),
            Err(CoreError::Decoding(_))
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        let not_a_map = encode_canonical(&Value::Array(vec![])).unwrap();
        assert!(Commit::decode(&not_a_map).is_err());

        let short_hash = encode_canonical(&Value::Map(vec![
            (uint(0), uint(0)),
            (uint(1), Value::Null),
            (uint(2), Value::Bytes(vec![0; 31])),
            (uint(3), uint(0)),
            (uint(4), uint(0)),
        ]))
        .unwrap();
        assert!(Commit::decode(&short_hash).is_err());
    }

    #[test]
    fn test_decode_rejects_future_version() {
        let future = encode_canonical(&Value::Map(vec![
            (uint(0), uint(9)),
            (uint(1), Value::Null),
            (uint(2), Value::Bytes(vec![0; 32])),
            (uint(3), uint(0)),
            (uint(4), uint(0)),
        ]))
        .unwrap();
        assert!(Commit::decode(&future).is_err());
    }
}
