//! # Deltasync Core
//!
//! Pure primitives for the deltasync engine: checksummed versioned maps,
//! deterministic diff/patch, and content-addressed commit records.
//!
//! This crate contains no I/O, no storage, no networking. Everything here is
//! synchronous computation over immutable snapshots.
//!
//! ## Key Types
//!
//! - [`Checksum`] - Order-independent 32-bit fingerprint of a map's entries
//! - [`VersionedMap`] - Immutable snapshot of canonical JSON values
//! - [`Editor`] - Copy-on-write builder for a new snapshot
//! - [`Operation`] / [`Patch`] - Edit scripts over top-level keys
//! - [`Commit`] - A link in a dataset's commit chain
//! - [`ContentHash`] - BLAKE3 address of stored bytes
//!
//! ## Canonicalization
//!
//! Map values are canonical JSON (see [`canonical`]); stored records are
//! deterministic CBOR (see [`codec`]).

pub mod canonical;
pub mod checksum;
pub mod codec;
pub mod commit;
pub mod diff;
pub mod error;
pub mod map;
pub mod patch;
pub mod types;

pub use canonical::canonicalize;
pub use checksum::Checksum;
pub use codec::{decode_map_payload, encode_map_payload};
pub use commit::{Commit, COMMIT_VERSION};
pub use diff::{diff, diff_with, full_resync, DiffOptions};
pub use error::{CoreError, Result};
pub use map::{Editor, VersionedMap};
pub use patch::{apply, escape_key, key_to_path, path_to_key, unescape_key, OpKind, Operation, Patch};
pub use types::ContentHash;
