//! Error types for deltasync core.

use thiserror::Error;

use crate::checksum::Checksum;

/// Errors raised by the map, patch, and codec primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Keys must be non-empty strings.
    #[error("invalid key: keys must be non-empty")]
    InvalidKey,

    /// A value could not be parsed as JSON.
    #[error("malformed value for key {key:?}: {reason}")]
    MalformedValue { key: String, reason: String },

    /// A patch operation named something other than add/remove/replace.
    #[error("unknown patch operation: {0:?}")]
    UnknownOperation(String),

    /// A patch path was not a valid escaped top-level path.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// A checksum string was not 8 hex characters.
    #[error("malformed checksum: {0:?}")]
    MalformedChecksum(String),

    /// A content hash string was not 64 hex characters.
    #[error("malformed hash: {0:?}")]
    MalformedHash(String),

    /// The checksum after applying a patch did not match the declared one.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: Checksum, actual: Checksum },

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("decoding error: {0}")]
    Decoding(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
