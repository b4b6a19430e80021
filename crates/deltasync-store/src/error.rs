//! Store errors.

use thiserror::Error;

/// Failures of a content store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Database(#[from] rusqlite::Error),

    /// A value that must exist was missing.
    #[error("value not found: {0}")]
    NotFound(String),

    /// A stored row does not have the expected shape.
    #[error("invalid stored data: {0}")]
    InvalidData(String),

    /// The schema could not be brought to the current version.
    #[error("schema migration failed: {0}")]
    Migration(String),

    /// A lock guarding the backend was poisoned by a panicking writer.
    #[error("store lock poisoned: {0}")]
    Poisoned(String),

    /// A blocking database task failed to complete.
    #[error("blocking task failed: {0}")]
    Task(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
