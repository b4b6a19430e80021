//! Error types for the sync module.

use deltasync_core::{ContentHash, CoreError};
use deltasync_store::StoreError;
use thiserror::Error;

/// Errors raised by the commit chain.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The head moved between load and commit. Reload and retry.
    #[error("head of {dataset} moved concurrently (now {current:?})")]
    RetryConflict {
        dataset: String,
        current: Option<ContentHash>,
    },

    /// A stored commit or its map payload failed to decode or verify.
    #[error("corrupt commit {hash}: {reason}")]
    CorruptCommit { hash: ContentHash, reason: String },

    /// A value referenced by a commit is not in the store.
    #[error("missing value {0}")]
    MissingValue(ContentHash),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Encoding a new record failed.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl ChainError {
    /// Whether the error means stored data cannot be trusted.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            ChainError::CorruptCommit { .. } | ChainError::MissingValue(_)
        )
    }
}

/// Who is responsible for a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The request was malformed or referenced unknown identities.
    /// Retrying the same request will fail again.
    Client,
    /// Something went wrong on the server. Safe to retry.
    Server,
}

/// Errors that can occur while serving a pull.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The request body or one of its fields is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The account id is not registered.
    #[error("unknown account: {0:?}")]
    UnknownAccount(String),

    /// Commit chain failure.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Conflicting writers kept moving the head.
    #[error("gave up committing to {dataset} after {attempts} attempts")]
    RetriesExhausted { dataset: String, attempts: u32 },
}

impl SyncError {
    /// Classify the error for the transport layer.
    pub fn class(&self) -> ErrorClass {
        match self {
            SyncError::InvalidRequest(_) | SyncError::UnknownAccount(_) => ErrorClass::Client,
            SyncError::Chain(_) | SyncError::RetriesExhausted { .. } => ErrorClass::Server,
        }
    }

    /// Whether the client may retry the same request.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Server
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        SyncError::Chain(ChainError::Store(e))
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
