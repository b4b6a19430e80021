//! Error types for the sync server.

use std::path::PathBuf;

use deltasync_store::StoreError;
use deltasync_sync::{ErrorClass, SyncError};
use thiserror::Error;

/// Errors that can occur during server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pull protocol error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Storage error outside the pull path (opening, listing).
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The request body is not a valid pull request.
    #[error("malformed request: {0}")]
    MalformedRequest(#[source] serde_json::Error),

    /// A response could not be serialized.
    #[error("failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),

    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid.
    #[error("invalid config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ServerError {
    /// Classify the error for the transport layer.
    pub fn class(&self) -> ErrorClass {
        match self {
            ServerError::Sync(e) => e.class(),
            ServerError::MalformedRequest(_) => ErrorClass::Client,
            ServerError::Store(_)
            | ServerError::Encode(_)
            | ServerError::ConfigIo { .. }
            | ServerError::Config { .. } => ErrorClass::Server,
        }
    }

    /// Whether the client may retry the same request.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Server
    }
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes_follow_sync_error() {
        let e: ServerError = SyncError::UnknownAccount("x".into()).into();
        assert_eq!(e.class(), ErrorClass::Client);
        assert!(!e.is_retryable());

        let e: ServerError = StoreError::Poisoned("lock".into()).into();
        assert_eq!(e.class(), ErrorClass::Server);

        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(ServerError::MalformedRequest(parse).class(), ErrorClass::Client);
    }
}
