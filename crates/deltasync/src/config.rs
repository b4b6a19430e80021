//! Server configuration.
//!
//! Loaded from a JSON file. Every field is optional; durations are integer
//! milliseconds.
//!
//! ```json
//! {
//!   "max_commit_retries": 3,
//!   "client_view_timeout": 10000,
//!   "max_basis_depth": 1024,
//!   "diff": { "parallel_threshold": 4096 },
//!   "database_path": "deltasync.db",
//!   "accounts": [
//!     { "id": "1", "name": "demo", "client_view_url": "https://example.test/view" }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};

use deltasync_sync::{AccountRegistry, PullConfig};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

/// Configuration for [`SyncServer`](crate::SyncServer).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Retry budget, client view deadline and diff tuning.
    #[serde(flatten)]
    pub pull: PullConfig,

    /// Accounts allowed to pull.
    pub accounts: AccountRegistry,

    /// SQLite database to open. In-memory storage when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

impl ServerConfig {
    /// Read a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ServerError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ServerError::Config {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::info!(
            path = %path.display(),
            accounts = config.accounts.len(),
            "loaded config"
        );
        Ok(config)
    }
}
