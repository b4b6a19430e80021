//! The sync server: one entry point over storage and the pull protocol.
//!
//! Transports (HTTP handlers, test harnesses) hold a [`SyncServer`] and feed
//! it request bodies. Everything below it is storage-agnostic.

use std::path::Path;
use std::sync::Arc;

use deltasync_core::{Checksum, ContentHash};
use deltasync_store::{ContentStore, MemoryStore, SqliteStore};
use deltasync_sync::{
    ClientView, ClientViewSource, CommitChain, DatasetName, PullHandler, PullRequest,
    PullResponse, Snapshot, SyncError,
};
use serde::Serialize;

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};

/// One entry in a dataset's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    #[serde(rename = "stateID")]
    pub state_id: ContentHash,
    pub basis: Option<ContentHash>,
    pub checksum: Checksum,
    #[serde(rename = "lastMutationID")]
    pub last_mutation_id: u64,
}

/// The sync server.
///
/// Provides:
/// - Pull requests, typed or as raw JSON bodies
/// - Direct injection of client views
/// - Read-only inspection of dataset heads and history
pub struct SyncServer<S> {
    handler: PullHandler<S>,
}

impl SyncServer<MemoryStore> {
    /// A server that keeps everything in memory.
    pub fn in_memory(config: ServerConfig) -> Self {
        Self::new(MemoryStore::new(), config)
    }
}

impl SyncServer<SqliteStore> {
    /// A server backed by the SQLite database at `path`.
    pub fn open_sqlite(path: impl AsRef<Path>, config: ServerConfig) -> Result<Self> {
        let store = SqliteStore::open(path)?;
        Ok(Self::new(store, config))
    }
}

impl SyncServer<Arc<dyn ContentStore>> {
    /// Build the server the configuration describes: SQLite when
    /// `database_path` is set, memory otherwise.
    pub fn from_config(config: ServerConfig) -> Result<Self> {
        let store: Arc<dyn ContentStore> = match &config.database_path {
            Some(path) => {
                tracing::info!(path = %path.display(), "opening sqlite store");
                Arc::new(SqliteStore::open(path)?)
            }
            None => {
                tracing::info!("using in-memory store");
                Arc::new(MemoryStore::new())
            }
        };
        Ok(Self::new(store, config))
    }
}

impl<S: ContentStore> SyncServer<S> {
    /// Create a server over `store`.
    pub fn new(store: S, config: ServerConfig) -> Self {
        Self {
            handler: PullHandler::new(store, config.accounts, config.pull),
        }
    }

    /// Refresh datasets from `source` before answering pulls.
    pub fn with_client_views(self, source: Arc<dyn ClientViewSource>) -> Self {
        Self {
            handler: self.handler.with_client_views(source),
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        self.handler.store()
    }

    pub fn handler(&self) -> &PullHandler<S> {
        &self.handler
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pull
    // ─────────────────────────────────────────────────────────────────────────

    /// Serve a pull request.
    pub async fn pull(&self, request: &PullRequest) -> Result<PullResponse> {
        Ok(self.handler.pull(request).await?)
    }

    /// Serve a pull request given as a JSON body, returning the JSON response.
    pub async fn pull_json(&self, body: &[u8]) -> Result<Vec<u8>> {
        let request: PullRequest = serde_json::from_slice(body).map_err(|e| {
            tracing::debug!(error = %e, "rejecting malformed pull body");
            ServerError::MalformedRequest(e)
        })?;
        let response = self.pull(&request).await?;
        serde_json::to_vec(&response).map_err(ServerError::Encode)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inject
    // ─────────────────────────────────────────────────────────────────────────

    /// Commit `view` as the contents of a client's dataset, bypassing the
    /// client view source.
    ///
    /// A view identical to the head commits nothing. Returns the head.
    pub async fn inject(
        &self,
        account_id: &str,
        client_id: &str,
        view: &ClientView,
    ) -> Result<Snapshot> {
        let head = self.handler.commit_view(account_id, client_id, view).await?;
        tracing::debug!(
            account = account_id,
            client = client_id,
            state_id = %head.hash,
            "injected client view"
        );
        Ok(head)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────────

    /// Current head of a client's dataset, if it has one.
    pub async fn head(&self, account_id: &str, client_id: &str) -> Result<Option<Snapshot>> {
        let dataset = self.dataset(account_id, client_id)?;
        let chain = CommitChain::new(self.store(), dataset);
        Ok(chain.load().await.map_err(SyncError::from)?)
    }

    /// Up to `limit` commits of a client's dataset, newest first.
    pub async fn history(
        &self,
        account_id: &str,
        client_id: &str,
        limit: usize,
    ) -> Result<Vec<CommitInfo>> {
        let dataset = self.dataset(account_id, client_id)?;
        let Some(head) = self.store().get_head(dataset.as_str()).await? else {
            return Ok(Vec::new());
        };

        let chain = CommitChain::new(self.store(), dataset);
        let commits = chain
            .ancestors(&head, limit)
            .await
            .map_err(SyncError::from)?;

        Ok(commits
            .into_iter()
            .map(|(state_id, commit)| CommitInfo {
                state_id,
                basis: commit.basis,
                checksum: commit.checksum,
                last_mutation_id: commit.last_mutation_id,
            })
            .collect())
    }

    /// Names of all datasets with a head.
    pub async fn datasets(&self) -> Result<Vec<String>> {
        Ok(self.store().list_datasets().await?)
    }

    fn dataset(&self, account_id: &str, client_id: &str) -> Result<DatasetName> {
        if account_id.is_empty() || client_id.is_empty() {
            return Err(SyncError::InvalidRequest("accountID and clientID are required".into()).into());
        }
        if !self.handler.accounts().contains(account_id) {
            return Err(SyncError::UnknownAccount(account_id.to_string()).into());
        }
        Ok(DatasetName::for_client(account_id, client_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltasync_sync::{Account, ErrorClass};
    use serde_json::json;

    fn server() -> SyncServer<MemoryStore> {
        let config = ServerConfig {
            accounts: [Account::new("acct", "Account")].into_iter().collect(),
            ..ServerConfig::default()
        };
        SyncServer::in_memory(config)
    }

    #[tokio::test]
    async fn test_pull_json_round_trip() {
        let s = server();
        s.inject("acct", "c1", &ClientView::new(1).with("a", json!(1)))
            .await
            .unwrap();

        let body = br#"{"accountID":"acct","clientID":"c1","baseStateID":"","checksum":""}"#;
        let out = s.pull_json(body).await.unwrap();
        let resp: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(resp["lastMutationID"], json!(1));
        assert_eq!(
            resp["patch"],
            json!([{"op":"remove","path":"/"},{"op":"add","path":"/a","value":1}])
        );
        assert_eq!(resp["checksum"].as_str().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_pull_json_malformed_is_client_error() {
        let s = server();
        let err = s.pull_json(b"{not json").await.unwrap_err();
        assert!(matches!(err, ServerError::MalformedRequest(_)));
        assert_eq!(err.class(), ErrorClass::Client);

        let err = s.pull_json(br#"{"clientID":"c1"}"#).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Client);
    }

    #[tokio::test]
    async fn test_head_and_history() {
        let s = server();
        assert!(s.head("acct", "c1").await.unwrap().is_none());
        assert!(s.history("acct", "c1", 10).await.unwrap().is_empty());

        let first = s
            .inject("acct", "c1", &ClientView::new(1).with("a", json!(1)))
            .await
            .unwrap();
        let second = s
            .inject("acct", "c1", &ClientView::new(2).with("a", json!(2)))
            .await
            .unwrap();

        let head = s.head("acct", "c1").await.unwrap().unwrap();
        assert_eq!(head.hash, second.hash);

        // second, first, genesis
        let history = s.history("acct", "c1", 10).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].state_id, second.hash);
        assert_eq!(history[0].basis, Some(first.hash));
        assert_eq!(history[1].last_mutation_id, 1);
        assert_eq!(history[2].basis, None);
        assert_eq!(history[2].checksum.as_u32(), 0);

        assert_eq!(s.history("acct", "c1", 1).await.unwrap().len(), 1);
        assert_eq!(s.datasets().await.unwrap(), vec!["acct/c1".to_string()]);
    }

    #[tokio::test]
    async fn test_inspection_validates_identity() {
        let s = server();
        let err = s.head("nobody", "c1").await.unwrap_err();
        assert!(matches!(err, ServerError::Sync(SyncError::UnknownAccount(_))));

        let err = s.history("acct", "", 1).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Client);
    }

    #[tokio::test]
    async fn test_from_config_without_database_is_in_memory() {
        let config = ServerConfig {
            accounts: [Account::new("acct", "Account")].into_iter().collect(),
            ..ServerConfig::default()
        };
        let s = SyncServer::from_config(config).unwrap();
        let resp = s.pull(&PullRequest::fresh("acct", "c1")).await.unwrap();
        assert!(resp.patch.len() == 1 && resp.is_full_resync());
        assert_eq!(s.datasets().await.unwrap().len(), 1);
    }
}
