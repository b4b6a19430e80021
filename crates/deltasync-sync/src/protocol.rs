//! Pull handler: serves one client's request to catch up.
//!
//! Per request:
//! 1. Validate the account and client ids and parse the claimed basis.
//! 2. Resolve the basis. Anything that cannot be trusted (unknown hash,
//!    undecodable commit, checksum disagreement, corrupt payload) is logged
//!    and answered with a full resync instead of an error.
//! 3. Optionally refresh the dataset from the account's client view and
//!    commit the result if it changed anything.
//! 4. Diff the basis against the head, or send a full resync.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use deltasync_core::{diff_with, full_resync, Checksum, ContentHash, DiffOptions, VersionedMap};
use deltasync_store::ContentStore;
use serde::{Deserialize, Serialize};

use crate::accounts::{Account, AccountRegistry};
use crate::chain::{CommitChain, DatasetName, Snapshot};
use crate::client_view::{ClientView, ClientViewError, ClientViewRequest, ClientViewSource};
use crate::error::{ChainError, Result, SyncError};
use crate::messages::{ClientViewInfo, PullRequest, PullResponse};

/// Configuration for the pull handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullConfig {
    /// Extra attempts after a commit loses a race with another writer.
    pub max_commit_retries: u32,
    /// Deadline for one client view fetch.
    #[serde(with = "millis")]
    pub client_view_timeout: Duration,
    /// How far behind the head a client basis may be and still be diffed.
    /// Older or foreign bases get a full resync.
    pub max_basis_depth: usize,
    /// Diff tuning.
    pub diff: DiffOptions,
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            max_commit_retries: 3,
            client_view_timeout: Duration::from_secs(10),
            max_basis_depth: 1024,
            diff: DiffOptions::default(),
        }
    }
}

/// Serialize a `Duration` as integer milliseconds.
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Where the patch for a request starts from.
enum Basis {
    /// Diff from this verified snapshot.
    Trusted(VersionedMap),
    /// Clear the client and resend everything.
    Resync,
}

/// Server-side pull protocol over a content store.
pub struct PullHandler<S> {
    store: S,
    accounts: AccountRegistry,
    client_views: Option<Arc<dyn ClientViewSource>>,
    config: PullConfig,
    /// Serializes refresh-then-commit per dataset within this process.
    locks: DatasetLocks,
}

impl<S: ContentStore> PullHandler<S> {
    pub fn new(store: S, accounts: AccountRegistry, config: PullConfig) -> Self {
        Self {
            store,
            accounts,
            client_views: None,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Refresh datasets from `source` before serving pulls.
    pub fn with_client_views(mut self, source: Arc<dyn ClientViewSource>) -> Self {
        self.client_views = Some(source);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn accounts(&self) -> &AccountRegistry {
        &self.accounts
    }

    pub fn config(&self) -> &PullConfig {
        &self.config
    }

    /// Serve a pull request.
    pub async fn pull(&self, request: &PullRequest) -> Result<PullResponse> {
        let account = self.validate(request)?;
        let claimed = parse_basis(request)?;
        let chain = CommitChain::new(
            &self.store,
            DatasetName::for_client(&account.id, &request.client_id),
        );

        let basis = match claimed {
            Some((hash, checksum)) => self.resolve_basis(&chain, &hash, checksum).await?,
            None => Basis::Resync,
        };

        let (head, client_view_info) = self.refresh(&chain, account, request).await?;

        let patch = match &basis {
            Basis::Trusted(map) => diff_with(map, &head.map, &self.config.diff),
            Basis::Resync => full_resync(&head.map),
        }
        .map_err(ChainError::Core)?;

        tracing::debug!(
            dataset = %chain.dataset(),
            state_id = %head.hash,
            ops = patch.len(),
            full_resync = matches!(basis, Basis::Resync),
            "serving pull"
        );

        Ok(PullResponse {
            state_id: head.hash,
            last_mutation_id: head.last_mutation_id(),
            patch,
            checksum: head.checksum(),
            client_view_info,
        })
    }

    /// Commit `view` as the new contents of a client's dataset.
    ///
    /// Does nothing if the view matches the head's checksum and last
    /// mutation id. Returns the resulting head.
    pub async fn commit_view(
        &self,
        account_id: &str,
        client_id: &str,
        view: &ClientView,
    ) -> Result<Snapshot> {
        let account = self.account(account_id)?;
        require_non_empty("clientID", client_id)?;

        let chain = CommitChain::new(&self.store, DatasetName::for_client(&account.id, client_id));
        let _guard = self.lock_dataset(chain.dataset()).await;

        let head = chain.load_or_init().await?;
        self.commit_with_retries(&chain, head, view)
            .await?
            .map_err(|e| SyncError::InvalidRequest(format!("invalid client view: {e}")))
    }

    fn validate(&self, request: &PullRequest) -> Result<&Account> {
        let account = self.account(&request.account_id)?;
        require_non_empty("clientID", &request.client_id)?;
        Ok(account)
    }

    fn account(&self, account_id: &str) -> Result<&Account> {
        require_non_empty("accountID", account_id)?;
        self.accounts
            .get(account_id)
            .ok_or_else(|| SyncError::UnknownAccount(account_id.to_string()))
    }

    async fn resolve_basis(
        &self,
        chain: &CommitChain<'_, S>,
        hash: &ContentHash,
        claimed: Checksum,
    ) -> Result<Basis> {
        let commit = match chain.read_commit(hash).await {
            Ok(Some(commit)) => commit,
            Ok(None) => {
                tracing::debug!(dataset = %chain.dataset(), basis = %hash, "basis not found");
                return Ok(Basis::Resync);
            }
            Err(e) if e.is_corruption() => {
                tracing::warn!(dataset = %chain.dataset(), basis = %hash, error = %e, "untrusted basis");
                return Ok(Basis::Resync);
            }
            Err(e) => return Err(e.into()),
        };

        if commit.checksum != claimed {
            tracing::warn!(
                dataset = %chain.dataset(),
                basis = %hash,
                claimed = %claimed,
                recorded = %commit.checksum,
                "basis checksum mismatch"
            );
            return Ok(Basis::Resync);
        }

        match chain.contains(hash, self.config.max_basis_depth).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(dataset = %chain.dataset(), basis = %hash, "basis not in dataset history");
                return Ok(Basis::Resync);
            }
            Err(e) if e.is_corruption() => {
                tracing::warn!(dataset = %chain.dataset(), basis = %hash, error = %e, "untrusted history");
                return Ok(Basis::Resync);
            }
            Err(e) => return Err(e.into()),
        }

        match chain.read_map(hash, &commit).await {
            Ok(map) => Ok(Basis::Trusted(map)),
            Err(e) if e.is_corruption() => {
                tracing::warn!(dataset = %chain.dataset(), basis = %hash, error = %e, "untrusted basis");
                Ok(Basis::Resync)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load the head, folding in the client view when one is configured.
    async fn refresh(
        &self,
        chain: &CommitChain<'_, S>,
        account: &Account,
        request: &PullRequest,
    ) -> Result<(Snapshot, Option<ClientViewInfo>)> {
        let Some(source) = self.client_views.as_ref().filter(|_| account.client_view_url.is_some())
        else {
            return Ok((chain.load_or_init().await?, None));
        };

        let view_request = ClientViewRequest {
            client_id: request.client_id.clone(),
        };
        let fetched = match tokio::time::timeout(
            self.config.client_view_timeout,
            source.fetch(account, &view_request, request.client_view_auth.as_deref()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ClientViewError::Timeout(self.config.client_view_timeout)),
        };

        let view = match fetched {
            Ok(view) => view,
            Err(e) => {
                tracing::warn!(dataset = %chain.dataset(), error = %e, "client view fetch failed");
                return Ok((chain.load_or_init().await?, Some(e.info())));
            }
        };

        let _guard = self.lock_dataset(chain.dataset()).await;

        let head = chain.load_or_init().await?;
        match self.commit_with_retries(chain, head.clone(), &view).await? {
            Ok(head) => Ok((head, Some(ClientViewInfo::ok()))),
            Err(e) => {
                tracing::warn!(dataset = %chain.dataset(), error = %e, "client view rejected");
                let info = ClientViewInfo {
                    http_status_code: ClientViewInfo::ok().http_status_code,
                    error_message: format!("invalid client view: {e}"),
                };
                Ok((head, Some(info)))
            }
        }
    }

    /// Fold `view` into the head and commit, reloading the head after each
    /// conflict.
    ///
    /// The outer error is a server failure; the inner one means the view
    /// itself could not be applied.
    async fn commit_with_retries(
        &self,
        chain: &CommitChain<'_, S>,
        mut head: Snapshot,
        view: &ClientView,
    ) -> Result<std::result::Result<Snapshot, deltasync_core::CoreError>> {
        let attempts = self.config.max_commit_retries.saturating_add(1);

        for attempt in 1..=attempts {
            let map = match view.replace_contents(&head.map) {
                Ok(map) => map,
                Err(e) => return Ok(Err(e)),
            };

            if map.checksum() == head.checksum() && view.last_mutation_id == head.last_mutation_id() {
                tracing::debug!(dataset = %chain.dataset(), "client view unchanged");
                return Ok(Ok(head));
            }

            match chain
                .commit(Some(&head.hash), &map, view.last_mutation_id)
                .await
            {
                Ok(committed) => {
                    tracing::info!(
                        dataset = %chain.dataset(),
                        state_id = %committed.hash,
                        checksum = %committed.checksum(),
                        last_mutation_id = committed.last_mutation_id(),
                        "committed client view"
                    );
                    return Ok(Ok(committed));
                }
                Err(ChainError::RetryConflict { current, .. }) => {
                    tracing::debug!(
                        dataset = %chain.dataset(),
                        attempt,
                        current = ?current,
                        "head moved, retrying commit"
                    );
                    head = chain.load_or_init().await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::error!(dataset = %chain.dataset(), attempts, "commit retries exhausted");
        Err(SyncError::RetriesExhausted {
            dataset: chain.dataset().to_string(),
            attempts,
        })
    }

    async fn lock_dataset(&self, dataset: &DatasetName) -> DatasetGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(dataset.clone()).or_default())
        };
        DatasetGuard {
            locks: &self.locks,
            dataset: dataset.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }
}

type DatasetLocks = Mutex<HashMap<DatasetName, Arc<tokio::sync::Mutex<()>>>>;

/// Holds a dataset lock; the map entry is dropped with the last holder.
struct DatasetGuard<'a> {
    locks: &'a DatasetLocks,
    dataset: DatasetName,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for DatasetGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Waiters hold their own clone, so a count of one means nobody else.
        if locks
            .get(&self.dataset)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.dataset);
        }
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(SyncError::InvalidRequest(format!("{field} is required")));
    }
    Ok(())
}

/// Parse the claimed basis. `None` means the client has no state.
fn parse_basis(request: &PullRequest) -> Result<Option<(ContentHash, Checksum)>> {
    if request.base_state_id.is_empty() {
        if !request.checksum.is_empty() {
            Checksum::from_hex(&request.checksum)
                .map_err(|e| SyncError::InvalidRequest(e.to_string()))?;
        }
        return Ok(None);
    }

    let hash = ContentHash::from_hex(&request.base_state_id)
        .map_err(|e| SyncError::InvalidRequest(e.to_string()))?;
    let checksum = Checksum::from_hex(&request.checksum)
        .map_err(|e| SyncError::InvalidRequest(e.to_string()))?;
    Ok(Some((hash, checksum)))
}
