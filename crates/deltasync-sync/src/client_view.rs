//! Client views: the authoritative upstream contents of a client's dataset.
//!
//! Before answering a pull, the handler may ask the account's upstream for
//! the client's current view and fold it into the dataset. The upstream is
//! an external service, so every failure here is reported back to the
//! client as diagnostics rather than failing the pull.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use deltasync_core::{CoreError, VersionedMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::accounts::Account;
use crate::messages::ClientViewInfo;

/// What the handler asks the upstream for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientViewRequest {
    #[serde(rename = "clientID")]
    pub client_id: String,
}

/// Full upstream contents for one client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientView {
    #[serde(rename = "clientView")]
    pub client_view: BTreeMap<String, Value>,

    #[serde(rename = "lastMutationID")]
    pub last_mutation_id: u64,
}

impl ClientView {
    pub fn new(last_mutation_id: u64) -> Self {
        Self {
            client_view: BTreeMap::new(),
            last_mutation_id,
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.client_view.insert(key.into(), value);
        self
    }

    /// Rewrite `base` so its contents equal this view.
    ///
    /// Keys absent from the view are removed; present keys are set. Keys the
    /// view leaves unchanged keep their storage, so an identical view yields
    /// a snapshot with the same checksum.
    pub fn replace_contents(&self, base: &VersionedMap) -> Result<VersionedMap, CoreError> {
        let mut editor = base.edit();

        let stale: Vec<String> = base
            .keys()
            .filter(|key| !self.client_view.contains_key(*key))
            .map(str::to_string)
            .collect();
        for key in &stale {
            editor.remove(key);
        }

        for (key, value) in &self.client_view {
            let raw = serde_json::to_vec(value).map_err(|e| CoreError::MalformedValue {
                key: key.clone(),
                reason: e.to_string(),
            })?;
            editor.set(key, raw)?;
        }

        Ok(editor.build())
    }
}

/// Why the client view could not be fetched.
#[derive(Debug, Error)]
pub enum ClientViewError {
    /// The upstream answered with a non-success status.
    #[error("client view returned HTTP {code}: {message}")]
    Status { code: u16, message: String },

    /// The upstream did not answer in time.
    #[error("client view timed out after {0:?}")]
    Timeout(Duration),

    /// The upstream could not be reached or its answer was unusable.
    #[error("client view unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

impl ClientViewError {
    /// Diagnostics to return to the client.
    pub fn info(&self) -> ClientViewInfo {
        let http_status_code = match self {
            ClientViewError::Status { code, .. } => *code,
            ClientViewError::Timeout(_) | ClientViewError::Unavailable(_) => 0,
        };
        ClientViewInfo {
            http_status_code,
            error_message: self.to_string(),
        }
    }
}

/// Source of client views for an account.
#[async_trait]
pub trait ClientViewSource: Send + Sync {
    /// Fetch the current view for `request.client_id`.
    ///
    /// `account.client_view_url` is the endpoint to call. The handler only
    /// fetches for accounts that have one, so it is always `Some` here.
    /// `auth` is the credential the client supplied, passed through as is.
    async fn fetch(
        &self,
        account: &Account,
        request: &ClientViewRequest,
        auth: Option<&str>,
    ) -> Result<ClientView, ClientViewError>;
}

enum Canned {
    View(ClientView),
    Status { code: u16, message: String },
}

/// In-memory client view source for tests and seeding.
///
/// Views are keyed by `(account id, client id)`. Clients with nothing
/// registered get a 404.
#[derive(Default)]
pub struct MemoryClientViewSource {
    views: RwLock<HashMap<(String, String), Canned>>,
    delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl MemoryClientViewSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before answering each fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Serve `view` for a client.
    pub fn set_view(&self, account_id: &str, client_id: &str, view: ClientView) {
        self.write()
            .insert(key(account_id, client_id), Canned::View(view));
    }

    /// Answer fetches for a client with an error status.
    pub fn set_status(&self, account_id: &str, client_id: &str, code: u16, message: &str) {
        self.write().insert(
            key(account_id, client_id),
            Canned::Status {
                code,
                message: message.to_string(),
            },
        );
    }

    /// Number of fetches served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<(String, String), Canned>> {
        self.views.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn key(account_id: &str, client_id: &str) -> (String, String) {
    (account_id.to_string(), client_id.to_string())
}

#[async_trait]
impl ClientViewSource for MemoryClientViewSource {
    async fn fetch(
        &self,
        account: &Account,
        request: &ClientViewRequest,
        _auth: Option<&str>,
    ) -> Result<ClientView, ClientViewError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let views = self.views.read().unwrap_or_else(PoisonError::into_inner);
        match views.get(&key(&account.id, &request.client_id)) {
            Some(Canned::View(view)) => Ok(view.clone()),
            Some(Canned::Status { code, message }) => Err(ClientViewError::Status {
                code: *code,
                message: message.clone(),
            }),
            None => Err(ClientViewError::Status {
                code: 404,
                message: format!("no client view for {}", request.client_id),
            }),
        }
    }
}
