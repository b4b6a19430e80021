//! Commit retries against a store where another writer keeps winning.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use deltasync_core::ContentHash;
use deltasync_store::{CasResult, ContentStore, MemoryStore, Result as StoreResult};
use deltasync_sync::{
    Account, AccountRegistry, ClientView, CommitChain, DatasetName, PullConfig, PullHandler,
    PullRequest, SyncError,
};
use serde_json::json;

/// Moves the head itself just before each of the first `races` swaps.
struct Racing {
    inner: MemoryStore,
    races: AtomicUsize,
}

impl Racing {
    fn new(races: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            races: AtomicUsize::new(races),
        }
    }

    async fn interfere(&self, dataset: &str) {
        let chain = CommitChain::new(&self.inner, DatasetName::new(dataset));
        let Some(head) = chain.load().await.unwrap() else {
            return;
        };
        let mut ed = head.map.edit();
        let n = self.races.load(Ordering::SeqCst);
        ed.set(&format!("racer{n}"), "true").unwrap();
        chain
            .commit(Some(&head.hash), &ed.build(), head.last_mutation_id())
            .await
            .unwrap();
    }
}

#[async_trait]
impl ContentStore for Racing {
    async fn write_value(&self, bytes: &[u8]) -> StoreResult<ContentHash> {
        self.inner.write_value(bytes).await
    }

    async fn read_value(&self, hash: &ContentHash) -> StoreResult<Option<Bytes>> {
        self.inner.read_value(hash).await
    }

    async fn has_value(&self, hash: &ContentHash) -> StoreResult<bool> {
        self.inner.has_value(hash).await
    }

    async fn get_head(&self, dataset: &str) -> StoreResult<Option<ContentHash>> {
        self.inner.get_head(dataset).await
    }

    async fn cas_head(
        &self,
        dataset: &str,
        expected: Option<&ContentHash>,
        new: &ContentHash,
    ) -> StoreResult<CasResult> {
        // Genesis commits are left alone.
        if expected.is_some()
            && self
                .races
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            self.interfere(dataset).await;
        }
        self.inner.cas_head(dataset, expected, new).await
    }

    async fn list_datasets(&self) -> StoreResult<Vec<String>> {
        self.inner.list_datasets().await
    }
}

fn accounts() -> AccountRegistry {
    [Account::new("acct", "Account")].into_iter().collect()
}

#[tokio::test]
async fn test_commit_succeeds_within_retry_budget() {
    let handler = PullHandler::new(Racing::new(3), accounts(), PullConfig::default());
    let view = ClientView::new(1).with("k", json!("v"));

    let head = handler.commit_view("acct", "c1", &view).await.unwrap();

    // The racers' keys are gone: the view replaces the contents.
    assert_eq!(head.map.len(), 1);
    assert_eq!(head.last_mutation_id(), 1);

    let resp = handler.pull(&PullRequest::fresh("acct", "c1")).await.unwrap();
    assert_eq!(resp.state_id, head.hash);
}

#[tokio::test]
async fn test_commit_gives_up_after_retry_budget() {
    let config = PullConfig {
        max_commit_retries: 2,
        ..PullConfig::default()
    };
    let handler = PullHandler::new(Racing::new(10), accounts(), config);
    let view = ClientView::new(1).with("k", json!("v"));

    let err = handler.commit_view("acct", "c1", &view).await.unwrap_err();
    match &err {
        SyncError::RetriesExhausted { dataset, attempts } => {
            assert_eq!(dataset, "acct/c1");
            assert_eq!(*attempts, 3);
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    assert!(err.is_retryable());
}
