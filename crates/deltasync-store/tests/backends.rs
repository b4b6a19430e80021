//! Behavior shared by every ContentStore backend.

use std::sync::Arc;

use deltasync_core::ContentHash;
use deltasync_store::{CasResult, ContentStore, MemoryStore, SqliteStore, StoreError, StoreExt};

async fn exercise_store(store: &dyn ContentStore) {
    let a = store.write_value(b"first").await.unwrap();
    let b = store.write_value(b"second").await.unwrap();
    assert_ne!(a, b);

    assert!(store.cas_head("x/1", None, &a).await.unwrap().is_updated());
    assert_eq!(
        store.cas_head("x/1", None, &b).await.unwrap(),
        CasResult::Conflict { current: Some(a) }
    );
    assert!(store.cas_head("x/1", Some(&a), &b).await.unwrap().is_updated());
    assert_eq!(store.get_head("x/1").await.unwrap(), Some(b));
    assert!(store.get_head("x/2").await.unwrap().is_none());
}

#[tokio::test]
async fn test_memory_backend() {
    exercise_store(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_sqlite_backend() {
    exercise_store(&SqliteStore::open_memory().unwrap()).await;
}

#[tokio::test]
async fn test_sqlite_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    let head = {
        let store = SqliteStore::open(&path).unwrap();
        let hash = store.write_value(b"durable").await.unwrap();
        store.cas_head("acct/client", None, &hash).await.unwrap();
        hash
    };

    let reopened = SqliteStore::open(&path).unwrap();
    assert_eq!(reopened.get_head("acct/client").await.unwrap(), Some(head));
    assert_eq!(reopened.read_required(&head).await.unwrap().as_ref(), b"durable");
}

#[tokio::test]
async fn test_read_required_reports_missing() {
    let store = MemoryStore::new();
    let err = store
        .read_required(&ContentHash::of(b"absent"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn test_concurrent_cas_has_one_winner() {
    let store = Arc::new(SqliteStore::open_memory().unwrap());
    let base = store.write_value(b"base").await.unwrap();
    store.cas_head("race", None, &base).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8u8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let next = store.write_value(&[i]).await.unwrap();
            store.cas_head("race", Some(&base), &next).await.unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_updated() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}
