//! Pull protocol scenarios against an in-memory server.

use deltasync::core::Commit;
use deltasync::{
    Checksum, ContentHash, ContentStore, MemoryStore, PullRequest, PullResponse, ServerConfig,
    SyncServer,
};
use deltasync_testkit::{accounts, init_tracing, view_of, ACCOUNT};
use serde_json::{json, Value};

fn server() -> SyncServer<MemoryStore> {
    init_tracing();
    SyncServer::in_memory(ServerConfig {
        accounts: accounts(&[]),
        ..ServerConfig::default()
    })
}

fn patch_json(resp: &PullResponse) -> Value {
    serde_json::to_value(&resp.patch).unwrap()
}

async fn pull_from(s: &SyncServer<MemoryStore>, basis: &PullResponse) -> PullResponse {
    s.pull(&PullRequest::from_state(
        ACCOUNT,
        "c1",
        &basis.state_id,
        basis.checksum,
    ))
    .await
    .unwrap()
}

#[tokio::test]
async fn test_add_to_empty() {
    let s = server();
    let empty = s.pull(&PullRequest::fresh(ACCOUNT, "c1")).await.unwrap();
    assert_eq!(patch_json(&empty), json!([{"op": "remove", "path": "/"}]));
    assert_eq!(empty.checksum.to_hex(), "00000000");

    s.inject(ACCOUNT, "c1", &view_of(1, &[("foo", json!("bar"))]))
        .await
        .unwrap();

    let resp = pull_from(&s, &empty).await;
    assert_eq!(
        patch_json(&resp),
        json!([{"op": "add", "path": "/foo", "value": "bar"}])
    );
    assert_eq!(resp.last_mutation_id, 1);
    assert!(resp.client_view_info.is_none());
}

#[tokio::test]
async fn test_mixed_changes_sorted_by_path() {
    let s = server();
    s.inject(
        ACCOUNT,
        "c1",
        &view_of(1, &[("foo", json!("bar")), ("hot", json!("dog"))]),
    )
    .await
    .unwrap();
    let basis = s.pull(&PullRequest::fresh(ACCOUNT, "c1")).await.unwrap();

    s.inject(
        ACCOUNT,
        "c1",
        &view_of(2, &[("foo", json!("baz")), ("mon", json!("key"))]),
    )
    .await
    .unwrap();

    let resp = pull_from(&s, &basis).await;
    assert_eq!(
        patch_json(&resp),
        json!([
            {"op": "replace", "path": "/foo", "value": "baz"},
            {"op": "remove", "path": "/hot"},
            {"op": "add", "path": "/mon", "value": "key"}
        ])
    );
}

#[tokio::test]
async fn test_slash_in_key_is_escaped() {
    let s = server();
    let empty = s.pull(&PullRequest::fresh(ACCOUNT, "c1")).await.unwrap();
    s.inject(ACCOUNT, "c1", &view_of(1, &[("a/b", json!("x"))]))
        .await
        .unwrap();

    let resp = pull_from(&s, &empty).await;
    assert_eq!(
        patch_json(&resp),
        json!([{"op": "add", "path": "/a~1b", "value": "x"}])
    );
}

#[tokio::test]
async fn test_unknown_basis_is_full_resync() {
    let s = server();
    s.inject(ACCOUNT, "c1", &view_of(1, &[("a", json!(1)), ("b", json!(2))]))
        .await
        .unwrap();

    let req = PullRequest::from_state(
        ACCOUNT,
        "c1",
        &ContentHash::of(b"never committed"),
        Checksum::from_u32(0xdead_beef),
    );
    let resp = s.pull(&req).await.unwrap();

    assert!(resp.is_full_resync());
    assert_eq!(
        patch_json(&resp),
        json!([
            {"op": "remove", "path": "/"},
            {"op": "add", "path": "/a", "value": 1},
            {"op": "add", "path": "/b", "value": 2}
        ])
    );
}

#[tokio::test]
async fn test_current_basis_gets_empty_patch() {
    let s = server();
    s.inject(ACCOUNT, "c1", &view_of(4, &[("a", json!([1, 2]))]))
        .await
        .unwrap();
    let basis = s.pull(&PullRequest::fresh(ACCOUNT, "c1")).await.unwrap();

    let resp = pull_from(&s, &basis).await;
    assert!(resp.patch.is_empty());
    assert_eq!(resp.state_id, basis.state_id);
    assert_eq!(resp.checksum, basis.checksum);
    assert_eq!(resp.last_mutation_id, 4);
}

#[tokio::test]
async fn test_checksum_disagreement_is_full_resync() {
    let s = server();
    s.inject(ACCOUNT, "c1", &view_of(1, &[("a", json!(1))]))
        .await
        .unwrap();
    let basis = s.pull(&PullRequest::fresh(ACCOUNT, "c1")).await.unwrap();

    let req = PullRequest::from_state(
        ACCOUNT,
        "c1",
        &basis.state_id,
        Checksum::from_u32(basis.checksum.as_u32() ^ 0xff),
    );
    let resp = s.pull(&req).await.unwrap();
    assert!(resp.is_full_resync());
    assert_eq!(resp.state_id, basis.state_id);
}

#[tokio::test]
async fn test_corrupt_basis_is_full_resync() {
    let s = server();
    s.inject(ACCOUNT, "c1", &view_of(1, &[("a", json!(1))]))
        .await
        .unwrap();
    let old = s.pull(&PullRequest::fresh(ACCOUNT, "c1")).await.unwrap();
    s.inject(ACCOUNT, "c1", &view_of(2, &[("a", json!(2))]))
        .await
        .unwrap();

    // Unreadable commit record.
    let commit_bytes = s.store().read_value(&old.state_id).await.unwrap().unwrap();
    s.store().corrupt_value(&old.state_id, &b"\xff\x00"[..]).unwrap();
    let resp = pull_from(&s, &old).await;
    assert!(resp.is_full_resync());
    assert_eq!(resp.patch.len(), 2);

    // Readable commit, damaged map payload.
    s.store().corrupt_value(&old.state_id, commit_bytes).unwrap();
    let commit = Commit::decode(&s.store().read_value(&old.state_id).await.unwrap().unwrap())
        .unwrap();
    s.store().corrupt_value(&commit.value, &b"\x80"[..]).unwrap();
    let resp = pull_from(&s, &old).await;
    assert!(resp.is_full_resync());

    // The head itself is intact.
    assert_eq!(resp.last_mutation_id, 2);
}

#[tokio::test]
async fn test_clients_are_isolated() {
    let s = server();
    s.inject(ACCOUNT, "c1", &view_of(1, &[("a", json!(1))]))
        .await
        .unwrap();
    s.inject(ACCOUNT, "c2", &view_of(7, &[("b", json!(2))]))
        .await
        .unwrap();

    let one = s.pull(&PullRequest::fresh(ACCOUNT, "c1")).await.unwrap();
    let two = s.pull(&PullRequest::fresh(ACCOUNT, "c2")).await.unwrap();
    assert_ne!(one.state_id, two.state_id);
    assert_eq!(two.last_mutation_id, 7);

    // A state from another client's dataset is not a valid basis.
    let cross = s
        .pull(&PullRequest::from_state(ACCOUNT, "c1", &two.state_id, two.checksum))
        .await
        .unwrap();
    assert!(cross.is_full_resync());
}

#[tokio::test]
async fn test_accounts_with_slashes_do_not_share_datasets() {
    init_tracing();
    let s = SyncServer::in_memory(ServerConfig {
        accounts: accounts(&["a", "a/b"]),
        ..ServerConfig::default()
    });
    s.inject("a/b", "c", &view_of(1, &[("secret", json!("x"))]))
        .await
        .unwrap();

    let resp = s.pull(&PullRequest::fresh("a", "b/c")).await.unwrap();
    assert_eq!(patch_json(&resp), json!([{"op": "remove", "path": "/"}]));
    assert_eq!(resp.checksum.to_hex(), "00000000");
    assert_eq!(resp.last_mutation_id, 0);

    let mut datasets = s.datasets().await.unwrap();
    datasets.sort();
    assert_eq!(datasets, vec!["a/b~1c".to_string(), "a~1b/c".to_string()]);
}

#[tokio::test]
async fn test_malformed_ids_are_client_errors() {
    let s = server();

    let mut req = PullRequest::fresh(ACCOUNT, "c1");
    req.base_state_id = "not-a-hash".into();
    req.checksum = "00000000".into();
    let err = s.pull(&req).await.unwrap_err();
    assert!(!err.is_retryable());

    let mut req = PullRequest::fresh(ACCOUNT, "c1");
    req.base_state_id = ContentHash::of(b"x").to_hex();
    req.checksum = "123".into();
    assert!(!s.pull(&req).await.unwrap_err().is_retryable());

    let err = s.pull(&PullRequest::fresh("nobody", "c1")).await.unwrap_err();
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_identical_inject_does_not_commit() {
    let s = server();
    let view = view_of(1, &[("a", json!({"x": 1, "y": 2}))]);
    let first = s.inject(ACCOUNT, "c1", &view).await.unwrap();

    let reordered = view_of(1, &[("a", json!({"y": 2, "x": 1}))]);
    let second = s.inject(ACCOUNT, "c1", &reordered).await.unwrap();
    assert_eq!(first.hash, second.hash);

    // Same contents, newer mutation id: a new commit.
    let third = s.inject(ACCOUNT, "c1", &view_of(2, &[("a", json!({"x": 1, "y": 2}))]))
        .await
        .unwrap();
    assert_ne!(third.hash, first.hash);
    assert_eq!(third.checksum(), first.checksum());
    assert_eq!(s.history(ACCOUNT, "c1", 10).await.unwrap().len(), 3);
}
