//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use deltasync_core::VersionedMap;
use deltasync_sync::{Account, AccountRegistry, ClientView};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// Account id used by the fixtures.
pub const ACCOUNT: &str = "acct";

/// Install a test-friendly subscriber filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a map from JSON values.
pub fn map_of(pairs: &[(&str, Value)]) -> VersionedMap {
    let mut editor = VersionedMap::new().edit();
    for (key, value) in pairs {
        let raw = serde_json::to_vec(value).expect("json values serialize");
        editor.set(key, raw).expect("fixture keys are non-empty");
    }
    editor.build()
}

/// Build a client view from JSON values.
pub fn view_of(last_mutation_id: u64, pairs: &[(&str, Value)]) -> ClientView {
    pairs
        .iter()
        .fold(ClientView::new(last_mutation_id), |view, (key, value)| {
            view.with(*key, value.clone())
        })
}

/// A registry holding [`ACCOUNT`] and any extra ids.
pub fn accounts(extra: &[&str]) -> AccountRegistry {
    std::iter::once(ACCOUNT)
        .chain(extra.iter().copied())
        .map(|id| Account::new(id, format!("account {id}")))
        .collect()
}

/// A registry whose [`ACCOUNT`] refreshes from a client view endpoint.
pub fn accounts_with_client_view() -> AccountRegistry {
    [Account::new(ACCOUNT, "account").with_client_view_url("https://client-view.test/pull")]
        .into_iter()
        .collect()
}
