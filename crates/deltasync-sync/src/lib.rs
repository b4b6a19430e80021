//! # Deltasync Sync
//!
//! The server side of the pull protocol: commit chains over a content
//! store, and the handler that turns a client's claimed state into a patch.
//!
//! ## Overview
//!
//! Every (account, client) pair owns one dataset whose history is a chain of
//! immutable commits. A pull names the commit the client last saw and the
//! checksum it computed for it. If the server can find and verify that
//! commit, it answers with the diff to the current head; otherwise it
//! answers with a full resync. Clients verify the result against the
//! checksum in the response.
//!
//! ## Key Properties
//!
//! - **Deterministic**: the same basis and head always yield the same patch
//! - **Self-healing**: untrusted client state degrades to a full resync
//! - **Optimistic**: concurrent writers are detected by compare-and-swap on
//!   the head and retried a bounded number of times
//!
//! ## Usage
//!
//! ```rust,no_run
//! use deltasync_store::MemoryStore;
//! use deltasync_sync::{Account, AccountRegistry, ClientState, PullConfig, PullHandler};
//!
//! async fn example() -> deltasync_sync::Result<()> {
//!     let accounts: AccountRegistry = [Account::new("acct", "Example")].into_iter().collect();
//!     let handler = PullHandler::new(MemoryStore::new(), accounts, PullConfig::default());
//!
//!     let mut client = ClientState::new();
//!     let response = handler.pull(&client.pull_request("acct", "client-1")).await?;
//!     client.apply(&response).expect("server checksum verified");
//!     Ok(())
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Client                                  Server
//!   |-- PullRequest {baseStateID, checksum} -->|
//!   |                                          |-- resolve basis
//!   |                                          |-- refresh client view (optional)
//!   |                                          |-- diff basis..head or full resync
//!   |<-- PullResponse {stateID, patch, ...} ---|
//!   |-- apply patch, verify checksum           |
//! ```

pub mod accounts;
pub mod chain;
pub mod client_view;
pub mod convergence;
pub mod error;
pub mod messages;
pub mod protocol;

pub use accounts::{Account, AccountRegistry};
pub use chain::{CommitChain, DatasetName, Snapshot};
pub use client_view::{
    ClientView, ClientViewError, ClientViewRequest, ClientViewSource, MemoryClientViewSource,
};
pub use convergence::{apply_pull_response, ClientState};
pub use error::{ChainError, ErrorClass, Result, SyncError};
pub use messages::{ClientViewInfo, PullRequest, PullResponse};
pub use protocol::{PullConfig, PullHandler};
