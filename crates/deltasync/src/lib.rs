//! # deltasync
//!
//! Server-side sync engine: clients hold a copy of a key-value dataset and
//! periodically pull the edits that bring them up to date.
//!
//! ## Overview
//!
//! - **Snapshots**: immutable, checksummed key-value maps, shared cheaply
//!   between versions
//! - **Commits**: content-addressed records chaining each snapshot to its
//!   predecessor, with a compare-and-swap head per dataset
//! - **Patches**: JSON-Patch style edit scripts from a client's last known
//!   state to the current head
//! - **Pull**: the request/response protocol, falling back to a full resync
//!   whenever the client's claimed state cannot be trusted
//!
//! ## Key Properties
//!
//! - A client that applies a pull response to the state it named ends with
//!   exactly the server's checksum.
//! - A bad basis never fails a pull. It turns into a full resync.
//! - The head only moves by compare-and-swap; lost races are retried.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use deltasync::{ClientView, PullRequest, ServerConfig, SyncServer};
//!
//! async fn example() -> deltasync::Result<()> {
//!     let config = ServerConfig::from_path("deltasync.json")?;
//!     let server = SyncServer::from_config(config)?;
//!
//!     // Seed a client's dataset.
//!     let view = ClientView::new(1).with("todo/1", serde_json::json!({"done": false}));
//!     server.inject("acct", "client-1", &view).await?;
//!
//!     // Serve its first pull.
//!     let response = server.pull(&PullRequest::fresh("acct", "client-1")).await?;
//!     assert!(response.is_full_resync());
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `deltasync::core` - checksums, maps, diff and patch
//! - `deltasync::store` - storage abstraction, memory and SQLite backends
//! - `deltasync::sync` - commit chain and pull protocol

pub mod config;
pub mod error;
pub mod server;

// Re-export component crates
pub use deltasync_core as core;
pub use deltasync_store as store;
pub use deltasync_sync as sync;

// Re-export main types for convenience
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use server::{CommitInfo, SyncServer};

// Re-export commonly used types
pub use deltasync_core::{Checksum, ContentHash, Operation, Patch, VersionedMap};
pub use deltasync_store::{ContentStore, MemoryStore, SqliteStore};
pub use deltasync_sync::{
    apply_pull_response, Account, AccountRegistry, ClientState, ClientView, ClientViewInfo,
    ClientViewSource, ErrorClass, MemoryClientViewSource, PullConfig, PullRequest, PullResponse,
    Snapshot,
};
