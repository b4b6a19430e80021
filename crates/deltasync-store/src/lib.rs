//! # Deltasync Store
//!
//! Storage abstraction for deltasync: an immutable, content-addressed value
//! store plus one compare-and-swap head pointer per named dataset.
//!
//! ## Key Types
//!
//! - [`ContentStore`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`CasResult`] - Outcome of advancing a dataset head
//!
//! ## Usage
//!
//! ```rust,no_run
//! use deltasync_store::{CasResult, ContentStore, SqliteStore};
//!
//! async fn example() -> deltasync_store::Result<()> {
//!     let store = SqliteStore::open("deltasync.db")?;
//!
//!     let hash = store.write_value(b"commit bytes").await?;
//!     match store.cas_head("account/client", None, &hash).await? {
//!         CasResult::Updated => {}
//!         CasResult::Conflict { current } => println!("lost race to {current:?}"),
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{CasResult, ContentStore, StoreExt};

/// Current wall-clock time in Unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
