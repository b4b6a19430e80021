//! # deltasync testkit
//!
//! Testing utilities for deltasync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Diff vectors**: named map pairs with the exact patch JSON expected between them
//! - **Generators**: Proptest strategies for keys, JSON values, maps and edits
//! - **Fixtures**: Helpers for building maps, client views and account registries
//!
//! ## Diff Vectors
//!
//! ```rust
//! use deltasync_testkit::vectors::{all_vectors, compute_patch};
//!
//! for vector in all_vectors() {
//!     assert_eq!(compute_patch(&vector), vector.expected_patch);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use deltasync_testkit::generators::{map, edits, apply_edits};
//!
//! proptest! {
//!     #[test]
//!     fn diff_round_trips(base in map(16), script in edits(16)) {
//!         let next = apply_edits(&base, &script);
//!         let patch = deltasync_core::diff(&base, &next).unwrap();
//!         let result = deltasync_core::apply(&base, &patch).unwrap();
//!         prop_assert_eq!(result.checksum(), next.checksum());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use deltasync_testkit::fixtures::{map_of, view_of};
//! use serde_json::json;
//!
//! let map = map_of(&[("todo/1", json!({"done": false}))]);
//! let view = view_of(1, &[("todo/1", json!({"done": false}))]);
//! assert_eq!(view.replace_contents(&Default::default()).unwrap().checksum(), map.checksum());
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{accounts, accounts_with_client_view, init_tracing, map_of, view_of, ACCOUNT};
pub use generators::{apply_edits, Edit};
pub use vectors::{all_vectors, compute_patch, verify_all_vectors, DiffVector};
