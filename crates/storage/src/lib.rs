//! Vellum Storage - Versioned in-memory store for Vellum.
//!
//! This crate provides the storage layer consumed by the live-query engine:
//!
//! - `VersionedStore`: Multi-version store with a commit history
//! - `Snapshot`: Immutable view of every table at one version
//! - `WriteTransaction`: Copy-on-write transaction producing the next version
//! - `TransactionChangeInfo`: What a commit (or run of commits) touched
//! - `FailPoints`: One-shot failure injection for tests
//!
//! # Example
//!
//! ```rust
//! use vellum_core::schema::{Schema, TableBuilder};
//! use vellum_core::{DataType, Value};
//! use vellum_storage::VersionedStore;
//!
//! let schema = Schema::builder()
//!     .table(
//!         TableBuilder::new("item")
//!             .unwrap()
//!             .add_column("value", DataType::Int)
//!             .unwrap(),
//!     )
//!     .build()
//!     .unwrap();
//! let store = VersionedStore::new(schema);
//! let before = store.current_version();
//!
//! let mut tx = store.begin_write();
//! let key = tx.insert(0, vec![Value::Int(7)]).unwrap();
//! let (version, changes) = tx.commit().unwrap();
//!
//! assert!(version > before);
//! assert!(changes.table(0).unwrap().was_inserted(key));
//! assert_eq!(store.changes_between(before, version).unwrap(), *changes);
//! ```

pub mod change_info;
pub mod fail_point;
pub mod snapshot;
pub mod store;
pub mod transaction;
pub mod version;

pub use change_info::{ObjectChangeSet, TransactionChangeInfo};
pub use fail_point::{FailPoint, FailPoints};
pub use snapshot::{Snapshot, TableData};
pub use store::{VersionedStore, INITIAL_VERSION};
pub use transaction::{TransactionState, WriteTransaction};
pub use version::VersionId;
