//! Vellum Reactive - Live collections and change notifications for Vellum.
//!
//! This crate keeps query results current as the store changes and tells
//! observers exactly what changed:
//!
//! - `Collection`: A live query bound to a session, evaluated on demand
//! - `ChangeSet`: Insertions, deletions, modifications and moves between two
//!   versions of a collection
//! - `ChangeNotifier`: Re-runs one query in the background and diffs results
//! - `DependencyFilter` / `KeyPath`: Decide which commits and columns matter
//! - `Coordinator`: Runs notifiers per store and hands results to sessions
//! - `Session`: The owning-thread handle that reads, writes and delivers
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use std::sync::Arc;
//! use vellum_core::schema::{Schema, TableBuilder};
//! use vellum_core::{DataType, Value};
//! use vellum_query::ScanEvaluator;
//! use vellum_reactive::{Coordinator, CoordinatorConfig, QueueScheduler, Session, SessionConfig};
//! use vellum_storage::VersionedStore;
//!
//! let schema = Schema::builder()
//!     .table(TableBuilder::new("item").unwrap().add_column("value", DataType::Int).unwrap())
//!     .build()
//!     .unwrap();
//! let coordinator = Coordinator::new(
//!     "demo",
//!     VersionedStore::new(schema),
//!     Arc::new(ScanEvaluator),
//!     CoordinatorConfig::manual(),
//! );
//! let scheduler = QueueScheduler::new();
//! let session = Session::open(&coordinator, scheduler.clone(), SessionConfig::default());
//!
//! let items = session.table("item").unwrap();
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = seen.clone();
//! let _token = items
//!     .observe(move |changes| {
//!         if let Ok(changes) = changes {
//!             sink.borrow_mut().push(changes.insertions.to_vec());
//!         }
//!     })
//!     .unwrap();
//!
//! coordinator.run_async_notifiers();
//! scheduler.run_pending();
//!
//! session
//!     .write(|tx| tx.insert(0, vec![Value::Int(1)]).map(|_| ()))
//!     .unwrap();
//! coordinator.run_async_notifiers();
//! scheduler.run_pending();
//!
//! // The first call reports the initial (empty) results.
//! assert_eq!(*seen.borrow(), vec![vec![], vec![0]]);
//! ```

mod arena;
pub mod callback;
pub mod change_set;
pub mod collection;
pub mod coordinator;
pub mod dependency;
pub mod key_path;
pub mod notifier;
pub mod scheduler;
pub mod session;

pub use arena::NotifierHandle;
pub use callback::{
    CallbackToken, ChangeCallback, CollectionCallback, ErrorCallback, OutcomeCallback,
};
pub use change_set::{ChangeSet, IndexSet, Move, RowModifications};
pub use collection::{Collection, NotificationToken, ObjectRef};
pub use coordinator::{Coordinator, CoordinatorConfig, CoordinatorRegistry};
pub use dependency::{DependencyFilter, ModificationChecker, DEFAULT_MAX_LINK_DEPTH};
pub use key_path::{KeyPath, KeyPathArray, KeyPathElement};
pub use notifier::ChangeNotifier;
pub use scheduler::{QueueScheduler, Scheduler, Task};
pub use session::{Session, SessionConfig, SessionId};
