//! Vellum Query - Query specifications and evaluation for Vellum.
//!
//! This crate describes what a live query selects and evaluates it against
//! a snapshot:
//!
//! - `ColumnPath`: A column, possibly reached through link columns
//! - `Predicate`: Row filters with link traversal
//! - `Descriptor`: Sort, distinct and limit steps applied in composition order
//! - `QuerySpec`: An immutable, composable query description
//! - `QueryEvaluator` / `ScanEvaluator`: Evaluation into a `View`
//!
//! # Example
//!
//! ```rust
//! use vellum_core::schema::{Schema, TableBuilder};
//! use vellum_core::{DataType, Value};
//! use vellum_query::{ColumnPath, Predicate, QueryEvaluator, QuerySpec, ScanEvaluator, SortDescriptor};
//! use vellum_storage::VersionedStore;
//!
//! let schema = Schema::builder()
//!     .table(TableBuilder::new("item").unwrap().add_column("value", DataType::Int).unwrap())
//!     .build()
//!     .unwrap();
//! let store = VersionedStore::new(schema);
//! let mut tx = store.begin_write();
//! let a = tx.insert(0, vec![Value::Int(2)]).unwrap();
//! let b = tx.insert(0, vec![Value::Int(1)]).unwrap();
//! tx.insert(0, vec![Value::Int(0)]).unwrap();
//! tx.commit().unwrap();
//!
//! let value = ColumnPath::column(0);
//! let query = QuerySpec::new(0)
//!     .filter(Predicate::gt(value.clone(), 0))
//!     .unwrap()
//!     .sort(SortDescriptor::asc(value));
//! let view = ScanEvaluator.evaluate(&query, &store.latest()).unwrap();
//! assert_eq!(view.keys(), &[b, a]);
//! ```

pub mod descriptor;
pub mod evaluator;
pub mod path;
pub mod predicate;
pub mod spec;
pub mod view;

pub use descriptor::{Descriptor, DistinctDescriptor, SortDescriptor, SortOrder};
pub use evaluator::{QueryEvaluator, ScanEvaluator};
pub use path::ColumnPath;
pub use predicate::{CompareOp, Predicate};
pub use spec::QuerySpec;
pub use view::View;
