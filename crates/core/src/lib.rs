//! Vellum Core - Core types and schema definitions for Vellum.
//!
//! This crate provides the foundational types shared by the store, the query
//! evaluator and the live-query engine:
//!
//! - `DataType`: Supported column types, including links between tables
//! - `Value`: Runtime values that can be stored in a row
//! - `Row` / `RowKey`: A row of values and its stable identity
//! - `schema`: Schema definitions (Column, TableSchema, Schema)
//! - `Error`: Error types shared by every Vellum crate
//!
//! # Example
//!
//! ```rust
//! use vellum_core::{DataType, Row, RowKey, Value};
//! use vellum_core::schema::{Schema, TableBuilder};
//!
//! let schema = Schema::builder()
//!     .table(
//!         TableBuilder::new("person")
//!             .unwrap()
//!             .add_column("name", DataType::String)
//!             .unwrap(),
//!     )
//!     .table(
//!         TableBuilder::new("dog")
//!             .unwrap()
//!             .add_column("name", DataType::String)
//!             .unwrap()
//!             .add_link("owner", "person")
//!             .unwrap(),
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(schema.backlinks_to(0), vec![(1, 1)]);
//!
//! let row = Row::new(RowKey::new(1), vec![Value::from("Rex"), Value::Link(None)]);
//! assert_eq!(row.get(0), Some(&Value::String("Rex".into())));
//! ```

mod error;
mod row;
pub mod schema;
mod types;
mod value;

pub use error::{Error, Result};
pub use row::{Row, RowKey};
pub use types::{ColumnId, DataType, TableId};
pub use value::Value;
