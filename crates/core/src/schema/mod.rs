//! Schema module for Vellum.
//!
//! This module contains the schema definitions: columns, tables and the
//! catalog of all tables in a store.

mod catalog;
mod column;
mod table;

pub use catalog::{Schema, SchemaBuilder};
pub use column::Column;
pub use table::{TableBuilder, TableSchema};
