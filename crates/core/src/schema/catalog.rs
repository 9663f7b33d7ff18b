//! The set of tables known to a store.

use super::table::{TableBuilder, TableSchema};
use crate::error::{Error, Result};
use crate::types::{ColumnId, TableId};

/// All tables of a store, addressed by `TableId` (their position).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Schema {
    tables: Vec<TableSchema>,
}

impl Schema {
    /// Starts building a schema.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Returns all tables.
    #[inline]
    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    /// Returns the number of tables.
    #[inline]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if the schema has no tables.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Gets a table by id.
    pub fn table(&self, id: TableId) -> Option<&TableSchema> {
        self.tables.get(id as usize)
    }

    /// Gets a table by name.
    pub fn table_by_name(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name() == name)
    }

    /// Resolves a table name to its id.
    pub fn table_id(&self, name: &str) -> Result<TableId> {
        self.table_by_name(name)
            .map(|t| t.id())
            .ok_or_else(|| Error::table_not_found(name))
    }

    /// Gets a table by id, failing with `TableNotFound`.
    pub fn require(&self, id: TableId) -> Result<&TableSchema> {
        self.table(id)
            .ok_or_else(|| Error::table_not_found(format!("#{}", id)))
    }

    /// Returns every `(origin_table, origin_column)` whose links point into `target`.
    pub fn backlinks_to(&self, target: TableId) -> Vec<(TableId, ColumnId)> {
        self.tables
            .iter()
            .flat_map(|t| {
                t.link_columns()
                    .filter(move |(_, to)| *to == target)
                    .map(move |(col, _)| (t.id(), col))
            })
            .collect()
    }
}

/// Builder for a `Schema`; link targets may refer to tables added later.
#[derive(Default)]
pub struct SchemaBuilder {
    tables: Vec<TableBuilder>,
}

impl SchemaBuilder {
    /// Adds a table.
    pub fn table(mut self, table: TableBuilder) -> Self {
        self.tables.push(table);
        self
    }

    /// Builds the schema, resolving link targets.
    pub fn build(self) -> Result<Schema> {
        let names: Vec<String> = self.tables.iter().map(|t| t.name.clone()).collect();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(Error::invalid_schema(format!(
                    "Table already exists: {}",
                    name
                )));
            }
        }
        let resolve = |name: &str| names.iter().position(|n| n == name).map(|p| p as TableId);
        let tables = self
            .tables
            .into_iter()
            .enumerate()
            .map(|(i, t)| t.build(i as TableId, resolve))
            .collect::<Result<Vec<_>>>()?;
        Ok(Schema { tables })
    }
}
