//! Immutable, versioned views of every table in a store.

use crate::version::VersionId;
use std::collections::BTreeMap;
use std::sync::Arc;
use vellum_core::schema::Schema;
use vellum_core::{ColumnId, Row, RowKey, TableId, Value};

/// Rows of one table, ordered by key.
#[derive(Clone, Debug, Default)]
pub struct TableData {
    rows: BTreeMap<RowKey, Row>,
}

impl TableData {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a row by key.
    #[inline]
    pub fn get(&self, key: RowKey) -> Option<&Row> {
        self.rows.get(&key)
    }

    /// Returns the number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates over rows in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    pub(crate) fn get_mut(&mut self, key: RowKey) -> Option<&mut Row> {
        self.rows.get_mut(&key)
    }

    pub(crate) fn insert(&mut self, row: Row) {
        self.rows.insert(row.key(), row);
    }

    pub(crate) fn remove(&mut self, key: RowKey) -> Option<Row> {
        self.rows.remove(&key)
    }
}

/// A frozen view of every table at one version.
///
/// Cloning is cheap: tables are shared and only copied when a write
/// transaction modifies them.
#[derive(Clone, Debug)]
pub struct Snapshot {
    version: VersionId,
    schema: Arc<Schema>,
    tables: Arc<Vec<Arc<TableData>>>,
}

impl Snapshot {
    pub(crate) fn new(version: VersionId, schema: Arc<Schema>, tables: Vec<Arc<TableData>>) -> Self {
        Self {
            version,
            schema,
            tables: Arc::new(tables),
        }
    }

    /// Creates an empty snapshot with one table per schema table.
    pub(crate) fn empty(version: VersionId, schema: Arc<Schema>) -> Self {
        let tables = (0..schema.len()).map(|_| Arc::new(TableData::new())).collect();
        Self::new(version, schema, tables)
    }

    pub(crate) fn tables(&self) -> &[Arc<TableData>] {
        &self.tables
    }

    /// Returns the version of this snapshot.
    #[inline]
    pub fn version(&self) -> VersionId {
        self.version
    }

    /// Returns the schema.
    #[inline]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns a table's data, or `None` if the table does not exist.
    pub fn table(&self, table: TableId) -> Option<&TableData> {
        self.tables.get(table as usize).map(|t| t.as_ref())
    }

    /// Returns true if the table exists in this snapshot.
    pub fn has_table(&self, table: TableId) -> bool {
        self.table(table).is_some()
    }

    /// Gets a row.
    pub fn get(&self, table: TableId, key: RowKey) -> Option<&Row> {
        self.table(table).and_then(|t| t.get(key))
    }

    /// Gets a single cell.
    pub fn value(&self, table: TableId, key: RowKey, column: ColumnId) -> Option<&Value> {
        self.get(table, key).and_then(|r| r.get(column))
    }

    /// Returns true if the row exists.
    pub fn contains(&self, table: TableId, key: RowKey) -> bool {
        self.get(table, key).is_some()
    }

    /// Iterates over a table's rows in key order (empty for unknown tables).
    pub fn rows(&self, table: TableId) -> impl Iterator<Item = &Row> {
        self.table(table).into_iter().flat_map(|t| t.iter())
    }

    /// Returns the rows of `origin` whose `column` links to `target`.
    pub fn backlinks(&self, origin: TableId, column: ColumnId, target: RowKey) -> Vec<RowKey> {
        self.rows(origin)
            .filter(|row| {
                row.get(column)
                    .map_or(false, |v| v.links().contains(&target))
            })
            .map(|row| row.key())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::schema::TableBuilder;
    use vellum_core::DataType;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder()
                .table(
                    TableBuilder::new("dog")
                        .unwrap()
                        .add_column("name", DataType::String)
                        .unwrap()
                        .add_link("friend", "dog")
                        .unwrap(),
                )
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_snapshot_lookup() {
        let mut table = TableData::new();
        let a = RowKey::new(1);
        let b = RowKey::new(2);
        table.insert(Row::new(b, vec![Value::from("b"), Value::Link(Some(a))]));
        table.insert(Row::new(a, vec![Value::from("a"), Value::Link(None)]));
        let snap = Snapshot::new(VersionId::new(4), schema(), vec![Arc::new(table)]);

        assert_eq!(snap.version(), VersionId::new(4));
        assert!(snap.contains(0, a));
        assert!(!snap.contains(1, a));
        assert_eq!(snap.value(0, b, 0), Some(&Value::from("b")));
        let keys: Vec<_> = snap.rows(0).map(|r| r.key()).collect();
        assert_eq!(keys, vec![a, b]);
        assert_eq!(snap.backlinks(0, 1, a), vec![b]);
        assert!(snap.backlinks(0, 1, b).is_empty());
        assert_eq!(snap.rows(7).count(), 0);
    }

    #[test]
    fn test_empty_snapshot() {
        let snap = Snapshot::empty(VersionId::new(1), schema());
        assert!(snap.has_table(0));
        assert!(snap.table(0).unwrap().is_empty());
    }
}
