//! Column paths with link traversal.
//!
//! A `ColumnPath` names a column of the query's table, or a column reached by
//! following link columns from it (`owner.name`).

use vellum_core::schema::Schema;
use vellum_core::{ColumnId, Error, Result, Row, TableId, Value};
use vellum_storage::Snapshot;

/// A chain of column ids; every hop but the last is a link column.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColumnPath {
    hops: Vec<ColumnId>,
}

impl ColumnPath {
    /// Creates a path from raw column ids.
    pub fn new(hops: Vec<ColumnId>) -> Self {
        Self { hops }
    }

    /// Creates a single-column path.
    pub fn column(column: ColumnId) -> Self {
        Self { hops: vec![column] }
    }

    /// Parses a dotted path of column names starting at `table`.
    pub fn parse(schema: &Schema, table: TableId, path: &str) -> Result<Self> {
        let mut current = schema.require(table)?;
        let mut hops = Vec::new();
        let mut names = path.split('.').peekable();
        while let Some(name) = names.next() {
            let column = current.column_id(name)?;
            hops.push(column);
            if names.peek().is_some() {
                let target = current
                    .column(column)
                    .and_then(|c| c.data_type().link_target())
                    .ok_or_else(|| {
                        Error::invalid_operation(format!(
                            "Column {}.{} is not a link and cannot be traversed",
                            current.name(),
                            name
                        ))
                    })?;
                current = schema.require(target)?;
            }
        }
        Ok(Self { hops })
    }

    /// Returns the column ids of each hop.
    #[inline]
    pub fn hops(&self) -> &[ColumnId] {
        &self.hops
    }

    /// Returns the column read at the last hop.
    pub fn last(&self) -> Option<ColumnId> {
        self.hops.last().copied()
    }

    /// Returns the table each hop reads from, starting with `root`.
    pub fn tables(&self, schema: &Schema, root: TableId) -> Vec<TableId> {
        let mut tables = vec![root];
        let mut current = root;
        for column in &self.hops[..self.hops.len().saturating_sub(1)] {
            let target = schema
                .table(current)
                .and_then(|t| t.column(*column))
                .and_then(|c| c.data_type().link_target());
            match target {
                Some(t) => {
                    tables.push(t);
                    current = t;
                }
                None => break,
            }
        }
        tables
    }

    /// Resolves the values this path reaches from `row`.
    ///
    /// A null link along a single-link chain resolves to `[Null]`; a path
    /// through a link list yields one value per reached row and may be empty.
    pub fn resolve(&self, snapshot: &Snapshot, table: TableId, row: &Row) -> Vec<Value> {
        let (last, links) = match self.hops.split_last() {
            Some(split) => split,
            None => return vec![Value::Null],
        };

        let mut frontier = vec![row.clone()];
        let mut current = table;
        let mut through_list = false;
        for column in links {
            let target = snapshot
                .schema()
                .table(current)
                .and_then(|t| t.column(*column))
                .and_then(|c| c.data_type().link_target());
            let target = match target {
                Some(t) => t,
                None => return vec![Value::Null],
            };
            let mut next = Vec::new();
            for r in &frontier {
                if let Some(v) = r.get(*column) {
                    through_list |= matches!(v, Value::LinkList(_));
                    next.extend(v.links().iter().filter_map(|k| snapshot.get(target, *k)).cloned());
                }
            }
            frontier = next;
            current = target;
        }

        if frontier.is_empty() && !through_list {
            return vec![Value::Null];
        }
        frontier
            .iter()
            .map(|r| r.get(*last).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Resolves to a single value (the first reached), for ordering.
    pub fn resolve_first(&self, snapshot: &Snapshot, table: TableId, row: &Row) -> Value {
        self.resolve(snapshot, table, row)
            .into_iter()
            .next()
            .unwrap_or(Value::Null)
    }
}

impl From<ColumnId> for ColumnPath {
    fn from(column: ColumnId) -> Self {
        Self::column(column)
    }
}
