//! Key paths naming the properties a callback cares about.
//!
//! A key path is a dotted chain of column names starting at a collection's
//! table, for example `"owner.name"`. The last element may be `*` to match
//! every column at that level, and `@links.<table>.<column>` walks a link
//! backwards to the rows that point at the current one.

use vellum_core::schema::Schema;
use vellum_core::{ColumnId, Error, Result, TableId};

/// One hop of a key path, tagged with the table it applies to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyPathElement {
    /// A column of `table`
    Column { table: TableId, column: ColumnId },
    /// Every column of `table`
    Wildcard { table: TableId },
    /// Rows of `origin_table` linking to the current row through `origin_column`
    Backlink {
        origin_table: TableId,
        origin_column: ColumnId,
    },
}

/// A parsed key path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyPath {
    elements: Vec<KeyPathElement>,
}

impl KeyPath {
    /// Parses a dotted key path rooted at `table`.
    pub fn parse(schema: &Schema, table: TableId, path: &str) -> Result<Self> {
        let tokens: Vec<&str> = path.split('.').collect();
        if tokens.iter().any(|t| t.is_empty()) {
            return Err(Error::invalid_operation(format!("invalid key path '{}'", path)));
        }

        let mut elements = Vec::new();
        let mut current = schema.require(table)?;
        let mut i = 0;
        while i < tokens.len() {
            let token = tokens[i];
            let last = i + 1 == tokens.len();
            match token {
                "*" => {
                    if !last {
                        return Err(Error::invalid_operation(format!(
                            "wildcard must end key path '{}'",
                            path
                        )));
                    }
                    elements.push(KeyPathElement::Wildcard { table: current.id() });
                    i += 1;
                }
                "@links" => {
                    let (Some(origin_name), Some(column_name)) = (tokens.get(i + 1), tokens.get(i + 2))
                    else {
                        return Err(Error::invalid_operation(format!(
                            "'@links' needs a table and a column in key path '{}'",
                            path
                        )));
                    };
                    let origin = schema
                        .table_by_name(origin_name)
                        .ok_or_else(|| Error::table_not_found(*origin_name))?;
                    let origin_column = origin.column_id(column_name)?;
                    let links_here = origin
                        .column(origin_column)
                        .and_then(|c| c.data_type().link_target())
                        == Some(current.id());
                    if !links_here {
                        return Err(Error::invalid_operation(format!(
                            "'{}.{}' does not link to '{}'",
                            origin_name,
                            column_name,
                            current.name()
                        )));
                    }
                    elements.push(KeyPathElement::Backlink {
                        origin_table: origin.id(),
                        origin_column,
                    });
                    current = origin;
                    i += 3;
                }
                name => {
                    let column = current.column_id(name)?;
                    elements.push(KeyPathElement::Column {
                        table: current.id(),
                        column,
                    });
                    if !last {
                        let target = current
                            .column(column)
                            .and_then(|c| c.data_type().link_target())
                            .ok_or_else(|| {
                                Error::invalid_operation(format!(
                                    "'{}' in key path '{}' is not a link",
                                    name, path
                                ))
                            })?;
                        current = schema.require(target)?;
                    }
                    i += 1;
                }
            }
        }
        Ok(Self { elements })
    }

    /// Returns the hops in order.
    #[inline]
    pub fn elements(&self) -> &[KeyPathElement] {
        &self.elements
    }

    /// Returns every table a change to which could fire this path.
    pub fn tables(&self) -> Vec<TableId> {
        self.elements
            .iter()
            .map(|e| match e {
                KeyPathElement::Column { table, .. } | KeyPathElement::Wildcard { table } => *table,
                KeyPathElement::Backlink { origin_table, .. } => *origin_table,
            })
            .collect()
    }
}

/// The key paths of one callback. Empty means "any change".
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct KeyPathArray {
    paths: Vec<KeyPath>,
}

impl KeyPathArray {
    /// Creates an empty (unfiltered) array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses several dotted paths rooted at `table`.
    pub fn parse(schema: &Schema, table: TableId, paths: &[&str]) -> Result<Self> {
        let paths = paths
            .iter()
            .map(|p| KeyPath::parse(schema, table, p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { paths })
    }

    /// Returns true if the callback wants every change.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Returns the paths.
    #[inline]
    pub fn paths(&self) -> &[KeyPath] {
        &self.paths
    }
}

impl From<Vec<KeyPath>> for KeyPathArray {
    fn from(paths: Vec<KeyPath>) -> Self {
        Self { paths }
    }
}
