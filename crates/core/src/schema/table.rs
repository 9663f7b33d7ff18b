//! Table definition for Vellum schemas.

use super::column::Column;
use crate::error::{Error, Result};
use crate::types::{ColumnId, DataType, TableId};

/// A table definition in the store schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSchema {
    /// Position of the table in its schema.
    id: TableId,
    /// Table name.
    name: String,
    /// Column definitions.
    columns: Vec<Column>,
}

impl TableSchema {
    /// Returns the table id.
    #[inline]
    pub fn id(&self) -> TableId {
        self.id
    }

    /// Returns the table name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the columns.
    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the number of columns.
    #[inline]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Gets a column by position.
    pub fn column(&self, id: ColumnId) -> Option<&Column> {
        self.columns.get(id)
    }

    /// Gets a column by name.
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Gets a column position by name.
    pub fn column_id(&self, name: &str) -> Result<ColumnId> {
        self.columns
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| Error::column_not_found(&self.name, name))
    }

    /// Iterates over the link columns of this table with their targets.
    pub fn link_columns(&self) -> impl Iterator<Item = (ColumnId, TableId)> + '_ {
        self.columns
            .iter()
            .filter_map(|c| c.data_type().link_target().map(|t| (c.index(), t)))
    }
}

/// Column type as written in a builder; link targets are resolved by name
/// when the schema is built.
#[derive(Clone, Debug)]
pub(crate) enum PendingType {
    Plain(DataType),
    Link(String),
    LinkList(String),
}

/// Builder for creating table definitions.
pub struct TableBuilder {
    pub(crate) name: String,
    pub(crate) columns: Vec<(String, PendingType)>,
}

impl TableBuilder {
    /// Creates a new table builder.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        Ok(Self {
            name,
            columns: Vec::new(),
        })
    }

    /// Validates a name follows naming rules.
    fn check_naming_rules(name: &str) -> Result<()> {
        let first = match name.chars().next() {
            Some(c) => c,
            None => return Err(Error::invalid_schema("Name cannot be empty")),
        };
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(Error::invalid_schema(format!(
                "Name must start with letter or underscore: {}",
                name
            )));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::invalid_schema(format!(
                "Name contains invalid characters: {}",
                name
            )));
        }
        Ok(())
    }

    fn push(mut self, name: String, ty: PendingType) -> Result<Self> {
        Self::check_naming_rules(&name)?;
        if self.columns.iter().any(|(n, _)| *n == name) {
            return Err(Error::invalid_schema(format!(
                "Column already exists: {}",
                name
            )));
        }
        self.columns.push((name, ty));
        Ok(self)
    }

    /// Adds a scalar column.
    pub fn add_column(self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        if data_type.is_link() {
            return Err(Error::invalid_schema(
                "Link columns must be added with add_link or add_link_list",
            ));
        }
        self.push(name.into(), PendingType::Plain(data_type))
    }

    /// Adds a nullable link to a row of `target`.
    pub fn add_link(self, name: impl Into<String>, target: impl Into<String>) -> Result<Self> {
        self.push(name.into(), PendingType::Link(target.into()))
    }

    /// Adds an ordered list of links to rows of `target`.
    pub fn add_link_list(self, name: impl Into<String>, target: impl Into<String>) -> Result<Self> {
        self.push(name.into(), PendingType::LinkList(target.into()))
    }

    /// Builds the table, resolving link targets with `resolve`.
    pub(crate) fn build<F>(self, id: TableId, resolve: F) -> Result<TableSchema>
    where
        F: Fn(&str) -> Option<TableId>,
    {
        let lookup = |target: &str| {
            resolve(target).ok_or_else(|| {
                Error::invalid_schema(format!(
                    "Link target {} of table {} does not exist",
                    target, self.name
                ))
            })
        };
        let mut columns = Vec::with_capacity(self.columns.len());
        for (i, (name, ty)) in self.columns.iter().enumerate() {
            let data_type = match ty {
                PendingType::Plain(dt) => *dt,
                PendingType::Link(target) => DataType::Link(lookup(target)?),
                PendingType::LinkList(target) => DataType::LinkList(lookup(target)?),
            };
            columns.push(Column::new(name.clone(), data_type).with_index(i));
        }
        Ok(TableSchema {
            id,
            name: self.name,
            columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(name: &str) -> Option<TableId> {
        match name {
            "person" => Some(0),
            "dog" => Some(1),
            _ => None,
        }
    }

    #[test]
    fn test_table_builder() {
        let table = TableBuilder::new("dog")
            .unwrap()
            .add_column("name", DataType::String)
            .unwrap()
            .add_column("age", DataType::Int)
            .unwrap()
            .add_link("owner", "person")
            .unwrap()
            .build(1, resolve)
            .unwrap();

        assert_eq!(table.id(), 1);
        assert_eq!(table.name(), "dog");
        assert_eq!(table.column_count(), 3);
        assert_eq!(table.column_id("age").unwrap(), 1);
        assert_eq!(table.column(2).unwrap().data_type(), DataType::Link(0));
        assert_eq!(table.link_columns().collect::<Vec<_>>(), vec![(2, 0)]);
    }

    #[test]
    fn test_unknown_column() {
        let table = TableBuilder::new("t")
            .unwrap()
            .add_column("a", DataType::Int)
            .unwrap()
            .build(0, resolve)
            .unwrap();
        assert!(table.get_column("b").is_none());
        assert!(matches!(
            table.column_id("b"),
            Err(Error::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_column_name() {
        let result = TableBuilder::new("test")
            .unwrap()
            .add_column("123invalid", DataType::Int);
        assert!(result.is_err());
        assert!(TableBuilder::new("").is_err());
    }

    #[test]
    fn test_duplicate_column() {
        let result = TableBuilder::new("test")
            .unwrap()
            .add_column("id", DataType::Int)
            .unwrap()
            .add_column("id", DataType::Int);
        assert!(result.is_err());
    }

    #[test]
    fn test_unresolved_link_target() {
        let result = TableBuilder::new("cat")
            .unwrap()
            .add_link("owner", "nobody")
            .unwrap()
            .build(2, resolve);
        assert!(matches!(result, Err(Error::InvalidSchema(_))));
    }

    #[test]
    fn test_link_via_add_column_rejected() {
        let result = TableBuilder::new("t")
            .unwrap()
            .add_column("l", DataType::Link(0));
        assert!(result.is_err());
    }
}
