//! Column definition for Vellum table schemas.

use crate::types::{ColumnId, DataType};

/// A column definition in a table schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    name: String,
    /// Data type of the column.
    data_type: DataType,
    /// Column position in the table (0-based).
    index: ColumnId,
}

impl Column {
    /// Creates a new column definition.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            index: 0,
        }
    }

    /// Sets the column position.
    pub(crate) fn with_index(mut self, index: ColumnId) -> Self {
        self.index = index;
        self
    }

    /// Returns the column name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the data type.
    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns the column position.
    #[inline]
    pub fn index(&self) -> ColumnId {
        self.index
    }

    /// Returns whether this column links to another table.
    #[inline]
    pub fn is_link(&self) -> bool {
        self.data_type.is_link()
    }
}
