//! Data type definitions for Vellum.
//!
//! This module defines the supported column types and the identifiers used
//! to address tables and columns.

/// Identifier of a table within a schema.
pub type TableId = u32;

/// Position of a column within its table.
pub type ColumnId = usize;

/// Supported column types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Boolean type (true/false)
    Bool,
    /// 64-bit signed integer
    Int,
    /// 64-bit floating point number
    Double,
    /// UTF-8 string
    String,
    /// Nullable link to a single row of the target table
    Link(TableId),
    /// Ordered list of links to rows of the target table
    LinkList(TableId),
}

impl DataType {
    /// Returns the target table if this is a link or link list column.
    #[inline]
    pub fn link_target(&self) -> Option<TableId> {
        match self {
            DataType::Link(t) | DataType::LinkList(t) => Some(*t),
            _ => None,
        }
    }

    /// Returns whether this type links to another table.
    #[inline]
    pub fn is_link(&self) -> bool {
        self.link_target().is_some()
    }

    /// Returns whether this type is a list of links.
    #[inline]
    pub fn is_list(&self) -> bool {
        matches!(self, DataType::LinkList(_))
    }
}
