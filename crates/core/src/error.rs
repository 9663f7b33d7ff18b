//! Error types for Vellum.

use crate::row::RowKey;
use crate::types::DataType;
use thiserror::Error;

/// Result type alias for Vellum operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for Vellum operations.
///
/// Errors are `Clone` because a single background failure is delivered to
/// every callback that was registered when it happened.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum Error {
    /// Positional access beyond the current size of a view.
    #[error("Index {index} is out of range (size {size})")]
    OutOfRange { index: usize, size: usize },

    /// API misuse, such as registering a callback on a frozen collection.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// An operation was called in a state that does not allow it.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The observed row no longer exists.
    #[error("Object {key} in table {table} has been deleted")]
    ObjectDeleted { table: String, key: RowKey },

    /// A background notifier run could not complete.
    #[error("Notifier run failed: {0}")]
    NotifierRunFailed(String),

    /// The operation is not supported for the current query shape.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Type mismatch error.
    #[error("Type mismatch: expected {expected:?}, got {got:?}")]
    TypeMismatch {
        expected: DataType,
        got: Option<DataType>,
    },

    /// Table not found.
    #[error("Table not found: {name}")]
    TableNotFound { name: String },

    /// Column not found.
    #[error("Column {column} not found in table {table}")]
    ColumnNotFound { table: String, column: String },

    /// Invalid schema definition.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// A snapshot version is no longer (or not yet) available.
    #[error("Version {0} is not available")]
    VersionUnavailable(u64),
}

impl Error {
    /// Creates an out of range error.
    pub fn out_of_range(index: usize, size: usize) -> Self {
        Error::OutOfRange { index, size }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation(message.into())
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState(message.into())
    }

    /// Creates an object deleted error.
    pub fn object_deleted(table: impl Into<String>, key: RowKey) -> Self {
        Error::ObjectDeleted {
            table: table.into(),
            key,
        }
    }

    /// Creates a notifier run failure.
    pub fn notifier_run_failed(message: impl Into<String>) -> Self {
        Error::NotifierRunFailed(message.into())
    }

    /// Creates an unsupported operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::UnsupportedOperation(message.into())
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: DataType, got: Option<DataType>) -> Self {
        Error::TypeMismatch { expected, got }
    }

    /// Creates a table not found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Error::TableNotFound { name: name.into() }
    }

    /// Creates a column not found error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema(message.into())
    }
}
