//! Row structure for Vellum.
//!
//! This module defines `RowKey`, the stable identity of a row, and the `Row`
//! struct holding a row's values.

use crate::value::Value;
use core::fmt;

/// Stable identifier of a row.
///
/// A key survives any reordering of its table and is never reused by the
/// store that allocated it, so two snapshots can be compared key by key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey(u64);

impl RowKey {
    /// Creates a key from its raw value.
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A row in a table.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    /// Stable identity of this row.
    key: RowKey,
    /// Values stored in this row, indexed by column position.
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row with the given key and values.
    pub fn new(key: RowKey, values: Vec<Value>) -> Self {
        Self { key, values }
    }

    /// Returns the row key.
    #[inline]
    pub fn key(&self) -> RowKey {
        self.key
    }

    /// Returns a reference to the values.
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Gets a value at the given column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Gets a mutable reference to a value at the given column index.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Value> {
        self.values.get_mut(index)
    }

    /// Sets a value at the given column index.
    pub fn set(&mut self, index: usize, value: Value) -> bool {
        if index < self.values.len() {
            self.values[index] = value;
            true
        } else {
            false
        }
    }

    /// Returns the number of values in this row.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if this row has no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
