//! Ordering descriptors: sort, distinct and limit.
//!
//! Descriptors are applied after the predicate, in the order they were added
//! to the query, so `distinct` then `sort` and `sort` then `distinct` can pick
//! different representatives for the same group.

use crate::path::ColumnPath;
use std::cmp::Ordering;
use vellum_core::{Row, TableId, Value};
use vellum_storage::Snapshot;

/// Sort order for a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Sort keys, most significant first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortDescriptor {
    keys: Vec<(ColumnPath, SortOrder)>,
}

impl SortDescriptor {
    /// Creates a descriptor from `(path, order)` pairs.
    pub fn new(keys: Vec<(ColumnPath, SortOrder)>) -> Self {
        Self { keys }
    }

    /// Sorts ascending by one path.
    pub fn asc(path: impl Into<ColumnPath>) -> Self {
        Self::new(vec![(path.into(), SortOrder::Asc)])
    }

    /// Sorts descending by one path.
    pub fn desc(path: impl Into<ColumnPath>) -> Self {
        Self::new(vec![(path.into(), SortOrder::Desc)])
    }

    /// Adds a less significant key.
    pub fn then(mut self, path: impl Into<ColumnPath>, order: SortOrder) -> Self {
        self.keys.push((path.into(), order));
        self
    }

    /// Returns the keys.
    #[inline]
    pub fn keys(&self) -> &[(ColumnPath, SortOrder)] {
        &self.keys
    }

    /// Resolves a row's sort values.
    pub(crate) fn sort_values(&self, snapshot: &Snapshot, table: TableId, row: &Row) -> Vec<Value> {
        self.keys
            .iter()
            .map(|(path, _)| path.resolve_first(snapshot, table, row))
            .collect()
    }

    /// Compares two rows' resolved sort values.
    pub(crate) fn compare(&self, a: &[Value], b: &[Value]) -> Ordering {
        for ((_, order), (av, bv)) in self.keys.iter().zip(a.iter().zip(b.iter())) {
            let cmp = av.cmp(bv);
            if cmp != Ordering::Equal {
                return match order {
                    SortOrder::Asc => cmp,
                    SortOrder::Desc => cmp.reverse(),
                };
            }
        }
        Ordering::Equal
    }
}

/// Keeps the first row of every group of rows with equal key values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistinctDescriptor {
    keys: Vec<ColumnPath>,
}

impl DistinctDescriptor {
    /// Creates a descriptor from key paths.
    pub fn new(keys: Vec<ColumnPath>) -> Self {
        Self { keys }
    }

    /// Distinct on a single path.
    pub fn on(path: impl Into<ColumnPath>) -> Self {
        Self::new(vec![path.into()])
    }

    /// Returns the key paths.
    #[inline]
    pub fn keys(&self) -> &[ColumnPath] {
        &self.keys
    }

    /// Resolves a row's group identity.
    pub(crate) fn group_values(&self, snapshot: &Snapshot, table: TableId, row: &Row) -> Vec<Vec<Value>> {
        self.keys
            .iter()
            .map(|path| path.resolve(snapshot, table, row))
            .collect()
    }
}

/// One ordering step of a query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Descriptor {
    Sort(SortDescriptor),
    Distinct(DistinctDescriptor),
    Limit(usize),
}

impl Descriptor {
    /// Returns the paths this descriptor reads.
    pub fn paths(&self) -> Vec<&ColumnPath> {
        match self {
            Descriptor::Sort(sort) => sort.keys().iter().map(|(p, _)| p).collect(),
            Descriptor::Distinct(distinct) => distinct.keys().iter().collect(),
            Descriptor::Limit(_) => Vec::new(),
        }
    }
}
