//! Change tracking for committed transactions.
//!
//! A commit describes what it touched as a `TransactionChangeInfo`: for every
//! table, which rows were inserted, deleted, or had columns modified. Change
//! infos of consecutive commits coalesce the way a journal does, so a notifier
//! that fell behind several commits sees one description of their combined
//! effect.

use hashbrown::HashMap;
use std::collections::{BTreeMap, BTreeSet};
use vellum_core::{ColumnId, RowKey, TableId};

/// Row-level changes of a single table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectChangeSet {
    /// Rows created (and still alive).
    insertions: BTreeSet<RowKey>,
    /// Rows that existed before and were removed.
    deletions: BTreeSet<RowKey>,
    /// Pre-existing rows with modified columns (row → columns).
    modifications: BTreeMap<RowKey, BTreeSet<ColumnId>>,
}

impl ObjectChangeSet {
    /// Creates an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an insertion.
    pub fn insert(&mut self, key: RowKey) {
        // Keys are never reused, so a deleted key cannot come back.
        self.insertions.insert(key);
    }

    /// Records a column modification.
    pub fn modify(&mut self, key: RowKey, column: ColumnId) {
        // A row inserted in this diff stays an insertion
        if self.insertions.contains(&key) {
            return;
        }
        self.modifications.entry(key).or_default().insert(column);
    }

    /// Records a deletion.
    pub fn delete(&mut self, key: RowKey) {
        // Insert then delete cancels out
        if self.insertions.remove(&key) {
            return;
        }
        self.modifications.remove(&key);
        self.deletions.insert(key);
    }

    /// Appends the changes of a later commit.
    pub fn merge(&mut self, later: &ObjectChangeSet) {
        for key in &later.insertions {
            self.insert(*key);
        }
        for (key, columns) in &later.modifications {
            for column in columns {
                self.modify(*key, *column);
            }
        }
        for key in &later.deletions {
            self.delete(*key);
        }
    }

    /// Returns inserted rows.
    #[inline]
    pub fn insertions(&self) -> &BTreeSet<RowKey> {
        &self.insertions
    }

    /// Returns deleted rows.
    #[inline]
    pub fn deletions(&self) -> &BTreeSet<RowKey> {
        &self.deletions
    }

    /// Returns modified rows with their modified columns.
    #[inline]
    pub fn modifications(&self) -> &BTreeMap<RowKey, BTreeSet<ColumnId>> {
        &self.modifications
    }

    /// Returns true if the row was inserted.
    pub fn was_inserted(&self, key: RowKey) -> bool {
        self.insertions.contains(&key)
    }

    /// Returns true if the row was deleted.
    pub fn was_deleted(&self, key: RowKey) -> bool {
        self.deletions.contains(&key)
    }

    /// Returns the modified columns of a row, if any.
    pub fn modified_columns(&self, key: RowKey) -> Option<&BTreeSet<ColumnId>> {
        self.modifications.get(&key)
    }

    /// Returns true if any column of the row was modified.
    pub fn is_modified(&self, key: RowKey) -> bool {
        self.modifications.contains_key(&key)
    }

    /// Returns true if the given column of the row was modified.
    pub fn column_modified(&self, key: RowKey, column: ColumnId) -> bool {
        self.modifications
            .get(&key)
            .map_or(false, |cols| cols.contains(&column))
    }

    /// Returns true if there are no changes.
    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty() && self.deletions.is_empty() && self.modifications.is_empty()
    }
}

/// Changes of one or more consecutive commits, per table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionChangeInfo {
    tables: HashMap<TableId, ObjectChangeSet>,
}

impl TransactionChangeInfo {
    /// Creates an empty change info.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the changes of a table, if it was touched.
    pub fn table(&self, table: TableId) -> Option<&ObjectChangeSet> {
        self.tables.get(&table).filter(|c| !c.is_empty())
    }

    /// Returns the changes of a table for recording, creating them on demand.
    pub fn table_mut(&mut self, table: TableId) -> &mut ObjectChangeSet {
        self.tables.entry(table).or_default()
    }

    /// Returns true if the table has any recorded change.
    pub fn is_touched(&self, table: TableId) -> bool {
        self.table(table).is_some()
    }

    /// Iterates over the touched tables.
    pub fn touched_tables(&self) -> impl Iterator<Item = TableId> + '_ {
        self.tables
            .iter()
            .filter(|(_, c)| !c.is_empty())
            .map(|(t, _)| *t)
    }

    /// Appends the changes of a later commit.
    pub fn merge(&mut self, later: &TransactionChangeInfo) {
        for (table, changes) in &later.tables {
            self.table_mut(*table).merge(changes);
        }
    }

    /// Returns true if no table was touched.
    pub fn is_empty(&self) -> bool {
        self.tables.values().all(|c| c.is_empty())
    }
}
