//! Change set for tracking query result changes.
//!
//! A `ChangeSet` describes how one view of a query relates to the next by
//! position: deletions and modifications index into the old view, insertions
//! and `modifications_new` index into the new view, so that
//! `old_len - deletions.len() + insertions.len() == new_len` always holds.

use hashbrown::HashMap;
use std::collections::{BTreeMap, BTreeSet};
use vellum_core::{ColumnId, RowKey};

/// Modified rows and the root columns through which each was modified.
///
/// An empty column set means the row changed without a single column to
/// blame (for example through a backlink).
pub type RowModifications = HashMap<RowKey, BTreeSet<ColumnId>>;

/// A sorted set of view positions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct IndexSet {
    indices: BTreeSet<usize>,
}

impl IndexSet {
    /// Creates an empty set.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a position.
    #[inline]
    pub fn insert(&mut self, index: usize) -> bool {
        self.indices.insert(index)
    }

    /// Returns true if the position is in the set.
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    /// Returns the number of positions.
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Returns true if the set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Iterates over positions in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    /// Returns the positions as a vector.
    pub fn to_vec(&self) -> Vec<usize> {
        self.iter().collect()
    }
}

impl FromIterator<usize> for IndexSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self {
            indices: iter.into_iter().collect(),
        }
    }
}

impl Extend<usize> for IndexSet {
    fn extend<I: IntoIterator<Item = usize>>(&mut self, iter: I) {
        self.indices.extend(iter)
    }
}

/// A row that changed position, reported by ordered (sorted) collections.
///
/// `from` is also listed in `deletions` and `to` in `insertions`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Move {
    pub from: usize,
    pub to: usize,
}

/// Positional changes between two views of a query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Positions in the new view of rows that were not in the old view
    pub insertions: IndexSet,
    /// Positions in the old view of rows that are not in the new view
    pub deletions: IndexSet,
    /// Positions in the old view of modified rows
    pub modifications: IndexSet,
    /// Positions in the new view of the same modified rows
    pub modifications_new: IndexSet,
    /// Rows that moved, for collections computing ordered moves
    pub moves: Vec<Move>,
    /// Old positions of modified rows, per root column
    pub columns: BTreeMap<ColumnId, IndexSet>,
    /// Size of the old view
    pub old_len: usize,
    /// Size of the new view
    pub new_len: usize,
}

impl ChangeSet {
    /// Creates a new empty change set.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the empty change set describing a view of `len` rows that did
    /// not change; used for initial deliveries.
    pub fn unchanged(len: usize) -> Self {
        Self {
            old_len: len,
            new_len: len,
            ..Self::default()
        }
    }

    /// Returns true if there are no changes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty()
            && self.deletions.is_empty()
            && self.modifications.is_empty()
            && self.moves.is_empty()
    }

    /// Returns the old positions of rows modified in `column`.
    pub fn column_modifications(&self, column: ColumnId) -> Option<&IndexSet> {
        self.columns.get(&column)
    }

    /// Computes the change set between two views.
    ///
    /// Rows are matched by key. Among matched rows, the largest set that kept
    /// its relative order survives in place, preferring rows that were not
    /// modified; every other matched row is reported as a deletion plus an
    /// insertion, and also as a `Move` when `ordered_moves` is set. Surviving
    /// rows present in `modified` are reported as modifications.
    pub fn calculate(
        old_keys: &[RowKey],
        new_keys: &[RowKey],
        modified: &RowModifications,
        ordered_moves: bool,
    ) -> Self {
        let mut changes = ChangeSet {
            old_len: old_keys.len(),
            new_len: new_keys.len(),
            ..ChangeSet::default()
        };

        let old_positions: HashMap<RowKey, usize> =
            old_keys.iter().enumerate().map(|(i, k)| (*k, i)).collect();

        // (old index, new index, key) of matched rows, in new order
        let mut matched = Vec::new();
        for (new_index, key) in new_keys.iter().enumerate() {
            match old_positions.get(key) {
                Some(old_index) => matched.push((*old_index, new_index, *key)),
                None => {
                    changes.insertions.insert(new_index);
                }
            }
        }

        let mut consumed = vec![false; old_keys.len()];
        for (old_index, _, _) in &matched {
            consumed[*old_index] = true;
        }
        changes.deletions.extend(
            consumed
                .iter()
                .enumerate()
                .filter(|(_, used)| !**used)
                .map(|(i, _)| i),
        );

        let survivors = stable_rows(&matched, modified, old_keys.len());
        for (i, (old_index, new_index, key)) in matched.iter().enumerate() {
            if survivors[i] {
                if let Some(columns) = modified.get(key) {
                    changes.modifications.insert(*old_index);
                    changes.modifications_new.insert(*new_index);
                    for column in columns {
                        changes.columns.entry(*column).or_default().insert(*old_index);
                    }
                }
            } else {
                changes.deletions.insert(*old_index);
                changes.insertions.insert(*new_index);
                if ordered_moves {
                    changes.moves.push(Move {
                        from: *old_index,
                        to: *new_index,
                    });
                }
            }
        }

        changes
    }
}

/// Marks the matched rows that keep their relative order.
///
/// This is a maximum-weight increasing subsequence over old indices taken in
/// new order. Unmodified rows weigh more than all modified rows together, so
/// a modified row is the one reported as moved whenever that is enough.
fn stable_rows(
    matched: &[(usize, usize, RowKey)],
    modified: &RowModifications,
    old_len: usize,
) -> Vec<bool> {
    let heavy = matched.len() + 1;
    let mut tree = MaxTree::new(old_len);
    let mut predecessor = vec![None; matched.len()];
    let mut best_end: Option<(usize, usize)> = None;

    for (i, (old_index, _, key)) in matched.iter().enumerate() {
        let weight = if modified.contains_key(key) { 1 } else { heavy };
        let (prefix, pred) = tree.query(*old_index);
        let total = prefix + weight;
        predecessor[i] = pred;
        tree.update(*old_index, total, i);
        if best_end.map_or(true, |(best, _)| total > best) {
            best_end = Some((total, i));
        }
    }

    let mut survivors = vec![false; matched.len()];
    let mut cursor = best_end.map(|(_, i)| i);
    while let Some(i) = cursor {
        survivors[i] = true;
        cursor = predecessor[i];
    }
    survivors
}

/// Fenwick tree of prefix maxima, each value tagged with the element that
/// produced it.
struct MaxTree {
    nodes: Vec<(usize, Option<usize>)>,
}

impl MaxTree {
    fn new(len: usize) -> Self {
        Self {
            nodes: vec![(0, None); len + 1],
        }
    }

    /// Best value among positions `< end`.
    fn query(&self, end: usize) -> (usize, Option<usize>) {
        let mut best = (0, None);
        let mut i = end;
        while i > 0 {
            if self.nodes[i].0 > best.0 {
                best = self.nodes[i];
            }
            i &= i - 1;
        }
        best
    }

    fn update(&mut self, position: usize, value: usize, element: usize) {
        let mut i = position + 1;
        while i < self.nodes.len() {
            if value > self.nodes[i].0 {
                self.nodes[i] = (value, Some(element));
            }
            i += i & i.wrapping_neg();
        }
    }
}
