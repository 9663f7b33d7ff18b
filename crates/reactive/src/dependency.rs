//! Deciding whether a commit matters to a collection, and which of its rows
//! each callback should see as modified.
//!
//! Unfiltered callbacks see a row as modified when any column of it changed,
//! or any row reachable through its links within the depth limit changed.
//! Callbacks with key paths only see changes along those paths.

use crate::change_set::RowModifications;
use crate::key_path::{KeyPath, KeyPathArray, KeyPathElement};
use hashbrown::HashSet;
use std::collections::{BTreeSet, VecDeque};
use vellum_core::schema::Schema;
use vellum_core::{ColumnId, RowKey, TableId};
use vellum_query::QuerySpec;
use vellum_storage::{Snapshot, TransactionChangeInfo};

/// Default number of link hops followed by the deep checker.
pub const DEFAULT_MAX_LINK_DEPTH: usize = 4;

/// Tables a collection depends on, computed once from the schema.
#[derive(Clone, Debug)]
pub struct DependencyFilter {
    root: TableId,
    /// Tables read by the query itself
    query_tables: HashSet<TableId>,
    /// Tables reachable from the root through at least one forward link,
    /// which includes the root itself when it links back to its own table
    linked_tables: HashSet<TableId>,
    max_depth: usize,
}

impl DependencyFilter {
    /// Builds the filter for `query`.
    pub fn new(schema: &Schema, query: &QuerySpec, max_depth: usize) -> Self {
        let root = query.table();
        Self {
            root,
            query_tables: query.related_tables(schema).into_iter().collect(),
            linked_tables: linked_tables(schema, root, max_depth),
            max_depth,
        }
    }

    /// Returns the root table.
    #[inline]
    pub fn root(&self) -> TableId {
        self.root
    }

    /// Returns true if the query result itself may differ after `info`.
    pub fn affects_query(&self, info: &TransactionChangeInfo) -> bool {
        info.touched_tables().any(|t| self.query_tables.contains(&t))
    }

    /// Returns true if `info` may change the result or the modifications
    /// reported to any of the given callbacks.
    ///
    /// One unfiltered callback widens the check to every reachable table.
    pub fn might_be_affected<'a>(
        &self,
        info: &TransactionChangeInfo,
        callbacks: impl IntoIterator<Item = &'a KeyPathArray>,
    ) -> bool {
        if self.affects_query(info) {
            return true;
        }
        let mut watched: HashSet<TableId> = HashSet::new();
        for key_paths in callbacks {
            if key_paths.is_empty() {
                return info
                    .touched_tables()
                    .any(|t| self.linked_tables.contains(&t));
            }
            watched.extend(key_paths.paths().iter().flat_map(KeyPath::tables));
        }
        info.touched_tables().any(|t| watched.contains(&t))
    }

    /// Creates a checker for one callback's key paths over one run.
    pub fn checker<'a>(
        &'a self,
        snapshot: &'a Snapshot,
        info: &'a TransactionChangeInfo,
        key_paths: &'a KeyPathArray,
    ) -> ModificationChecker<'a> {
        ModificationChecker {
            filter: self,
            schema: snapshot.schema(),
            snapshot,
            info,
            key_paths,
            not_modified: HashSet::new(),
            path: Vec::new(),
            linked_changes: info
                .touched_tables()
                .any(|t| self.linked_tables.contains(&t)),
        }
    }

    /// Collects the modified rows among `keys`.
    pub fn modifications(
        &self,
        snapshot: &Snapshot,
        info: &TransactionChangeInfo,
        key_paths: &KeyPathArray,
        keys: &[RowKey],
    ) -> RowModifications {
        let mut checker = self.checker(snapshot, info, key_paths);
        keys.iter()
            .filter_map(|k| checker.modified(*k).map(|cols| (*k, cols)))
            .collect()
    }
}

/// Breadth-first walk over forward links, at most `max_depth` hops.
fn linked_tables(schema: &Schema, root: TableId, max_depth: usize) -> HashSet<TableId> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([(root, 0usize)]);
    while let Some((table, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        let Some(ts) = schema.table(table) else {
            continue;
        };
        for (_, target) in ts.link_columns() {
            if seen.insert(target) {
                queue.push_back((target, depth + 1));
            }
        }
    }
    seen
}

/// Per-run modification check for one set of key paths.
pub struct ModificationChecker<'a> {
    filter: &'a DependencyFilter,
    schema: &'a Schema,
    snapshot: &'a Snapshot,
    info: &'a TransactionChangeInfo,
    key_paths: &'a KeyPathArray,
    /// Linked rows already found unchanged by a complete search
    not_modified: HashSet<(TableId, RowKey)>,
    /// Rows on the current search path
    path: Vec<PathEntry>,
    linked_changes: bool,
}

/// A row being searched, and whether any search below it was cut short.
struct PathEntry {
    table: TableId,
    key: RowKey,
    incomplete: bool,
}

impl<'a> ModificationChecker<'a> {
    /// Returns the root columns through which `key` was modified, or `None`
    /// if the callback should not see it as modified.
    pub fn modified(&mut self, key: RowKey) -> Option<BTreeSet<ColumnId>> {
        if self.key_paths.is_empty() {
            self.deep_modified(key)
        } else {
            self.path_modified(key)
        }
    }

    fn deep_modified(&mut self, key: RowKey) -> Option<BTreeSet<ColumnId>> {
        let root = self.filter.root;
        let mut columns = self
            .info
            .table(root)
            .and_then(|c| c.modified_columns(key))
            .cloned()
            .unwrap_or_default();

        if self.linked_changes {
            let (snapshot, schema) = (self.snapshot, self.schema);
            if let (Some(row), Some(table)) = (snapshot.get(root, key), schema.table(root)) {
                self.path.push(PathEntry {
                    table: root,
                    key,
                    incomplete: false,
                });
                for (column, target) in table.link_columns() {
                    if columns.contains(&column) {
                        continue;
                    }
                    let links = row.get(column).map(|v| v.links()).unwrap_or(&[]);
                    if links.iter().any(|k| self.linked_row_modified(target, *k, 1)) {
                        columns.insert(column);
                    }
                }
                self.path.clear();
            }
        }

        (!columns.is_empty()).then_some(columns)
    }

    /// Searches `key` and the rows it links to. A row is only remembered as
    /// unmodified when no search below it hit the depth limit or looped back
    /// onto the current path.
    fn linked_row_modified(&mut self, table: TableId, key: RowKey, depth: usize) -> bool {
        if self.info.table(table).map_or(false, |c| c.is_modified(key)) {
            return true;
        }
        if depth >= self.filter.max_depth {
            self.path.iter_mut().for_each(|e| e.incomplete = true);
            return false;
        }
        if self.not_modified.contains(&(table, key)) {
            return false;
        }
        if let Some(pos) = self
            .path
            .iter()
            .position(|e| e.table == table && e.key == key)
        {
            self.path[pos..].iter_mut().for_each(|e| e.incomplete = true);
            return false;
        }

        let (snapshot, schema) = (self.snapshot, self.schema);
        let (Some(row), Some(ts)) = (snapshot.get(table, key), schema.table(table)) else {
            return false;
        };
        self.path.push(PathEntry {
            table,
            key,
            incomplete: false,
        });
        let modified = ts.link_columns().any(|(column, target)| {
            let links = row.get(column).map(|v| v.links()).unwrap_or(&[]);
            links
                .iter()
                .any(|linked| self.linked_row_modified(target, *linked, depth + 1))
        });
        let complete = self.path.pop().map_or(false, |e| !e.incomplete);
        if !modified && complete {
            self.not_modified.insert((table, key));
        }
        modified
    }

    fn path_modified(&mut self, key: RowKey) -> Option<BTreeSet<ColumnId>> {
        let root = self.filter.root;
        let mut columns = BTreeSet::new();
        let mut fired = false;

        for path in self.key_paths.paths() {
            let Some((first, rest)) = path.elements().split_first() else {
                continue;
            };
            match first {
                KeyPathElement::Column { column, .. } => {
                    if self.column_touched(root, key, *column, rest) {
                        columns.insert(*column);
                    }
                }
                KeyPathElement::Wildcard { .. } => {
                    let count = self.schema.table(root).map_or(0, |t| t.column_count());
                    for column in 0..count {
                        if self.column_touched(root, key, column, rest) {
                            columns.insert(column);
                        }
                    }
                }
                KeyPathElement::Backlink {
                    origin_table,
                    origin_column,
                } => {
                    if self.backlink_touched(key, *origin_table, *origin_column, rest) {
                        fired = true;
                    }
                }
            }
        }

        (fired || !columns.is_empty()).then_some(columns)
    }

    fn hop_touched(&self, table: TableId, key: RowKey, hops: &[KeyPathElement]) -> bool {
        let Some((first, rest)) = hops.split_first() else {
            return false;
        };
        match first {
            KeyPathElement::Column { column, .. } => self.column_touched(table, key, *column, rest),
            KeyPathElement::Wildcard { .. } => {
                let count = self.schema.table(table).map_or(0, |t| t.column_count());
                (0..count).any(|c| self.column_touched(table, key, c, rest))
            }
            KeyPathElement::Backlink {
                origin_table,
                origin_column,
            } => self.backlink_touched(key, *origin_table, *origin_column, rest),
        }
    }

    /// A change to a link column counts when the path names that column,
    /// whether or not the path continues past it.
    fn column_touched(
        &self,
        table: TableId,
        key: RowKey,
        column: ColumnId,
        rest: &[KeyPathElement],
    ) -> bool {
        if self
            .info
            .table(table)
            .map_or(false, |c| c.column_modified(key, column))
        {
            return true;
        }
        if rest.is_empty() {
            return false;
        }
        let Some(target) = self
            .schema
            .table(table)
            .and_then(|t| t.column(column))
            .and_then(|c| c.data_type().link_target())
        else {
            return false;
        };
        let Some(value) = self.snapshot.value(table, key, column) else {
            return false;
        };
        value.links().iter().any(|k| self.hop_touched(target, *k, rest))
    }

    /// Fires when a row starts pointing here, or an origin row changes along
    /// the rest of the path.
    fn backlink_touched(
        &self,
        key: RowKey,
        origin_table: TableId,
        origin_column: ColumnId,
        rest: &[KeyPathElement],
    ) -> bool {
        let origin_changes = self.info.table(origin_table);
        self.snapshot
            .backlinks(origin_table, origin_column, key)
            .into_iter()
            .any(|origin| {
                origin_changes.map_or(false, |c| {
                    c.was_inserted(origin) || c.column_modified(origin, origin_column)
                }) || (!rest.is_empty() && self.hop_touched(origin_table, origin, rest))
            })
    }
}
