//! Query evaluation against a snapshot.

use crate::descriptor::Descriptor;
use crate::spec::QuerySpec;
use crate::view::View;
use hashbrown::HashSet;
use vellum_core::{Result, Row, Value};
use vellum_storage::Snapshot;

/// Turns a query into the ordered keys it matches at one snapshot.
pub trait QueryEvaluator: Send + Sync {
    /// Evaluates `query` against `snapshot`.
    fn evaluate(&self, query: &QuerySpec, snapshot: &Snapshot) -> Result<View>;
}

/// Scans the root table in key order, filters, then applies each descriptor.
///
/// A query over a table missing from the snapshot evaluates to an empty view.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScanEvaluator;

impl ScanEvaluator {
    /// Creates a new scan evaluator.
    pub fn new() -> Self {
        Self
    }
}

impl QueryEvaluator for ScanEvaluator {
    fn evaluate(&self, query: &QuerySpec, snapshot: &Snapshot) -> Result<View> {
        let table = query.table();
        let predicate = query.predicate();

        let mut rows: Vec<&Row> = match query.object_key() {
            Some(key) => snapshot.get(table, key).into_iter().collect(),
            None => snapshot
                .rows(table)
                .filter(|row| predicate.eval(snapshot, table, row))
                .collect(),
        };

        for descriptor in query.ordering() {
            match descriptor {
                Descriptor::Sort(sort) => {
                    let mut keyed: Vec<(Vec<Value>, &Row)> = rows
                        .into_iter()
                        .map(|row| (sort.sort_values(snapshot, table, row), row))
                        .collect();
                    // Stable, so an earlier ordering breaks ties.
                    keyed.sort_by(|a, b| sort.compare(&a.0, &b.0));
                    rows = keyed.into_iter().map(|(_, row)| row).collect();
                }
                Descriptor::Distinct(distinct) => {
                    let mut seen = HashSet::new();
                    rows.retain(|row| seen.insert(distinct.group_values(snapshot, table, row)));
                }
                Descriptor::Limit(n) => rows.truncate(*n),
            }
        }

        let view = View::new(snapshot.version(), rows.iter().map(|r| r.key()).collect());
        log::trace!(
            "evaluated query on table {} at {}: {} rows",
            table,
            snapshot.version(),
            view.len()
        );
        Ok(view)
    }
}
