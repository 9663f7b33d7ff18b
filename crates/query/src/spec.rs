//! Immutable query specifications.

use crate::descriptor::{Descriptor, DistinctDescriptor, SortDescriptor};
use crate::predicate::Predicate;
use vellum_core::schema::Schema;
use vellum_core::{Error, Result, RowKey, TableId};

/// What a live query selects: a table, a predicate and ordering descriptors.
///
/// Every composition method returns a new value; the original is untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct QuerySpec {
    table: TableId,
    predicate: Predicate,
    ordering: Vec<Descriptor>,
}

impl QuerySpec {
    /// Selects every row of `table` in key order.
    pub fn new(table: TableId) -> Self {
        Self {
            table,
            predicate: Predicate::All,
            ordering: Vec::new(),
        }
    }

    /// Selects a single row.
    pub fn object(table: TableId, key: RowKey) -> Self {
        Self {
            table,
            predicate: Predicate::KeyEquals(key),
            ordering: Vec::new(),
        }
    }

    /// Returns the root table.
    #[inline]
    pub fn table(&self) -> TableId {
        self.table
    }

    /// Returns the predicate.
    #[inline]
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Returns the descriptors in application order.
    #[inline]
    pub fn ordering(&self) -> &[Descriptor] {
        &self.ordering
    }

    /// Returns the observed key if this query selects a single object.
    pub fn object_key(&self) -> Option<RowKey> {
        match self.predicate {
            Predicate::KeyEquals(key) => Some(key),
            _ => None,
        }
    }

    /// Returns true if a limit has been applied.
    pub fn has_limit(&self) -> bool {
        self.ordering.iter().any(|d| matches!(d, Descriptor::Limit(_)))
    }

    /// Returns true if results come back in table (key) order.
    pub fn is_in_table_order(&self) -> bool {
        !self.ordering.iter().any(|d| matches!(d, Descriptor::Sort(_)))
    }

    /// Narrows the query with an additional predicate.
    ///
    /// Filtering is applied before every descriptor, which would change the
    /// meaning of an existing limit, so it is rejected once one is present.
    pub fn filter(&self, predicate: Predicate) -> Result<Self> {
        if self.has_limit() {
            return Err(Error::unsupported(
                "Filtering a collection with a limit is not yet implemented",
            ));
        }
        let mut next = self.clone();
        next.predicate = std::mem::take(&mut next.predicate).and(predicate);
        Ok(next)
    }

    /// Appends a sort.
    pub fn sort(&self, sort: SortDescriptor) -> Self {
        self.with(Descriptor::Sort(sort))
    }

    /// Appends a distinct.
    pub fn distinct(&self, distinct: DistinctDescriptor) -> Self {
        self.with(Descriptor::Distinct(distinct))
    }

    /// Appends a limit.
    pub fn limit(&self, n: usize) -> Self {
        self.with(Descriptor::Limit(n))
    }

    fn with(&self, descriptor: Descriptor) -> Self {
        let mut next = self.clone();
        next.ordering.push(descriptor);
        next
    }

    /// Returns every table the query reads: the root table plus the targets
    /// of links followed by the predicate or any descriptor.
    pub fn related_tables(&self, schema: &Schema) -> Vec<TableId> {
        let mut tables = self.predicate.tables(schema, self.table);
        for descriptor in &self.ordering {
            for path in descriptor.paths() {
                tables.extend(path.tables(schema, self.table));
            }
        }
        tables.sort_unstable();
        tables.dedup();
        tables
    }
}
