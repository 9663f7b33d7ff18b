//! Predicate definitions for query filtering.

use crate::path::ColumnPath;
use vellum_core::schema::Schema;
use vellum_core::{Row, RowKey, TableId, Value};
use vellum_storage::Snapshot;

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Substring match on strings.
    Contains,
}

impl CompareOp {
    /// Evaluates `left op right`.
    ///
    /// Ordering comparisons never match null on either side.
    pub fn matches(&self, left: &Value, right: &Value) -> bool {
        match self {
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
            _ if left.is_null() || right.is_null() => false,
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Gt => left > right,
            CompareOp::Ge => left >= right,
            CompareOp::Contains => match (left.as_str(), right.as_str()) {
                (Some(l), Some(r)) => l.contains(r),
                _ => false,
            },
        }
    }
}

/// A row filter.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Matches every row.
    All,
    /// Compares the value(s) reached by a path with a literal.
    /// Through a link list the comparison matches if any value does.
    Compare {
        path: ColumnPath,
        op: CompareOp,
        value: Value,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// Matches exactly one row.
    KeyEquals(RowKey),
}

impl Predicate {
    pub fn compare(path: impl Into<ColumnPath>, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            path: path.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(path: impl Into<ColumnPath>, value: impl Into<Value>) -> Self {
        Self::compare(path, CompareOp::Eq, value)
    }

    pub fn ne(path: impl Into<ColumnPath>, value: impl Into<Value>) -> Self {
        Self::compare(path, CompareOp::Ne, value)
    }

    pub fn lt(path: impl Into<ColumnPath>, value: impl Into<Value>) -> Self {
        Self::compare(path, CompareOp::Lt, value)
    }

    pub fn le(path: impl Into<ColumnPath>, value: impl Into<Value>) -> Self {
        Self::compare(path, CompareOp::Le, value)
    }

    pub fn gt(path: impl Into<ColumnPath>, value: impl Into<Value>) -> Self {
        Self::compare(path, CompareOp::Gt, value)
    }

    pub fn ge(path: impl Into<ColumnPath>, value: impl Into<Value>) -> Self {
        Self::compare(path, CompareOp::Ge, value)
    }

    /// Conjunction of `self` and `other`, flattening nested `And`s and `All`.
    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::All, p) | (p, Predicate::All) => p,
            (Predicate::And(mut a), Predicate::And(b)) => {
                a.extend(b);
                Predicate::And(a)
            }
            (Predicate::And(mut a), p) => {
                a.push(p);
                Predicate::And(a)
            }
            (p, q) => Predicate::And(vec![p, q]),
        }
    }

    /// Disjunction of `self` and `other`.
    pub fn or(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::Or(mut a), p) => {
                a.push(p);
                Predicate::Or(a)
            }
            (p, q) => Predicate::Or(vec![p, q]),
        }
    }

    /// Negation.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Evaluates the predicate against a row of `table`.
    pub fn eval(&self, snapshot: &Snapshot, table: TableId, row: &Row) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Compare { path, op, value } => path
                .resolve(snapshot, table, row)
                .iter()
                .any(|v| op.matches(v, value)),
            Predicate::And(ps) => ps.iter().all(|p| p.eval(snapshot, table, row)),
            Predicate::Or(ps) => ps.iter().any(|p| p.eval(snapshot, table, row)),
            Predicate::Not(p) => !p.eval(snapshot, table, row),
            Predicate::KeyEquals(key) => row.key() == *key,
        }
    }

    /// Collects the column paths this predicate reads.
    pub fn paths(&self) -> Vec<&ColumnPath> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a ColumnPath>) {
        match self {
            Predicate::Compare { path, .. } => out.push(path),
            Predicate::And(ps) | Predicate::Or(ps) => {
                for p in ps {
                    p.collect_paths(out);
                }
            }
            Predicate::Not(p) => p.collect_paths(out),
            Predicate::All | Predicate::KeyEquals(_) => {}
        }
    }

    /// Returns every table read by this predicate, starting at `root`.
    pub fn tables(&self, schema: &Schema, root: TableId) -> Vec<TableId> {
        let mut tables = vec![root];
        for path in self.paths() {
            tables.extend(path.tables(schema, root));
        }
        tables.sort_unstable();
        tables.dedup();
        tables
    }
}

impl Default for Predicate {
    fn default() -> Self {
        Predicate::All
    }
}
