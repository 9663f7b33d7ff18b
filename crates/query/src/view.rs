//! Query results at one version.

use hashbrown::HashMap;
use vellum_core::RowKey;
use vellum_storage::VersionId;

/// Ordered row keys matching a query at a specific version.
///
/// A view is never mutated after creation; a re-run produces a new one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct View {
    version: VersionId,
    keys: Vec<RowKey>,
}

impl View {
    /// Creates a view.
    pub fn new(version: VersionId, keys: Vec<RowKey>) -> Self {
        Self { version, keys }
    }

    /// Creates an empty view.
    pub fn empty(version: VersionId) -> Self {
        Self::new(version, Vec::new())
    }

    /// Returns the version this view was evaluated at.
    #[inline]
    pub fn version(&self) -> VersionId {
        self.version
    }

    /// Returns the keys in result order.
    #[inline]
    pub fn keys(&self) -> &[RowKey] {
        &self.keys
    }

    /// Returns the number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if no row matched.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Gets the key at a position.
    pub fn get(&self, index: usize) -> Option<RowKey> {
        self.keys.get(index).copied()
    }

    /// Finds the position of a key.
    pub fn index_of(&self, key: RowKey) -> Option<usize> {
        self.keys.iter().position(|k| *k == key)
    }

    /// Builds a key to position map.
    pub fn positions(&self) -> HashMap<RowKey, usize> {
        self.keys.iter().enumerate().map(|(i, k)| (*k, i)).collect()
    }
}
