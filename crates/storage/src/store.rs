//! The versioned in-memory store.
//!
//! Every commit publishes a new immutable `Snapshot` under the next
//! `VersionId` and appends its `TransactionChangeInfo` to the history, so a
//! reader pinned at an older version can ask what changed since.

use crate::change_info::TransactionChangeInfo;
use crate::fail_point::{FailPoint, FailPoints};
use crate::snapshot::{Snapshot, TableData};
use crate::transaction::WriteTransaction;
use crate::version::VersionId;
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use vellum_core::schema::Schema;
use vellum_core::{Error, Result, RowKey};

/// First version of every store: all tables empty.
pub const INITIAL_VERSION: VersionId = VersionId::new(1);

struct StoreState {
    latest: Snapshot,
    /// Snapshots that can still be opened, by version.
    retained: BTreeMap<VersionId, Snapshot>,
    /// Change info of the commit that produced each version.
    history: BTreeMap<VersionId, Arc<TransactionChangeInfo>>,
    /// Oldest version that can be opened or diffed from.
    oldest: VersionId,
}

/// A multi-version store of tables.
pub struct VersionedStore {
    schema: Arc<Schema>,
    state: Mutex<StoreState>,
    writer_active: Mutex<bool>,
    writer_released: Condvar,
    next_key: AtomicU64,
    fail_points: FailPoints,
}

impl VersionedStore {
    /// Creates an empty store for the given schema.
    pub fn new(schema: Schema) -> Arc<Self> {
        let schema = Arc::new(schema);
        let initial = Snapshot::empty(INITIAL_VERSION, schema.clone());
        let mut retained = BTreeMap::new();
        retained.insert(INITIAL_VERSION, initial.clone());
        Arc::new(Self {
            schema,
            state: Mutex::new(StoreState {
                latest: initial,
                retained,
                history: BTreeMap::new(),
                oldest: INITIAL_VERSION,
            }),
            writer_active: Mutex::new(false),
            writer_released: Condvar::new(),
            next_key: AtomicU64::new(1),
            fail_points: FailPoints::new(),
        })
    }

    /// Returns the schema.
    #[inline]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the fail points of this store.
    #[inline]
    pub fn fail_points(&self) -> &FailPoints {
        &self.fail_points
    }

    /// Returns the newest committed version.
    pub fn current_version(&self) -> VersionId {
        self.state.lock().latest.version()
    }

    /// Returns the oldest version that can still be opened.
    pub fn oldest_version(&self) -> VersionId {
        self.state.lock().oldest
    }

    /// Returns the newest committed snapshot.
    pub fn latest(&self) -> Snapshot {
        self.state.lock().latest.clone()
    }

    /// Opens a read view pinned to `version`.
    pub fn open_at(&self, version: VersionId) -> Result<Snapshot> {
        if self.fail_points.trigger(FailPoint::OpenSnapshot) {
            return Err(Error::invalid_state(format!(
                "could not open a read transaction at {}",
                version
            )));
        }
        let state = self.state.lock();
        state
            .retained
            .get(&version)
            .cloned()
            .ok_or(Error::VersionUnavailable(version.value()))
    }

    /// Starts a write transaction, waiting while another one is open.
    pub fn begin_write(self: &Arc<Self>) -> WriteTransaction {
        let mut active = self.writer_active.lock();
        while *active {
            self.writer_released.wait(&mut active);
        }
        *active = true;
        drop(active);
        WriteTransaction::new(self.clone(), self.latest())
    }

    /// Returns true if a write transaction is open.
    pub fn is_write_active(&self) -> bool {
        *self.writer_active.lock()
    }

    /// Collapses the changes of every commit in `(from, to]`.
    pub fn changes_between(&self, from: VersionId, to: VersionId) -> Result<TransactionChangeInfo> {
        let state = self.state.lock();
        if from < state.oldest {
            return Err(Error::VersionUnavailable(from.value()));
        }
        if to > state.latest.version() {
            return Err(Error::VersionUnavailable(to.value()));
        }
        let mut info = TransactionChangeInfo::new();
        if from < to {
            for changes in state.history.range(from.next()..=to).map(|(_, c)| c) {
                info.merge(changes);
            }
        }
        Ok(info)
    }

    /// Drops snapshots and history older than `version`.
    ///
    /// The latest version is always kept.
    pub fn release_history_before(&self, version: VersionId) {
        let mut state = self.state.lock();
        let version = version.min(state.latest.version());
        if version <= state.oldest {
            return;
        }
        state.retained = state.retained.split_off(&version);
        state.history = state.history.split_off(&version.next());
        state.oldest = version;
        log::trace!("released history before {}", version);
    }

    pub(crate) fn allocate_key(&self) -> RowKey {
        RowKey::new(self.next_key.fetch_add(1, Ordering::Relaxed))
    }

    /// Publishes the tables of a committed write as the next version.
    pub(crate) fn publish(
        &self,
        tables: Vec<Arc<TableData>>,
        changes: TransactionChangeInfo,
    ) -> (VersionId, Arc<TransactionChangeInfo>) {
        let mut state = self.state.lock();
        let version = state.latest.version().next();
        let snapshot = Snapshot::new(version, self.schema.clone(), tables);
        let changes = Arc::new(changes);
        state.latest = snapshot.clone();
        state.retained.insert(version, snapshot);
        state.history.insert(version, changes.clone());
        log::trace!("committed {}", version);
        (version, changes)
    }

    pub(crate) fn release_writer(&self) {
        *self.writer_active.lock() = false;
        self.writer_released.notify_one();
    }
}
