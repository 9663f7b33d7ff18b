//! Thread-confined sessions.
//!
//! A `Session` is the owning-thread view of a store: it pins a read version,
//! runs write transactions, and delivers notifier results to its collections'
//! callbacks. Sessions are `Rc`-based and cannot leave their thread; the
//! coordinator reaches them only by posting tasks to their scheduler.

use crate::arena::NotifierHandle;
use crate::collection::{Collection, CollectionInner, ObjectRef};
use crate::coordinator::Coordinator;
use crate::notifier::{Delivery, Package};
use crate::scheduler::Scheduler;
use hashbrown::HashMap;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use vellum_core::schema::Schema;
use vellum_core::{Error, Result, RowKey};
use vellum_query::QuerySpec;
use vellum_storage::{Snapshot, VersionId, WriteTransaction};

/// Identifies a session within the process.
pub type SessionId = u64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static SESSIONS: RefCell<HashMap<SessionId, Weak<SessionInner>>> = RefCell::new(HashMap::new());
}

/// Runs a delivery for a session of the current thread; posted by the
/// coordinator after each batch.
pub(crate) fn deliver_posted(id: SessionId) {
    let inner = SESSIONS.with(|sessions| sessions.borrow().get(&id).and_then(Weak::upgrade));
    if let Some(inner) = inner {
        Session { inner }.notify();
    }
}

/// Session configuration.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Advance to the newest ready version whenever notified. When off, only
    /// results for the current version are delivered until `refresh`.
    pub auto_refresh: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { auto_refresh: true }
    }
}

pub(crate) struct SessionInner {
    id: SessionId,
    coordinator: Arc<Coordinator>,
    config: SessionConfig,
    read: RefCell<Snapshot>,
    write: RefCell<Option<WriteTransaction>>,
    /// Number of deliveries on the stack
    delivering: Cell<usize>,
    collections: RefCell<HashMap<NotifierHandle, Weak<CollectionInner>>>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.coordinator.unregister_session(self.id);
        let id = self.id;
        let _ = SESSIONS.try_with(|sessions| {
            if let Ok(mut sessions) = sessions.try_borrow_mut() {
                sessions.remove(&id);
            }
        });
        log::debug!("closed session {}", id);
    }
}

struct DeliveryGuard<'a>(&'a Cell<usize>);

impl<'a> DeliveryGuard<'a> {
    fn enter(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        Self(depth)
    }
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

/// A thread-confined handle to a store.
#[derive(Clone)]
pub struct Session {
    inner: Rc<SessionInner>,
}

impl Session {
    /// Opens a session on the current thread.
    pub fn open(
        coordinator: &Arc<Coordinator>,
        scheduler: Arc<dyn Scheduler>,
        config: SessionConfig,
    ) -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        coordinator.register_session(id, scheduler);
        let inner = Rc::new(SessionInner {
            id,
            coordinator: coordinator.clone(),
            config,
            read: RefCell::new(coordinator.store().latest()),
            write: RefCell::new(None),
            delivering: Cell::new(0),
            collections: RefCell::new(HashMap::new()),
        });
        SESSIONS.with(|sessions| sessions.borrow_mut().insert(id, Rc::downgrade(&inner)));
        log::debug!("opened session {} on {}", id, coordinator.path());
        Self { inner }
    }

    /// Returns the session id.
    #[inline]
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// Returns the coordinator.
    #[inline]
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.inner.coordinator
    }

    /// Returns the configuration.
    #[inline]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Returns the schema.
    pub fn schema(&self) -> &Arc<Schema> {
        self.inner.coordinator.schema()
    }

    /// Returns the version reads currently see.
    pub fn read_version(&self) -> VersionId {
        self.inner.read.borrow().version()
    }

    /// Returns true inside a write transaction.
    pub fn is_in_write(&self) -> bool {
        // Mutably borrowed only while a transaction closure runs.
        self.inner.write.try_borrow().map_or(true, |w| w.is_some())
    }

    /// Returns true while callbacks are being invoked.
    pub fn is_delivering(&self) -> bool {
        self.inner.delivering.get() > 0
    }

    /// Returns the base version of the open write transaction.
    pub(crate) fn write_base_version(&self) -> Option<VersionId> {
        self.inner
            .write
            .try_borrow()
            .ok()
            .and_then(|w| w.as_ref().map(|tx| tx.base_version()))
    }

    /// Returns what reads see: the write's uncommitted state inside a write,
    /// the pinned read version otherwise.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let write = self
            .inner
            .write
            .try_borrow()
            .map_err(|_| Error::invalid_state("The write transaction is in use"))?;
        Ok(match write.as_ref() {
            Some(tx) => tx.snapshot(),
            None => self.inner.read.borrow().clone(),
        })
    }

    /// Starts a write transaction at the latest version.
    ///
    /// Results that are already ready are delivered first; this may run
    /// callbacks. Outside a delivery this also waits for the first run of any
    /// notifier that has not produced results yet.
    pub fn begin_write(&self) -> Result<()> {
        if self.is_in_write() {
            return Err(Error::invalid_state(
                "The session is already in a write transaction",
            ));
        }
        if !self.is_delivering() {
            self.inner.coordinator.wait_for_first_runs(self.id());
        }
        self.deliver(true);
        if self.is_in_write() {
            return Err(Error::invalid_state(
                "A notification callback left a write transaction open",
            ));
        }

        let tx = self.inner.coordinator.store().begin_write();
        *self.inner.read.borrow_mut() = tx.snapshot();
        log::trace!("session {} began write on {}", self.id(), tx.base_version());
        *self.inner.write.borrow_mut() = Some(tx);
        Ok(())
    }

    /// Runs `f` against the open write transaction.
    ///
    /// Collections must not be read from inside `f`.
    pub fn with_transaction<T>(&self, f: impl FnOnce(&mut WriteTransaction) -> Result<T>) -> Result<T> {
        let mut write = self
            .inner
            .write
            .try_borrow_mut()
            .map_err(|_| Error::invalid_state("The write transaction is in use"))?;
        let tx = write
            .as_mut()
            .ok_or_else(|| Error::invalid_state("The session is not in a write transaction"))?;
        f(tx)
    }

    /// Commits the open write transaction and returns the new version.
    ///
    /// Inside a delivery, notifiers are run at once and whatever became
    /// ready is delivered before returning.
    pub fn commit_write(&self) -> Result<VersionId> {
        let tx = self.take_write()?;
        let (version, _) = tx.commit()?;
        *self.inner.read.borrow_mut() = self.inner.coordinator.store().latest();
        log::debug!("session {} committed {}", self.id(), version);
        self.inner.coordinator.on_commit(version);

        if self.is_delivering() {
            self.inner.coordinator.run_async_notifiers();
            self.deliver(false);
        }
        Ok(version)
    }

    /// Discards the open write transaction.
    pub fn cancel_write(&self) -> Result<()> {
        let tx = self.take_write()?;
        let skipped = tx.base_version().next();
        for (_, notifier) in self.inner.coordinator.session_notifiers(self.id()) {
            notifier.clear_skip(skipped);
        }
        *self.inner.read.borrow_mut() = self.inner.coordinator.store().latest();
        tx.rollback()
    }

    fn take_write(&self) -> Result<WriteTransaction> {
        self.inner
            .write
            .try_borrow_mut()
            .map_err(|_| Error::invalid_state("The write transaction is in use"))?
            .take()
            .ok_or_else(|| Error::invalid_state("The session is not in a write transaction"))
    }

    /// Runs `f` in a write transaction and commits it, or cancels it if `f`
    /// fails.
    pub fn write<T>(&self, f: impl FnOnce(&mut WriteTransaction) -> Result<T>) -> Result<T> {
        self.begin_write()?;
        match self.with_transaction(f) {
            Ok(value) => {
                self.commit_write()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(cancel) = self.cancel_write() {
                    log::warn!("could not cancel failed write: {}", cancel);
                }
                Err(e)
            }
        }
    }

    /// Advances to the newest ready version and delivers, first waiting for
    /// notifiers that have never run. Returns true if the version advanced.
    ///
    /// Does nothing inside a write or a delivery.
    pub fn refresh(&self) -> bool {
        if self.is_in_write() || self.is_delivering() {
            return false;
        }
        self.inner.coordinator.wait_for_first_runs(self.id());
        self.deliver(true)
    }

    /// Delivers whatever is ready without blocking, advancing first when
    /// `auto_refresh` is on.
    ///
    /// Does nothing inside a write or a delivery.
    pub fn notify(&self) {
        if self.is_in_write() || self.is_delivering() {
            return;
        }
        self.deliver(self.inner.config.auto_refresh);
    }

    /// Returns a live collection for `query`.
    pub fn collection(&self, query: QuerySpec) -> Collection {
        Collection::new(self.clone(), query)
    }

    /// Returns a live collection over every row of a table.
    pub fn table(&self, name: &str) -> Result<Collection> {
        let table = self.schema().table_id(name)?;
        Ok(self.collection(QuerySpec::new(table)))
    }

    /// Returns a handle to one row.
    pub fn object(&self, table: &str, key: RowKey) -> Result<ObjectRef> {
        let table_id = self.schema().table_id(table)?;
        if !self.snapshot()?.contains(table_id, key) {
            return Err(Error::object_deleted(table, key));
        }
        Ok(ObjectRef::new(
            self.collection(QuerySpec::object(table_id, key)),
            key,
        ))
    }

    pub(crate) fn track(&self, handle: NotifierHandle, collection: Weak<CollectionInner>) {
        self.inner.collections.borrow_mut().insert(handle, collection);
    }

    pub(crate) fn untrack(&self, handle: NotifierHandle) {
        self.inner.collections.borrow_mut().remove(&handle);
    }

    /// Returns the snapshot to advance to, if it is newer than the read
    /// version: where notifier results are ready, or the latest version when
    /// nothing is being observed.
    fn next_snapshot(&self) -> Option<Snapshot> {
        let observing = !self.inner.collections.borrow().is_empty();
        let next = if observing {
            self.inner.coordinator.ready_snapshot()
        } else {
            self.inner.coordinator.store().latest()
        };
        (next.version() > self.read_version()).then_some(next)
    }

    /// Optionally advances the read version, hands ready results to
    /// collections and invokes their callbacks. Returns true if the version
    /// advanced.
    ///
    /// `before` callbacks run while reads still see the old version.
    fn deliver(&self, advance: bool) -> bool {
        let next = if advance { self.next_snapshot() } else { None };
        let target = next.as_ref().map_or_else(|| self.read_version(), Snapshot::version);

        let notifiers = self.inner.coordinator.session_notifiers(self.id());
        let packages: Vec<(Rc<CollectionInner>, Package)> = notifiers
            .into_iter()
            .filter_map(|(handle, notifier)| {
                let collection = self
                    .inner
                    .collections
                    .borrow()
                    .get(&handle)
                    .and_then(Weak::upgrade)?;
                notifier.package(target).map(|p| (collection, p))
            })
            .collect();

        let _depth = DeliveryGuard::enter(&self.inner.delivering);
        if !packages.is_empty() {
            log::debug!(
                "session {} delivering {} packages at {}",
                self.id(),
                packages.len(),
                target
            );
        }

        for (collection, package) in &packages {
            for (token, delivery) in &package.deliveries {
                if let (Delivery::Changes(changes), Some(callback)) = (delivery, collection.callback(*token)) {
                    callback.before(changes);
                }
            }
        }

        let advanced = match next {
            Some(next) => {
                log::trace!("session {} advanced {} -> {}", self.id(), self.read_version(), target);
                *self.inner.read.borrow_mut() = next;
                true
            }
            None => false,
        };

        for (collection, package) in &packages {
            if let Some(view) = &package.view {
                collection.advance(view.clone(), package.version);
            }
        }
        for (collection, package) in &packages {
            for (token, delivery) in &package.deliveries {
                let Some(callback) = collection.callback(*token) else {
                    continue;
                };
                match delivery {
                    Delivery::Changes(changes) => callback.after(changes),
                    Delivery::Error(error) => {
                        collection.forget_callback(*token);
                        callback.error(error);
                    }
                }
            }
        }
        advanced
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("read_version", &self.read_version())
            .finish()
    }
}
