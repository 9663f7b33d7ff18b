//! Live collections and their notification tokens.
//!
//! A `Collection` is a query bound to a session. Reads evaluate the query
//! on demand at the session's version; registering a callback attaches a
//! `ChangeNotifier` that keeps the results current in the background.

use crate::arena::NotifierHandle;
use crate::callback::{CallbackToken, CollectionCallback};
use crate::change_set::ChangeSet;
use crate::key_path::KeyPathArray;
use crate::notifier::ChangeNotifier;
use crate::session::Session;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use vellum_core::{Error, Result, Row, RowKey, Value};
use vellum_query::{DistinctDescriptor, Predicate, QuerySpec, SortDescriptor, View};
use vellum_storage::VersionId;

pub(crate) struct CollectionInner {
    session: Session,
    query: QuerySpec,
    /// Set for snapshot collections, which never change
    frozen: Option<Arc<View>>,
    /// Last evaluated or delivered view
    view: RefCell<Option<Arc<View>>>,
    notifier: Cell<Option<NotifierHandle>>,
    callbacks: RefCell<Vec<(CallbackToken, CollectionCallback)>>,
    next_token: Cell<CallbackToken>,
}

impl CollectionInner {
    fn new(session: Session, query: QuerySpec, frozen: Option<Arc<View>>) -> Self {
        Self {
            session,
            query,
            frozen,
            view: RefCell::new(None),
            notifier: Cell::new(None),
            callbacks: RefCell::new(Vec::new()),
            next_token: Cell::new(1),
        }
    }

    fn attached_notifier(&self) -> Option<Arc<ChangeNotifier>> {
        self.notifier
            .get()
            .and_then(|handle| self.session.coordinator().notifier(handle))
    }

    pub(crate) fn callback(&self, token: CallbackToken) -> Option<CollectionCallback> {
        self.callbacks
            .borrow()
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, cb)| cb.clone())
    }

    /// Adopts a delivered view.
    pub(crate) fn advance(&self, view: Arc<View>, version: VersionId) {
        let mut current = self.view.borrow_mut();
        if current.as_ref().map_or(true, |v| v.version() <= version) {
            *current = Some(view);
        }
    }

    /// Drops a callback the notifier already let go of.
    pub(crate) fn forget_callback(&self, token: CallbackToken) {
        self.callbacks.borrow_mut().retain(|(t, _)| *t != token);
        self.release_if_idle();
    }

    fn remove_callback(&self, token: CallbackToken) {
        self.callbacks.borrow_mut().retain(|(t, _)| *t != token);
        if let Some(notifier) = self.attached_notifier() {
            notifier.remove_callback(token);
        }
        self.release_if_idle();
    }

    fn release_if_idle(&self) {
        let idle = self.callbacks.borrow().is_empty()
            && self.attached_notifier().map_or(true, |n| n.callback_count() == 0);
        if idle {
            self.release_notifier();
        }
    }

    fn release_notifier(&self) {
        if let Some(handle) = self.notifier.take() {
            self.session.coordinator().unregister_notifier(handle);
            self.session.untrack(handle);
        }
    }
}

impl Drop for CollectionInner {
    fn drop(&mut self) {
        self.release_notifier();
    }
}

/// The live results of a query.
///
/// Clones share one notifier and one set of callbacks.
#[derive(Clone)]
pub struct Collection {
    inner: Rc<CollectionInner>,
}

impl Collection {
    pub(crate) fn new(session: Session, query: QuerySpec) -> Self {
        Self {
            inner: Rc::new(CollectionInner::new(session, query, None)),
        }
    }

    /// Returns the query.
    #[inline]
    pub fn query(&self) -> &QuerySpec {
        &self.inner.query
    }

    /// Returns the owning session.
    #[inline]
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Returns true for snapshot collections.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.is_some()
    }

    /// Returns true while the root table exists.
    pub fn is_valid(&self) -> bool {
        self.inner.session.schema().table(self.inner.query.table()).is_some()
    }

    /// Returns the results at the session's current version.
    pub fn view(&self) -> Result<Arc<View>> {
        let inner = &self.inner;
        if let Some(frozen) = &inner.frozen {
            return Ok(frozen.clone());
        }
        let session = &inner.session;
        let evaluator = session.coordinator().evaluator();
        if session.is_in_write() {
            // Uncommitted state is never cached.
            let snapshot = session.snapshot()?;
            return Ok(Arc::new(evaluator.evaluate(&inner.query, &snapshot)?));
        }

        let read = session.read_version();
        if let Some(view) = inner.view.borrow().as_ref().filter(|v| v.version() == read) {
            return Ok(view.clone());
        }
        let snapshot = session.snapshot()?;
        let view = Arc::new(evaluator.evaluate(&inner.query, &snapshot)?);
        *inner.view.borrow_mut() = Some(view.clone());
        Ok(view)
    }

    /// Returns the number of rows.
    pub fn len(&self) -> Result<usize> {
        Ok(self.view()?.len())
    }

    /// Returns true if no row matches.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.view()?.is_empty())
    }

    /// Returns the key at `index`.
    pub fn get(&self, index: usize) -> Result<RowKey> {
        let view = self.view()?;
        view.get(index)
            .ok_or_else(|| Error::out_of_range(index, view.len()))
    }

    /// Returns every key in result order.
    pub fn keys(&self) -> Result<Vec<RowKey>> {
        Ok(self.view()?.keys().to_vec())
    }

    pub fn first(&self) -> Result<Option<RowKey>> {
        Ok(self.view()?.keys().first().copied())
    }

    pub fn last(&self) -> Result<Option<RowKey>> {
        Ok(self.view()?.keys().last().copied())
    }

    /// Returns the position of `key`, if it is in the results.
    pub fn index_of(&self, key: RowKey) -> Result<Option<usize>> {
        Ok(self.view()?.index_of(key))
    }

    /// Returns the row at `index` as the session currently sees it.
    pub fn row(&self, index: usize) -> Result<Row> {
        let key = self.get(index)?;
        let table = self.inner.query.table();
        self.inner
            .session
            .snapshot()?
            .get(table, key)
            .cloned()
            .ok_or_else(|| Error::object_deleted(self.table_name(), key))
    }

    /// Returns one column of the row at `index`.
    pub fn value(&self, index: usize, column: &str) -> Result<Value> {
        let column = self.column_id(column)?;
        let row = self.row(index)?;
        Ok(row.get(column).cloned().unwrap_or(Value::Null))
    }

    fn table_name(&self) -> String {
        self.inner
            .session
            .schema()
            .table(self.inner.query.table())
            .map(|t| t.name().to_string())
            .unwrap_or_default()
    }

    fn column_id(&self, column: &str) -> Result<vellum_core::ColumnId> {
        self.inner
            .session
            .schema()
            .require(self.inner.query.table())?
            .column_id(column)
    }

    fn derive(&self, query: QuerySpec) -> Self {
        Self::new(self.inner.session.clone(), query)
    }

    /// Returns a live collection further narrowed by `predicate`.
    ///
    /// Fails once a limit has been applied.
    pub fn filter(&self, predicate: Predicate) -> Result<Self> {
        Ok(self.derive(self.inner.query.filter(predicate)?))
    }

    /// Returns a live collection sorted by `sort`.
    pub fn sort(&self, sort: SortDescriptor) -> Self {
        self.derive(self.inner.query.sort(sort))
    }

    /// Returns a live collection keeping the first row of each distinct
    /// value combination.
    pub fn distinct(&self, distinct: DistinctDescriptor) -> Self {
        self.derive(self.inner.query.distinct(distinct))
    }

    /// Returns a live collection of at most `n` rows.
    pub fn limit(&self, n: usize) -> Self {
        self.derive(self.inner.query.limit(n))
    }

    /// Returns a frozen copy of the current results.
    pub fn snapshot(&self) -> Result<Self> {
        let view = self.view()?;
        Ok(Self {
            inner: Rc::new(CollectionInner::new(
                self.inner.session.clone(),
                self.inner.query.clone(),
                Some(view),
            )),
        })
    }

    /// Registers `callback`, optionally restricted to `key_paths`.
    ///
    /// With key paths, a modification only notifies this callback if it
    /// touches one of the paths; insertions and deletions always do.
    pub fn add_notification_callback(
        &self,
        callback: CollectionCallback,
        key_paths: &[&str],
    ) -> Result<NotificationToken> {
        let inner = &self.inner;
        if inner.frozen.is_some() {
            return Err(Error::invalid_operation(
                "Cannot register notification callbacks on a snapshot",
            ));
        }
        let session = &inner.session;
        let coordinator = session.coordinator();
        let schema = session.schema().clone();
        let key_paths = KeyPathArray::parse(&schema, inner.query.table(), key_paths)?;

        let notifier = match inner.attached_notifier() {
            Some(notifier) => notifier,
            None => {
                let notifier = Arc::new(ChangeNotifier::new(
                    session.id(),
                    inner.query.clone(),
                    &schema,
                    coordinator.config().max_link_depth,
                ));
                let handle = coordinator.register_notifier(notifier.clone());
                inner.notifier.set(Some(handle));
                session.track(handle, Rc::downgrade(inner));
                notifier
            }
        };

        // Changes are computed from what this session last showed.
        let base = if session.is_in_write() {
            None
        } else {
            let read = session.read_version();
            inner.view.borrow().as_ref().filter(|v| v.version() == read).cloned()
        };

        let token = inner.next_token.get();
        inner.next_token.set(token + 1);
        notifier.add_callback(token, key_paths, base);
        inner.callbacks.borrow_mut().push((token, callback));
        coordinator.wake_worker();

        Ok(NotificationToken {
            session: inner.session.clone(),
            collection: Some(inner.clone()),
            token,
        })
    }

    /// Registers a callback on every column, which receives either each
    /// change set or the error of a failed run.
    pub fn observe<F>(&self, f: F) -> Result<NotificationToken>
    where
        F: Fn(std::result::Result<&ChangeSet, &Error>) + 'static,
    {
        self.add_notification_callback(CollectionCallback::outcome(f), &[])
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("query", &self.inner.query)
            .field("frozen", &self.is_frozen())
            .field("notifier", &self.inner.notifier.get())
            .finish()
    }
}

/// Keeps a callback registered. Dropping it unregisters the callback.
#[must_use = "dropping the token unregisters the callback"]
pub struct NotificationToken {
    session: Session,
    collection: Option<Rc<CollectionInner>>,
    token: CallbackToken,
}

impl NotificationToken {
    /// Returns the callback's token within its collection.
    #[inline]
    pub fn token(&self) -> CallbackToken {
        self.token
    }

    /// Returns true until unregistered or ended by an error.
    pub fn is_registered(&self) -> bool {
        self.collection
            .as_ref()
            .map_or(false, |c| c.callback(self.token).is_some())
    }

    /// Hides the changes of the write transaction in progress from this
    /// callback. Other callbacks still see them.
    pub fn suppress_next(&self) -> Result<()> {
        let base = self.session.write_base_version().ok_or_else(|| {
            Error::invalid_state("suppress_next can only be called inside a write transaction")
        })?;
        let Some(collection) = &self.collection else {
            return Ok(());
        };
        if let Some(notifier) = collection.attached_notifier() {
            notifier.suppress_next(self.token, base.next());
        }
        Ok(())
    }

    /// Unregisters the callback. It is not invoked again, even if a delivery
    /// is in progress.
    pub fn unregister(&mut self) {
        if let Some(collection) = self.collection.take() {
            collection.remove_callback(self.token);
        }
    }
}

impl Drop for NotificationToken {
    fn drop(&mut self) {
        self.unregister();
    }
}

impl std::fmt::Debug for NotificationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationToken")
            .field("token", &self.token)
            .field("registered", &self.collection.is_some())
            .finish()
    }
}

/// A single observed row.
///
/// Backed by a one-row collection: deleting the row notifies with
/// `deletions = {0}`.
#[derive(Clone, Debug)]
pub struct ObjectRef {
    collection: Collection,
    key: RowKey,
}

impl ObjectRef {
    pub(crate) fn new(collection: Collection, key: RowKey) -> Self {
        Self { collection, key }
    }

    #[inline]
    pub fn key(&self) -> RowKey {
        self.key
    }

    /// Returns the collection holding just this row.
    #[inline]
    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Returns true while the row exists at the session's version.
    pub fn is_valid(&self) -> bool {
        self.collection
            .session()
            .snapshot()
            .map_or(false, |s| s.contains(self.collection.query().table(), self.key))
    }

    /// Reads one column.
    pub fn get(&self, column: &str) -> Result<Value> {
        let column = self.collection.column_id(column)?;
        let snapshot = self.collection.session().snapshot()?;
        let row = snapshot
            .get(self.collection.query().table(), self.key)
            .ok_or_else(|| Error::object_deleted(self.collection.table_name(), self.key))?;
        Ok(row.get(column).cloned().unwrap_or(Value::Null))
    }

    /// Registers `callback` on this row.
    pub fn add_notification_callback(
        &self,
        callback: CollectionCallback,
        key_paths: &[&str],
    ) -> Result<NotificationToken> {
        if !self.is_valid() {
            return Err(Error::object_deleted(self.collection.table_name(), self.key));
        }
        self.collection.add_notification_callback(callback, key_paths)
    }

    pub fn observe<F>(&self, f: F) -> Result<NotificationToken>
    where
        F: Fn(std::result::Result<&ChangeSet, &Error>) + 'static,
    {
        self.add_notification_callback(CollectionCallback::outcome(f), &[])
    }
}
