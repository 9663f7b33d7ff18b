//! Per-collection change notifier.
//!
//! A `ChangeNotifier` is shared between the session thread, which registers
//! callbacks and takes finished results, and the coordinator, which runs the
//! query against new versions. All of its state sits behind one mutex that is
//! never held while a query is evaluated or a callback is invoked.
//!
//! Each callback remembers the view it last saw (its base) and the rows it
//! has been told nothing about yet that were modified since. A run recomputes
//! the callback's pending change set from that base to the new view, so any
//! number of runs between two deliveries report exactly what one run across
//! the same commits would.

use crate::callback::CallbackToken;
use crate::change_set::{ChangeSet, RowModifications};
use crate::dependency::DependencyFilter;
use crate::key_path::KeyPathArray;
use crate::session::SessionId;
use parking_lot::Mutex;
use std::sync::Arc;
use vellum_core::schema::Schema;
use vellum_core::Error;
use vellum_query::{QueryEvaluator, QuerySpec, View};
use vellum_storage::{Snapshot, TransactionChangeInfo, VersionId};

struct CallbackState {
    token: CallbackToken,
    key_paths: KeyPathArray,
    /// The view this callback's changes are computed from
    base: Option<Arc<View>>,
    /// Rows modified since `base`
    modifications: RowModifications,
    /// Changes from `base` to the notifier's current view
    pending: Option<ChangeSet>,
    /// Changes cut off before a suppressed commit, delivered first
    sealed: Vec<ChangeSet>,
    initial_delivered: bool,
    /// A commit whose changes this callback must not see
    skip_version: Option<VersionId>,
}

impl CallbackState {
    fn new(token: CallbackToken, key_paths: KeyPathArray, base: Option<Arc<View>>) -> Self {
        Self {
            token,
            key_paths,
            base,
            modifications: RowModifications::new(),
            pending: None,
            sealed: Vec::new(),
            initial_delivered: false,
            skip_version: None,
        }
    }

    /// Drops everything up to `view` without reporting it, keeping what
    /// happened before the previous view.
    fn seal(&mut self, previous: Option<&Arc<View>>, view: &Arc<View>, ordered_moves: bool) {
        if let (Some(base), Some(previous)) = (&self.base, previous) {
            let sealed = ChangeSet::calculate(
                base.keys(),
                previous.keys(),
                &self.modifications,
                ordered_moves,
            );
            if !sealed.is_empty() {
                self.sealed.push(sealed);
            }
        }
        if self.base.is_some() {
            self.base = Some(view.clone());
        }
        self.modifications.clear();
        self.pending = None;
        self.skip_version = None;
    }

    fn absorb(&mut self, modifications: Option<&RowModifications>, view: &Arc<View>, ordered_moves: bool) {
        if let Some(modifications) = modifications {
            for (key, columns) in modifications {
                self.modifications
                    .entry(*key)
                    .or_default()
                    .extend(columns.iter().copied());
            }
        }
        if let Some(base) = &self.base {
            self.pending = Some(ChangeSet::calculate(
                base.keys(),
                view.keys(),
                &self.modifications,
                ordered_moves,
            ));
        }
    }
}

struct NotifierState {
    has_run: bool,
    /// Version the current view is valid for
    version: VersionId,
    view: Option<Arc<View>>,
    /// Last version handed to the session
    delivered: Option<VersionId>,
    callbacks: Vec<CallbackState>,
    /// Error and the callbacks that have yet to receive it
    failed: Vec<(CallbackToken, Error)>,
}

/// One thing to hand a callback.
#[derive(Clone, Debug)]
pub(crate) enum Delivery {
    Changes(ChangeSet),
    Error(Error),
}

/// What a session takes from a notifier in one delivery.
#[derive(Debug)]
pub(crate) struct Package {
    pub(crate) version: VersionId,
    /// New rows for the collection, absent when only errors are delivered
    pub(crate) view: Option<Arc<View>>,
    /// In delivery order; a token may appear more than once
    pub(crate) deliveries: Vec<(CallbackToken, Delivery)>,
}

/// Keeps one collection's query result current and computes what each of its
/// callbacks should be told.
pub struct ChangeNotifier {
    session: SessionId,
    query: QuerySpec,
    ordered_moves: bool,
    filter: DependencyFilter,
    state: Mutex<NotifierState>,
}

impl ChangeNotifier {
    /// Creates a notifier that has not run yet.
    pub fn new(session: SessionId, query: QuerySpec, schema: &Schema, max_link_depth: usize) -> Self {
        let filter = DependencyFilter::new(schema, &query, max_link_depth);
        Self {
            session,
            ordered_moves: !query.is_in_table_order(),
            query,
            filter,
            state: Mutex::new(NotifierState {
                has_run: false,
                version: VersionId::new(0),
                view: None,
                delivered: None,
                callbacks: Vec::new(),
                failed: Vec::new(),
            }),
        }
    }

    /// Returns the session that owns this notifier.
    #[inline]
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Returns the query.
    #[inline]
    pub fn query(&self) -> &QuerySpec {
        &self.query
    }

    /// Returns true once a run has produced a view.
    pub fn has_run(&self) -> bool {
        self.state.lock().has_run
    }

    /// Returns the version of the current view, if any.
    pub fn version(&self) -> Option<VersionId> {
        let state = self.state.lock();
        state.has_run.then_some(state.version)
    }

    /// Returns the number of registered callbacks.
    pub fn callback_count(&self) -> usize {
        self.state.lock().callbacks.len()
    }

    /// Returns true if callbacks are waiting for the first run.
    pub(crate) fn needs_first_run(&self) -> bool {
        let state = self.state.lock();
        !state.has_run && !state.callbacks.is_empty()
    }

    pub(crate) fn add_callback(
        &self,
        token: CallbackToken,
        key_paths: KeyPathArray,
        base: Option<Arc<View>>,
    ) {
        self.state
            .lock()
            .callbacks
            .push(CallbackState::new(token, key_paths, base));
    }

    /// Removes a callback and returns how many remain.
    pub(crate) fn remove_callback(&self, token: CallbackToken) -> usize {
        let mut state = self.state.lock();
        state.callbacks.retain(|c| c.token != token);
        state.failed.retain(|(t, _)| *t != token);
        state.callbacks.len()
    }

    /// Hides the changes of the commit producing `version` from one callback.
    pub(crate) fn suppress_next(&self, token: CallbackToken, version: VersionId) {
        let mut state = self.state.lock();
        if let Some(callback) = state.callbacks.iter_mut().find(|c| c.token == token) {
            callback.skip_version = Some(version);
        }
    }

    /// Forgets suppressions aimed at a commit that did not happen.
    pub(crate) fn clear_skip(&self, version: VersionId) {
        let mut state = self.state.lock();
        for callback in &mut state.callbacks {
            if callback.skip_version == Some(version) {
                callback.skip_version = None;
            }
        }
    }

    /// Returns the suppressed versions in `(after, upto]`, ascending.
    pub(crate) fn skip_versions(&self, after: VersionId, upto: VersionId) -> Vec<VersionId> {
        let state = self.state.lock();
        let mut versions: Vec<VersionId> = state
            .callbacks
            .iter()
            .filter_map(|c| c.skip_version)
            .filter(|v| *v > after && *v <= upto)
            .collect();
        versions.sort_unstable();
        versions.dedup();
        versions
    }

    /// Brings the view up to `snapshot`.
    ///
    /// `info` describes the commits since the current view and is ignored on
    /// the first run.
    pub(crate) fn run(
        &self,
        evaluator: &dyn QueryEvaluator,
        snapshot: &Snapshot,
        info: Option<&TransactionChangeInfo>,
    ) {
        let to = snapshot.version();
        let (previous, key_paths) = {
            let state = self.state.lock();
            if state.callbacks.is_empty() || (state.has_run && state.version >= to) {
                return;
            }
            let previous = if state.has_run { state.view.clone() } else { None };
            let mut key_paths: Vec<KeyPathArray> = Vec::new();
            for callback in &state.callbacks {
                if !key_paths.contains(&callback.key_paths) {
                    key_paths.push(callback.key_paths.clone());
                }
            }
            (previous, key_paths)
        };

        let info = if previous.is_some() { info } else { None };
        if let Some(info) = info {
            if !self.filter.might_be_affected(info, &key_paths) {
                log::trace!(
                    "notifier for table {} unaffected up to {}",
                    self.query.table(),
                    to
                );
                let mut state = self.state.lock();
                state.version = to;
                for callback in &mut state.callbacks {
                    if callback.skip_version.map_or(false, |v| v <= to) {
                        callback.skip_version = None;
                    }
                }
                return;
            }
        }

        let view = match evaluator.evaluate(&self.query, snapshot) {
            Ok(view) => Arc::new(view),
            Err(e) => {
                self.fail(Error::notifier_run_failed(e.to_string()));
                return;
            }
        };

        let modifications: Vec<(KeyPathArray, RowModifications)> = match info {
            Some(info) => key_paths
                .into_iter()
                .map(|paths| {
                    let rows = self.filter.modifications(snapshot, info, &paths, view.keys());
                    (paths, rows)
                })
                .collect(),
            None => Vec::new(),
        };

        let mut state = self.state.lock();
        for callback in &mut state.callbacks {
            if callback.skip_version == Some(to) {
                callback.seal(previous.as_ref(), &view, self.ordered_moves);
                continue;
            }
            if previous.is_none() && callback.skip_version.map_or(false, |v| v <= to) {
                callback.skip_version = None;
            }
            let rows = modifications
                .iter()
                .find(|(paths, _)| *paths == callback.key_paths)
                .map(|(_, rows)| rows);
            callback.absorb(rows, &view, self.ordered_moves);
        }
        log::debug!(
            "notifier for table {} ran to {}: {} rows",
            self.query.table(),
            to,
            view.len()
        );
        state.view = Some(view);
        state.version = to;
        state.has_run = true;
    }

    /// Ends delivery for every current callback with `error` and resets the
    /// notifier so that later callbacks start over.
    pub(crate) fn fail(&self, error: Error) {
        let mut state = self.state.lock();
        log::warn!(
            "notifier for table {} failed, dropping {} callbacks: {}",
            self.query.table(),
            state.callbacks.len(),
            error
        );
        let callbacks = std::mem::take(&mut state.callbacks);
        state
            .failed
            .extend(callbacks.into_iter().map(|c| (c.token, error.clone())));
        state.has_run = false;
        state.view = None;
        state.delivered = None;
    }

    /// Takes what should be delivered to a session reading at `read_version`.
    ///
    /// Changes are only handed over when the view matches the session's
    /// version; errors are handed over regardless.
    pub(crate) fn package(&self, read_version: VersionId) -> Option<Package> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut deliveries: Vec<(CallbackToken, Delivery)> = state
            .failed
            .drain(..)
            .map(|(token, error)| (token, Delivery::Error(error)))
            .collect();

        let view = match &state.view {
            Some(view) if state.has_run && state.version == read_version => view.clone(),
            _ => {
                return (!deliveries.is_empty()).then(|| Package {
                    version: read_version,
                    view: None,
                    deliveries,
                });
            }
        };

        let fresh = state.delivered != Some(state.version);
        for callback in &mut state.callbacks {
            for sealed in callback.sealed.drain(..) {
                deliveries.push((callback.token, Delivery::Changes(sealed)));
            }
            if !callback.initial_delivered {
                callback.initial_delivered = true;
                let len = callback.base.as_ref().map_or(view.len(), |b| b.len());
                deliveries.push((callback.token, Delivery::Changes(ChangeSet::unchanged(len))));
            }
            let changes = callback.pending.take().or_else(|| {
                callback
                    .base
                    .as_ref()
                    .filter(|base| !Arc::ptr_eq(base, &view))
                    .map(|base| {
                        ChangeSet::calculate(
                            base.keys(),
                            view.keys(),
                            &callback.modifications,
                            self.ordered_moves,
                        )
                    })
            });
            if let Some(changes) = changes.filter(|c| !c.is_empty()) {
                deliveries.push((callback.token, Delivery::Changes(changes)));
            }
            callback.base = Some(view.clone());
            callback.modifications.clear();
        }
        state.delivered = Some(state.version);

        (fresh || !deliveries.is_empty()).then(|| Package {
            version: state.version,
            view: Some(view),
            deliveries,
        })
    }
}
