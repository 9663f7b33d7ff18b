//! Per-store coordination of notifiers, sessions and the background worker.
//!
//! There is one `Coordinator` per store path. It owns every registered
//! notifier, runs them in batches against new versions (on a worker thread
//! or inline), and tells each session's scheduler when a batch finished.

use crate::arena::{Arena, NotifierHandle};
use crate::dependency::DEFAULT_MAX_LINK_DEPTH;
use crate::notifier::ChangeNotifier;
use crate::scheduler::Scheduler;
use crate::session::{self, SessionId};
use hashbrown::HashMap;
use std::num::NonZeroUsize;
use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use vellum_core::schema::Schema;
use vellum_core::{Error, Result};
use vellum_query::{QueryEvaluator, ScanEvaluator};
use vellum_storage::{Snapshot, TransactionChangeInfo, VersionId, VersionedStore};

/// Coordinator configuration.
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Run notifiers on a dedicated thread. When off, runs happen inline in
    /// `run_async_notifiers` and in blocking session calls.
    pub background_worker: bool,
    /// Run the notifiers of one batch on scoped threads.
    pub parallel_runs: bool,
    /// Link hops followed when looking for modifications of linked rows.
    pub max_link_depth: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            background_worker: true,
            parallel_runs: true,
            max_link_depth: DEFAULT_MAX_LINK_DEPTH,
        }
    }
}

impl CoordinatorConfig {
    /// Configuration without a worker thread, driven by explicit calls.
    pub fn manual() -> Self {
        Self {
            background_worker: false,
            ..Self::default()
        }
    }

    /// Sets whether a worker thread runs notifiers.
    pub fn with_background_worker(mut self, enabled: bool) -> Self {
        self.background_worker = enabled;
        self
    }

    /// Sets whether one batch runs its notifiers concurrently.
    pub fn with_parallel_runs(mut self, enabled: bool) -> Self {
        self.parallel_runs = enabled;
        self
    }

    /// Sets the link depth of the deep change checker.
    pub fn with_max_link_depth(mut self, depth: usize) -> Self {
        self.max_link_depth = depth;
        self
    }
}

struct SessionEntry {
    scheduler: Arc<dyn Scheduler>,
}

struct CoordinatorState {
    notifiers: Arena<Arc<ChangeNotifier>>,
    sessions: HashMap<SessionId, SessionEntry>,
    /// Snapshot at the version every run notifier has reached
    ready: Snapshot,
}

/// One step of a notifier run: from its current version (`None` for a first
/// run) to `to`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Step {
    from: Option<VersionId>,
    to: VersionId,
}

/// Splits a run so that every suppressed commit is a step of its own.
fn plan_steps(current: Option<VersionId>, skips: &[VersionId], target: VersionId) -> Vec<Step> {
    let Some(mut at) = current else {
        return vec![Step { from: None, to: target }];
    };
    let mut steps = Vec::new();
    for skip in skips {
        let before = skip.prev();
        if before > at {
            steps.push(Step { from: Some(at), to: before });
            at = before;
        }
        if *skip > at {
            steps.push(Step { from: Some(at), to: *skip });
            at = *skip;
        }
    }
    if target > at {
        steps.push(Step { from: Some(at), to: target });
    }
    steps
}

struct WorkerSignal {
    pending: bool,
    shutdown: bool,
}

struct Worker {
    signal: Arc<(Mutex<WorkerSignal>, Condvar)>,
    thread: ThreadId,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(coordinator: Weak<Coordinator>, path: &str) -> Option<Self> {
        let signal = Arc::new((
            Mutex::new(WorkerSignal {
                pending: false,
                shutdown: false,
            }),
            Condvar::new(),
        ));
        let shared = signal.clone();
        let spawned = thread::Builder::new()
            .name(format!("vellum-notifier:{}", path))
            .spawn(move || loop {
                {
                    let (lock, cvar) = &*shared;
                    let mut state = lock.lock();
                    while !state.pending && !state.shutdown {
                        cvar.wait(&mut state);
                    }
                    if state.shutdown {
                        return;
                    }
                    state.pending = false;
                }
                let Some(coordinator) = coordinator.upgrade() else {
                    return;
                };
                coordinator.run_async_notifiers();
            });
        match spawned {
            Ok(handle) => Some(Self {
                signal,
                thread: handle.thread().id(),
                handle: Some(handle),
            }),
            Err(e) => {
                log::error!("could not start notifier worker, running inline: {}", e);
                None
            }
        }
    }

    fn wake(&self) {
        let (lock, cvar) = &*self.signal;
        lock.lock().pending = true;
        cvar.notify_one();
    }
}

/// Owns the notifiers for one store and schedules their runs.
pub struct Coordinator {
    path: String,
    store: Arc<VersionedStore>,
    evaluator: Arc<dyn QueryEvaluator>,
    config: CoordinatorConfig,
    state: Mutex<CoordinatorState>,
    /// Signalled after every batch
    batch_done: Condvar,
    /// Serialises batches
    run_lock: Mutex<()>,
    worker: Mutex<Option<Worker>>,
}

impl Coordinator {
    /// Creates a coordinator for `store`.
    pub fn new(
        path: impl Into<String>,
        store: Arc<VersionedStore>,
        evaluator: Arc<dyn QueryEvaluator>,
        config: CoordinatorConfig,
    ) -> Arc<Self> {
        let path = path.into();
        let ready = store.latest();
        let coordinator = Arc::new(Self {
            path,
            store,
            evaluator,
            config,
            state: Mutex::new(CoordinatorState {
                notifiers: Arena::new(),
                sessions: HashMap::new(),
                ready,
            }),
            batch_done: Condvar::new(),
            run_lock: Mutex::new(()),
            worker: Mutex::new(None),
        });
        if coordinator.config.background_worker {
            let worker = Worker::spawn(Arc::downgrade(&coordinator), &coordinator.path);
            *coordinator.worker.lock() = worker;
        }
        coordinator
    }

    /// Returns the store path.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the store.
    #[inline]
    pub fn store(&self) -> &Arc<VersionedStore> {
        &self.store
    }

    /// Returns the schema.
    #[inline]
    pub fn schema(&self) -> &Arc<Schema> {
        self.store.schema()
    }

    /// Returns the query evaluator.
    #[inline]
    pub fn evaluator(&self) -> &Arc<dyn QueryEvaluator> {
        &self.evaluator
    }

    /// Returns the configuration.
    #[inline]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Returns true if a worker thread runs the notifiers.
    pub fn has_worker(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Returns the version results are ready for.
    pub fn ready_version(&self) -> VersionId {
        self.state.lock().ready.version()
    }

    /// Returns the snapshot results are ready for.
    pub fn ready_snapshot(&self) -> Snapshot {
        self.state.lock().ready.clone()
    }

    /// Returns the number of registered notifiers.
    pub fn notifier_count(&self) -> usize {
        self.state.lock().notifiers.len()
    }

    /// Registers a notifier; its first run happens in the next batch.
    pub fn register_notifier(&self, notifier: Arc<ChangeNotifier>) -> NotifierHandle {
        let handle = self.state.lock().notifiers.insert(notifier);
        log::debug!("registered notifier {} on {}", handle, self.path);
        handle
    }

    /// Unregisters a notifier. Results of a run in progress are discarded.
    pub fn unregister_notifier(&self, handle: NotifierHandle) -> Option<Arc<ChangeNotifier>> {
        let removed = self.state.lock().notifiers.remove(handle);
        if removed.is_some() {
            log::debug!("unregistered notifier {} on {}", handle, self.path);
        }
        removed
    }

    /// Looks a notifier up; `None` once it has been unregistered.
    pub fn notifier(&self, handle: NotifierHandle) -> Option<Arc<ChangeNotifier>> {
        self.state.lock().notifiers.get(handle).cloned()
    }

    pub(crate) fn session_notifiers(&self, session: SessionId) -> Vec<(NotifierHandle, Arc<ChangeNotifier>)> {
        self.state
            .lock()
            .notifiers
            .iter()
            .filter(|(_, n)| n.session() == session)
            .map(|(h, n)| (h, n.clone()))
            .collect()
    }

    pub(crate) fn register_session(&self, session: SessionId, scheduler: Arc<dyn Scheduler>) {
        self.state
            .lock()
            .sessions
            .insert(session, SessionEntry { scheduler });
    }

    pub(crate) fn unregister_session(&self, session: SessionId) {
        let mut state = self.state.lock();
        state.sessions.remove(&session);
        let owned: Vec<NotifierHandle> = state
            .notifiers
            .iter()
            .filter(|(_, n)| n.session() == session)
            .map(|(h, _)| h)
            .collect();
        for handle in owned {
            state.notifiers.remove(handle);
        }
    }

    /// Called after a commit; wakes the worker.
    pub fn on_commit(&self, version: VersionId) {
        log::trace!("commit {} on {}", version, self.path);
        self.wake_worker();
    }

    /// Asks the worker to run a batch. Does nothing without a worker.
    pub fn wake_worker(&self) {
        if let Some(worker) = self.worker.lock().as_ref() {
            worker.wake();
        }
    }

    fn needs_first_run(state: &CoordinatorState, session: SessionId) -> bool {
        state
            .notifiers
            .iter()
            .any(|(_, n)| n.session() == session && n.needs_first_run())
    }

    /// Blocks until every notifier of `session` with callbacks has run once.
    ///
    /// Without a worker the batch runs inline on the calling thread.
    pub(crate) fn wait_for_first_runs(&self, session: SessionId) {
        if !self.has_worker() {
            let pending = Self::needs_first_run(&self.state.lock(), session);
            if pending {
                self.run_async_notifiers();
            }
            return;
        }
        let mut state = self.state.lock();
        if !Self::needs_first_run(&state, session) {
            return;
        }
        self.wake_worker();
        while Self::needs_first_run(&state, session) {
            self.batch_done.wait(&mut state);
        }
    }

    /// Runs every notifier with callbacks up to the latest version, then
    /// publishes the new ready version and wakes every session.
    pub fn run_async_notifiers(&self) {
        let _batch = self.run_lock.lock();
        let target = self.store.current_version();
        let notifiers: Vec<Arc<ChangeNotifier>> = self
            .state
            .lock()
            .notifiers
            .iter()
            .map(|(_, n)| n.clone())
            .collect();

        let plans: Vec<(Arc<ChangeNotifier>, Vec<Step>)> = notifiers
            .into_iter()
            .filter(|n| n.callback_count() > 0)
            .filter_map(|n| {
                let current = n.version();
                let skips = current
                    .map(|v| n.skip_versions(v, target))
                    .unwrap_or_default();
                let steps = plan_steps(current, &skips, target);
                (!steps.is_empty()).then_some((n, steps))
            })
            .collect();

        // Notifiers at the same version share snapshots and change info.
        let mut snapshots: HashMap<VersionId, Result<Snapshot>> = HashMap::new();
        let mut changes: HashMap<(VersionId, VersionId), Result<Arc<TransactionChangeInfo>>> =
            HashMap::new();
        for (_, steps) in &plans {
            for step in steps {
                snapshots
                    .entry(step.to)
                    .or_insert_with(|| self.store.open_at(step.to));
                if let Some(from) = step.from {
                    changes
                        .entry((from, step.to))
                        .or_insert_with(|| self.store.changes_between(from, step.to).map(Arc::new));
                }
            }
        }

        let run_one = |(notifier, steps): &(Arc<ChangeNotifier>, Vec<Step>)| {
            for step in steps {
                let snapshot = match snapshots.get(&step.to) {
                    Some(Ok(snapshot)) => snapshot,
                    Some(Err(e)) => return notifier.fail(Error::notifier_run_failed(e.to_string())),
                    None => return,
                };
                let info = match step.from.map(|from| changes.get(&(from, step.to))) {
                    None => None,
                    Some(Some(Ok(info))) => Some(&**info),
                    Some(Some(Err(e))) => {
                        return notifier.fail(Error::notifier_run_failed(e.to_string()))
                    }
                    Some(None) => return,
                };
                notifier.run(self.evaluator.as_ref(), snapshot, info);
                if !notifier.has_run() {
                    return;
                }
            }
        };

        let threads = if self.config.parallel_runs {
            run_threads(plans.len())
        } else {
            1
        };
        if threads > 1 {
            let run_one = &run_one;
            thread::scope(|scope| {
                for (i, part) in plans.chunks(plans.len().div_ceil(threads)).enumerate() {
                    let spawned = thread::Builder::new()
                        .name(format!("vellum-notifier-run-{}", i))
                        .spawn_scoped(scope, move || part.iter().for_each(run_one));
                    if let Err(e) = spawned {
                        log::warn!("could not start notifier run thread, running inline: {}", e);
                        part.iter().for_each(run_one);
                    }
                }
            });
        } else {
            plans.iter().for_each(run_one);
        }

        // Reopening only when no notifier opened the target.
        let handover = match snapshots.remove(&target) {
            Some(Ok(snapshot)) => Some(snapshot),
            _ => {
                let latest = self.store.latest();
                if latest.version() == target {
                    Some(latest)
                } else {
                    self.store.open_at(target).ok()
                }
            }
        };

        let schedulers: Vec<(SessionId, Arc<dyn Scheduler>)> = {
            let mut state = self.state.lock();
            if let Some(snapshot) = handover {
                if snapshot.version() > state.ready.version() {
                    state.ready = snapshot;
                }
            }
            let oldest_needed = state
                .notifiers
                .iter()
                .filter_map(|(_, n)| n.version())
                .fold(target, VersionId::min);
            self.store.release_history_before(oldest_needed);
            self.batch_done.notify_all();
            state
                .sessions
                .iter()
                .map(|(id, entry)| (*id, entry.scheduler.clone()))
                .collect()
        };

        log::debug!(
            "ran {} notifiers on {} up to {}",
            plans.len(),
            self.path,
            target
        );
        for (id, scheduler) in schedulers {
            scheduler.post(Box::new(move || session::deliver_posted(id)));
        }
    }
}

/// Number of threads for a batch of `plans` notifier runs.
fn run_threads(plans: usize) -> usize {
    thread::available_parallelism()
        .map_or(1, NonZeroUsize::get)
        .min(plans)
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if let Some(mut worker) = self.worker.get_mut().take() {
            {
                let (lock, cvar) = &*worker.signal;
                lock.lock().shutdown = true;
                cvar.notify_one();
            }
            // The worker may hold the last reference itself.
            if worker.thread != thread::current().id() {
                if let Some(handle) = worker.handle.take() {
                    let _ = handle.join();
                }
            }
        }
    }
}

/// Maps store paths to their live coordinator.
#[derive(Default)]
pub struct CoordinatorRegistry {
    coordinators: Mutex<HashMap<String, Weak<Coordinator>>>,
}

impl CoordinatorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry.
    pub fn global() -> &'static CoordinatorRegistry {
        static GLOBAL: OnceLock<CoordinatorRegistry> = OnceLock::new();
        GLOBAL.get_or_init(CoordinatorRegistry::new)
    }

    /// Returns the live coordinator for `path`.
    pub fn get(&self, path: &str) -> Option<Arc<Coordinator>> {
        self.coordinators.lock().get(path).and_then(Weak::upgrade)
    }

    /// Returns the live coordinator for `path`, opening a new store with
    /// `schema` if there is none.
    pub fn get_or_open(
        &self,
        path: &str,
        schema: Schema,
        config: CoordinatorConfig,
    ) -> Result<Arc<Coordinator>> {
        let mut coordinators = self.coordinators.lock();
        if let Some(existing) = coordinators.get(path).and_then(Weak::upgrade) {
            if **existing.schema() != schema {
                return Err(Error::invalid_operation(format!(
                    "'{}' is already open with a different schema",
                    path
                )));
            }
            return Ok(existing);
        }
        coordinators.retain(|_, c| c.strong_count() > 0);
        let store = VersionedStore::new(schema);
        let coordinator = Coordinator::new(path, store, Arc::new(ScanEvaluator::new()), config);
        coordinators.insert(path.to_string(), Arc::downgrade(&coordinator));
        Ok(coordinator)
    }

    /// Returns the number of live coordinators.
    pub fn len(&self) -> usize {
        self.coordinators
            .lock()
            .values()
            .filter(|c| c.strong_count() > 0)
            .count()
    }

    /// Returns true if no coordinator is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
