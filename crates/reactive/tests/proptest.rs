//! Property-based tests for vellum-reactive using proptest.

use proptest::prelude::*;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;
use vellum_core::schema::{Schema, TableBuilder};
use vellum_core::{ColumnId, DataType, RowKey, Value};
use vellum_query::{ColumnPath, ScanEvaluator, SortDescriptor};
use vellum_reactive::{
    ChangeSet, Collection, Coordinator, CoordinatorConfig, NotificationToken, QueueScheduler,
    RowModifications, Session, SessionConfig,
};
use vellum_storage::VersionedStore;

/// Strategy for a list of distinct keys in arbitrary order.
fn key_list() -> impl Strategy<Value = Vec<RowKey>> {
    prop::collection::vec(0u64..24, 0..20).prop_map(|raw| {
        let mut seen = HashSet::new();
        raw.into_iter()
            .filter(|k| seen.insert(*k))
            .map(RowKey::new)
            .collect()
    })
}

fn modifications(raw: &[u64]) -> RowModifications {
    let mut mods = RowModifications::new();
    for k in raw {
        mods.entry(RowKey::new(*k)).or_default().insert(0 as ColumnId);
    }
    mods
}

/// Applies `changes` to `old`, taking inserted keys from `new`.
fn apply(old: &[RowKey], changes: &ChangeSet, new: &[RowKey]) -> Vec<RowKey> {
    let mut keys: Vec<RowKey> = old
        .iter()
        .enumerate()
        .filter(|(i, _)| !changes.deletions.contains(*i))
        .map(|(_, k)| *k)
        .collect();
    for i in changes.insertions.iter() {
        keys.insert(i, new[i]);
    }
    keys
}

#[derive(Clone, Debug)]
enum Op {
    Insert(i64),
    Set(usize, i64),
    Delete(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (-20i64..20).prop_map(Op::Insert),
        (0usize..16, -20i64..20).prop_map(|(i, v)| Op::Set(i, v)),
        (0usize..16).prop_map(Op::Delete),
    ]
}

/// A session observing items sorted by value.
struct Observer {
    scheduler: Arc<QueueScheduler>,
    collection: Collection,
    log: Rc<RefCell<Vec<ChangeSet>>>,
    _token: NotificationToken,
}

impl Observer {
    fn open(coordinator: &Arc<Coordinator>) -> Self {
        let scheduler = QueueScheduler::new();
        let session = Session::open(coordinator, scheduler.clone(), SessionConfig::default());
        let collection = session
            .table("item")
            .unwrap()
            .sort(SortDescriptor::asc(ColumnPath::column(0)));
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let token = collection
            .observe(move |c| sink.borrow_mut().extend(c.ok().cloned()))
            .unwrap();
        Self {
            scheduler,
            collection,
            log,
            _token: token,
        }
    }
}

fn item_coordinator() -> Arc<Coordinator> {
    let schema = Schema::builder()
        .table(
            TableBuilder::new("item")
                .unwrap()
                .add_column("value", DataType::Int)
                .unwrap(),
        )
        .build()
        .unwrap();
    Coordinator::new(
        "proptest",
        VersionedStore::new(schema),
        Arc::new(ScanEvaluator),
        CoordinatorConfig::manual(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: deletions and modifications index the old view, insertions
    /// and modifications_new the new one, and the sizes add up.
    #[test]
    fn change_set_positions(
        old in key_list(),
        new in key_list(),
        modified in prop::collection::vec(0u64..24, 0..8),
        ordered in any::<bool>(),
    ) {
        let changes = ChangeSet::calculate(&old, &new, &modifications(&modified), ordered);
        prop_assert_eq!(changes.old_len, old.len());
        prop_assert_eq!(changes.new_len, new.len());
        prop_assert_eq!(
            old.len() - changes.deletions.len() + changes.insertions.len(),
            new.len()
        );
        prop_assert!(changes.deletions.iter().all(|i| i < old.len()));
        prop_assert!(changes.modifications.iter().all(|i| i < old.len()));
        prop_assert!(changes.insertions.iter().all(|i| i < new.len()));
        prop_assert!(changes.modifications_new.iter().all(|i| i < new.len()));
        prop_assert_eq!(changes.modifications.len(), changes.modifications_new.len());
        for m in &changes.moves {
            prop_assert!(changes.deletions.contains(m.from));
            prop_assert!(changes.insertions.contains(m.to));
            prop_assert_eq!(old[m.from], new[m.to]);
        }
        if !ordered {
            prop_assert!(changes.moves.is_empty());
        }
    }

    /// Property: applying a change set to the old keys yields the new keys.
    #[test]
    fn change_set_applies(old in key_list(), new in key_list()) {
        let changes = ChangeSet::calculate(&old, &new, &RowModifications::new(), true);
        prop_assert_eq!(apply(&old, &changes, &new), new);
    }

    /// Property: any number of commits between two deliveries is reported
    /// as one change set equal to delivering after every commit.
    #[test]
    fn commits_collapse_without_gaps(
        initial in prop::collection::vec(-20i64..20, 0..8),
        ops in prop::collection::vec(op_strategy(), 1..12),
    ) {
        let coordinator = item_coordinator();
        let writer = Session::open(&coordinator, QueueScheduler::new(), SessionConfig::default());
        let mut alive: Vec<RowKey> = writer
            .write(|tx| initial.iter().map(|v| tx.insert(0, vec![Value::Int(*v)])).collect())
            .unwrap();

        let eager = Observer::open(&coordinator);
        let lazy = Observer::open(&coordinator);
        coordinator.run_async_notifiers();
        eager.scheduler.run_pending();
        lazy.scheduler.run_pending();
        let start = lazy.collection.keys().unwrap();
        let mut eager_keys = eager.collection.keys().unwrap();

        let mut set_keys = HashSet::new();
        for op in &ops {
            match *op {
                Op::Insert(v) => {
                    let key = writer.write(|tx| tx.insert(0, vec![Value::Int(v)])).unwrap();
                    alive.push(key);
                }
                Op::Set(i, v) if !alive.is_empty() => {
                    let key = alive[i % alive.len()];
                    writer.write(|tx| tx.set(0, key, 0, Value::Int(v))).unwrap();
                    set_keys.insert(key);
                }
                Op::Delete(i) if !alive.is_empty() => {
                    let key = alive.remove(i % alive.len());
                    writer.write(|tx| tx.delete(0, key)).unwrap();
                }
                _ => continue,
            }
            coordinator.run_async_notifiers();
            let before = eager.log.borrow().len();
            eager.scheduler.run_pending();
            let log = eager.log.borrow();
            prop_assert!(log.len() <= before + 1);
            if log.len() == before + 1 {
                let now = eager.collection.keys().unwrap();
                eager_keys = apply(&eager_keys, &log[before], &now);
                prop_assert_eq!(&eager_keys, &now);
            }
        }

        lazy.scheduler.run_pending();
        let end = lazy.collection.keys().unwrap();
        prop_assert_eq!(&eager_keys, &end);

        let log = lazy.log.borrow();
        prop_assert!(log.len() <= 2);
        prop_assert!(log[0].is_empty());
        match log.get(1) {
            Some(changes) => {
                prop_assert_eq!(changes.old_len, start.len());
                prop_assert_eq!(changes.new_len, end.len());
                prop_assert_eq!(apply(&start, changes, &end), end.clone());

                let start_keys: HashSet<RowKey> = start.iter().copied().collect();
                let expected: HashSet<RowKey> = end
                    .iter()
                    .enumerate()
                    .filter(|(i, k)| !changes.insertions.contains(*i) && start_keys.contains(k))
                    .map(|(_, k)| *k)
                    .filter(|k| set_keys.contains(k))
                    .collect();
                let reported: HashSet<RowKey> =
                    changes.modifications_new.iter().map(|i| end[i]).collect();
                prop_assert_eq!(reported, expected);
            }
            None => {
                prop_assert_eq!(&start, &end);
                prop_assert!(set_keys.iter().all(|k| !start.contains(k)));
            }
        }
    }
}
