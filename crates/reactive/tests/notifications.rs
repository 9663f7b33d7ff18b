//! Integration tests for collection notifications.
//!
//! Every test drives a coordinator without a worker thread: commits are
//! followed by an explicit batch (`run_async_notifiers`) and the session's
//! scheduler is drained to deliver, which keeps the order of events exact.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use vellum_core::schema::{Schema, TableBuilder};
use vellum_core::{DataType, Error, RowKey, Value};
use vellum_query::{ColumnPath, DistinctDescriptor, ScanEvaluator, SortDescriptor};
use vellum_reactive::{
    ChangeSet, Collection, CollectionCallback, Coordinator, CoordinatorConfig, Move,
    NotificationToken, QueueScheduler, Session, SessionConfig,
};
use vellum_storage::{FailPoint, VersionedStore, WriteTransaction};

const ITEM: u32 = 0;
const VALUE: usize = 0;
const GROUP: usize = 1;

const PERSON: u32 = 0;
const DOG: u32 = 1;
const NAME: usize = 0;
const AGE: usize = 1;
const OWNER: usize = 1;

type Log = Rc<RefCell<Vec<ChangeSet>>>;

/// A session on a manually driven coordinator.
struct Fixture {
    coordinator: Arc<Coordinator>,
    scheduler: Arc<QueueScheduler>,
    session: Session,
}

impl Fixture {
    fn new(schema: Schema) -> Self {
        Self::with_config(schema, CoordinatorConfig::manual())
    }

    fn with_config(schema: Schema, config: CoordinatorConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let coordinator = Coordinator::new(
            "notifications",
            VersionedStore::new(schema),
            Arc::new(ScanEvaluator),
            config,
        );
        let scheduler = QueueScheduler::new();
        let session = Session::open(&coordinator, scheduler.clone(), SessionConfig::default());
        Self {
            coordinator,
            scheduler,
            session,
        }
    }

    /// Runs a batch and delivers its results.
    fn settle(&self) {
        self.coordinator.run_async_notifiers();
        self.scheduler.run_pending();
    }

    fn write<T>(&self, f: impl FnOnce(&mut WriteTransaction) -> vellum_core::Result<T>) -> T {
        self.session.write(f).unwrap()
    }
}

fn items_schema() -> Schema {
    Schema::builder()
        .table(
            TableBuilder::new("item")
                .unwrap()
                .add_column("value", DataType::Int)
                .unwrap()
                .add_column("group", DataType::String)
                .unwrap(),
        )
        .build()
        .unwrap()
}

fn people_schema() -> Schema {
    Schema::builder()
        .table(
            TableBuilder::new("person")
                .unwrap()
                .add_column("name", DataType::String)
                .unwrap()
                .add_column("age", DataType::Int)
                .unwrap(),
        )
        .table(
            TableBuilder::new("dog")
                .unwrap()
                .add_column("name", DataType::String)
                .unwrap()
                .add_link("owner", "person")
                .unwrap(),
        )
        .build()
        .unwrap()
}

fn insert_items(fx: &Fixture, values: &[i64]) -> Vec<RowKey> {
    fx.write(|tx| {
        values
            .iter()
            .map(|v| tx.insert(ITEM, vec![Value::Int(*v), Value::from("a")]))
            .collect()
    })
}

fn record(collection: &Collection, key_paths: &[&str]) -> (NotificationToken, Log) {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    let token = collection
        .add_notification_callback(
            CollectionCallback::changes(move |c| sink.borrow_mut().push(c.clone())),
            key_paths,
        )
        .unwrap();
    (token, log)
}

fn by_value() -> SortDescriptor {
    SortDescriptor::asc(ColumnPath::column(VALUE))
}

#[test]
fn test_initial_delivery_is_empty() {
    let fx = Fixture::new(items_schema());
    insert_items(&fx, &[5, 6, 7]);
    let items = fx.session.table("item").unwrap();

    let (_token, log) = record(&items, &[]);
    assert!(log.borrow().is_empty());
    fx.settle();

    let log = log.borrow();
    assert_eq!(log.len(), 1);
    assert!(log[0].is_empty());
    assert_eq!(log[0].new_len, 3);
}

#[test]
fn test_sorted_diff() {
    let fx = Fixture::new(items_schema());
    let k = insert_items(&fx, &[2, 3, 0, 1]);
    let sorted = fx.session.table("item").unwrap().sort(by_value());
    let (_token, log) = record(&sorted, &[]);
    fx.settle();
    assert_eq!(sorted.keys().unwrap(), vec![k[2], k[3], k[0], k[1]]);

    fx.write(|tx| tx.set(ITEM, k[0], VALUE, Value::Int(9)));
    fx.settle();

    let log = log.borrow();
    assert_eq!(log.len(), 2);
    let changes = &log[1];
    assert_eq!(changes.deletions.to_vec(), vec![2]);
    assert_eq!(changes.insertions.to_vec(), vec![3]);
    assert_eq!(changes.moves, vec![Move { from: 2, to: 3 }]);
    assert!(changes.modifications.is_empty());
    assert_eq!(sorted.keys().unwrap(), vec![k[2], k[3], k[1], k[0]]);
}

#[test]
fn test_modification_in_place() {
    let fx = Fixture::new(items_schema());
    let k = insert_items(&fx, &[1, 2, 3]);
    let items = fx.session.table("item").unwrap();
    let (_token, log) = record(&items, &[]);
    fx.settle();

    fx.write(|tx| tx.set(ITEM, k[1], GROUP, Value::from("b")));
    fx.settle();

    let log = log.borrow();
    let changes = &log[1];
    assert!(changes.insertions.is_empty() && changes.deletions.is_empty());
    assert_eq!(changes.modifications.to_vec(), vec![1]);
    assert_eq!(changes.modifications_new.to_vec(), vec![1]);
    assert_eq!(
        changes.column_modifications(GROUP).map(|s| s.to_vec()),
        Some(vec![1])
    );
    assert!(changes.column_modifications(VALUE).is_none());
}

#[test]
fn test_distinct_and_sort_follow_composition_order() {
    let fx = Fixture::new(items_schema());
    let k = fx.write(|tx| {
        let rows = [(0, "A"), (1, "A"), (2, "B")];
        rows.iter()
            .map(|(v, g)| tx.insert(ITEM, vec![Value::Int(*v), Value::from(*g)]))
            .collect::<vellum_core::Result<Vec<_>>>()
    });
    let items = fx.session.table("item").unwrap();
    let group = DistinctDescriptor::on(ColumnPath::column(GROUP));
    let desc = SortDescriptor::desc(ColumnPath::column(VALUE));

    let distinct_then_sort = items.distinct(group.clone()).sort(desc.clone());
    let sort_then_distinct = items.sort(desc).distinct(group);
    assert_eq!(distinct_then_sort.keys().unwrap(), vec![k[2], k[0]]);
    assert_eq!(sort_then_distinct.keys().unwrap(), vec![k[2], k[1]]);

    // Both stay live independently.
    let (_a, first) = record(&distinct_then_sort, &[]);
    let (_b, second) = record(&sort_then_distinct, &[]);
    fx.settle();
    fx.write(|tx| tx.insert(ITEM, vec![Value::Int(5), Value::from("A")]).map(|_| ()));
    fx.settle();

    assert_eq!(first.borrow().len(), 1);
    let second = second.borrow();
    assert_eq!(second.len(), 2);
    let changes = &second[1];
    assert_eq!(changes.insertions.to_vec(), vec![0]);
    assert_eq!(changes.deletions.to_vec(), vec![1]);
}

#[test]
fn test_commits_between_deliveries_collapse() {
    let fx = Fixture::new(items_schema());
    let k = insert_items(&fx, &[1, 2, 3]);
    let items = fx.session.table("item").unwrap();
    let (_token, log) = record(&items, &[]);
    fx.settle();

    // Each commit runs the notifier, but nothing is delivered in between.
    // Writing from this session would deliver on every begin_write.
    let writer = Session::open(&fx.coordinator, QueueScheduler::new(), SessionConfig::default());
    writer.write(|tx| tx.delete(ITEM, k[0])).unwrap();
    fx.coordinator.run_async_notifiers();
    let added = writer
        .write(|tx| tx.insert(ITEM, vec![Value::Int(4), Value::from("a")]))
        .unwrap();
    fx.coordinator.run_async_notifiers();
    writer.write(|tx| tx.delete(ITEM, added)).unwrap();
    fx.coordinator.run_async_notifiers();
    writer
        .write(|tx| tx.set(ITEM, k[2], VALUE, Value::Int(30)))
        .unwrap();
    fx.settle();

    let log = log.borrow();
    assert_eq!(log.len(), 2);
    let changes = &log[1];
    assert_eq!(changes.deletions.to_vec(), vec![0]);
    assert!(changes.insertions.is_empty());
    assert_eq!(changes.modifications.to_vec(), vec![2]);
    assert_eq!(changes.modifications_new.to_vec(), vec![1]);
    assert_eq!((changes.old_len, changes.new_len), (3, 2));
}

#[test]
fn test_suppress_next_skips_one_commit() {
    let fx = Fixture::new(items_schema());
    let items = fx.session.table("item").unwrap();
    let (token, log) = record(&items, &[]);
    let (_other, other_log) = record(&items, &[]);
    fx.settle();

    fx.session.begin_write().unwrap();
    token.suppress_next().unwrap();
    fx.session
        .with_transaction(|tx| tx.insert(ITEM, vec![Value::Int(1), Value::from("a")]))
        .unwrap();
    fx.session.commit_write().unwrap();
    fx.settle();

    assert_eq!(log.borrow().len(), 1);
    assert_eq!(other_log.borrow().len(), 2);

    insert_items(&fx, &[2]);
    fx.settle();
    let log = log.borrow();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].insertions.to_vec(), vec![1]);
    assert_eq!((log[1].old_len, log[1].new_len), (1, 2));
}

#[test]
fn test_suppress_next_keeps_earlier_commits() {
    let fx = Fixture::new(items_schema());
    let items = fx.session.table("item").unwrap();
    let (token, log) = record(&items, &[]);
    fx.settle();

    // Not delivered before the suppressed commit follows.
    insert_items(&fx, &[1]);
    fx.session.begin_write().unwrap();
    token.suppress_next().unwrap();
    fx.session
        .with_transaction(|tx| tx.insert(ITEM, vec![Value::Int(2), Value::from("a")]))
        .unwrap();
    fx.session.commit_write().unwrap();
    fx.settle();

    let log = log.borrow();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].insertions.to_vec(), vec![0]);
    assert_eq!(log[1].new_len, 1);
}

#[test]
fn test_suppress_next_outside_write_fails() {
    let fx = Fixture::new(items_schema());
    let items = fx.session.table("item").unwrap();
    let (token, _log) = record(&items, &[]);
    assert!(matches!(token.suppress_next(), Err(Error::InvalidState(_))));
}

#[test]
fn test_cancelled_write_clears_suppression() {
    let fx = Fixture::new(items_schema());
    let items = fx.session.table("item").unwrap();
    let (token, log) = record(&items, &[]);
    fx.settle();

    fx.session.begin_write().unwrap();
    token.suppress_next().unwrap();
    fx.session.cancel_write().unwrap();

    insert_items(&fx, &[1]);
    fx.settle();
    assert_eq!(log.borrow().len(), 2);
}

#[test]
fn test_key_path_isolation() {
    let fx = Fixture::new(people_schema());
    let ann = fx.write(|tx| tx.insert(PERSON, vec![Value::from("Ann"), Value::Int(30)]));
    let people = fx.session.table("person").unwrap();
    let (_named, names) = record(&people, &["name"]);
    let (_all, all) = record(&people, &[]);
    fx.settle();

    fx.write(|tx| tx.set(PERSON, ann, AGE, Value::Int(31)));
    fx.settle();
    assert_eq!(names.borrow().len(), 1);
    assert_eq!(all.borrow().len(), 2);
    assert_eq!(all.borrow()[1].modifications.to_vec(), vec![0]);

    fx.write(|tx| tx.set(PERSON, ann, NAME, Value::from("Anna")));
    fx.settle();
    assert_eq!(names.borrow().len(), 2);
    assert_eq!(names.borrow()[1].modifications.to_vec(), vec![0]);
}

#[test]
fn test_linked_key_paths() {
    let fx = Fixture::new(people_schema());
    let (ann, _rex) = fx.write(|tx| {
        let ann = tx.insert(PERSON, vec![Value::from("Ann"), Value::Int(30)])?;
        let rex = tx.insert(DOG, vec![Value::from("Rex"), Value::Link(Some(ann))])?;
        Ok((ann, rex))
    });
    let dogs = fx.session.table("dog").unwrap();
    let (_owner_name, owner_names) = record(&dogs, &["owner.name"]);
    let (_deep, deep) = record(&dogs, &[]);
    fx.settle();

    // The owner's age is reachable through the link but not on the path.
    fx.write(|tx| tx.set(PERSON, ann, AGE, Value::Int(31)));
    fx.settle();
    assert_eq!(owner_names.borrow().len(), 1);
    assert_eq!(deep.borrow().len(), 2);
    assert_eq!(
        deep.borrow()[1].column_modifications(OWNER).map(|s| s.to_vec()),
        Some(vec![0])
    );

    fx.write(|tx| tx.set(PERSON, ann, NAME, Value::from("Anna")));
    fx.settle();
    assert_eq!(owner_names.borrow().len(), 2);
    assert_eq!(owner_names.borrow()[1].modifications.to_vec(), vec![0]);
}

#[test]
fn test_backlink_key_paths() {
    let fx = Fixture::new(people_schema());
    let (ann, rex) = fx.write(|tx| {
        let ann = tx.insert(PERSON, vec![Value::from("Ann"), Value::Int(30)])?;
        let rex = tx.insert(DOG, vec![Value::from("Rex"), Value::Link(Some(ann))])?;
        Ok((ann, rex))
    });
    let people = fx.session.table("person").unwrap();
    let (_links, linked) = record(&people, &["@links.dog.owner"]);
    let (_names, dog_names) = record(&people, &["@links.dog.owner.name"]);
    fx.settle();

    fx.write(|tx| tx.insert(DOG, vec![Value::from("Fido"), Value::Link(Some(ann))]).map(|_| ()));
    fx.settle();
    assert_eq!(linked.borrow().len(), 2);
    assert_eq!(linked.borrow()[1].modifications.to_vec(), vec![0]);
    assert_eq!(dog_names.borrow().len(), 2);

    fx.write(|tx| tx.set(DOG, rex, NAME, Value::from("Rexy")));
    fx.settle();
    assert_eq!(linked.borrow().len(), 2);
    assert_eq!(dog_names.borrow().len(), 3);
}

#[test]
fn test_invalid_key_path_is_rejected() {
    let fx = Fixture::new(people_schema());
    let dogs = fx.session.table("dog").unwrap();
    assert!(dogs
        .add_notification_callback(CollectionCallback::changes(|_| {}), &["name.first"])
        .is_err());
    assert!(dogs
        .add_notification_callback(CollectionCallback::changes(|_| {}), &["missing"])
        .is_err());
    assert_eq!(fx.coordinator.notifier_count(), 0);
}

#[test]
fn test_object_notifications() {
    let fx = Fixture::new(people_schema());
    let ann = fx.write(|tx| tx.insert(PERSON, vec![Value::from("Ann"), Value::Int(30)]));
    let object = fx.session.object("person", ann).unwrap();
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    let _token = object
        .observe(move |c| sink.borrow_mut().extend(c.ok().cloned()))
        .unwrap();
    fx.settle();

    fx.write(|tx| tx.set(PERSON, ann, AGE, Value::Int(31)));
    fx.settle();
    fx.write(|tx| tx.delete(PERSON, ann));
    fx.settle();

    let log = log.borrow();
    assert_eq!(log.len(), 3);
    assert_eq!(log[0].new_len, 1);
    assert_eq!(log[1].modifications.to_vec(), vec![0]);
    assert_eq!(log[2].deletions.to_vec(), vec![0]);
    assert_eq!(log[2].new_len, 0);
    assert!(matches!(
        object.observe(|_| {}),
        Err(Error::ObjectDeleted { .. })
    ));
}

#[test]
fn test_error_then_add() {
    let fx = Fixture::new(items_schema());
    let items = fx.session.table("item").unwrap();
    let outcomes: Rc<RefCell<Vec<Result<ChangeSet, Error>>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = outcomes.clone();
    let failing = items
        .add_notification_callback(
            CollectionCallback::outcome(move |r| sink.borrow_mut().push(r.cloned().map_err(Clone::clone))),
            &[],
        )
        .unwrap();

    fx.coordinator.store().fail_points().arm(FailPoint::OpenSnapshot);
    fx.settle();

    assert_eq!(outcomes.borrow().len(), 1);
    assert!(matches!(outcomes.borrow()[0], Err(Error::NotifierRunFailed(_))));
    assert!(!failing.is_registered());

    let (_token, log) = record(&items, &[]);
    fx.settle();
    assert_eq!(outcomes.borrow().len(), 1);
    assert_eq!(log.borrow().len(), 1);
    assert!(log.borrow()[0].is_empty());
}

#[test]
fn test_write_inside_callback() {
    let fx = Fixture::new(items_schema());
    let items = fx.session.table("item").unwrap();
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let (sink, session) = (log.clone(), fx.session.clone());
    let _token = items
        .observe(move |c| {
            sink.borrow_mut().extend(c.ok().cloned());
            if sink.borrow().len() < 3 {
                session
                    .write(|tx| tx.insert(ITEM, vec![Value::Int(0), Value::from("a")]).map(|_| ()))
                    .unwrap();
            }
        })
        .unwrap();
    fx.settle();

    let log = log.borrow();
    assert_eq!(log.len(), 3);
    assert!(log[0].is_empty());
    assert_eq!(log[1].insertions.to_vec(), vec![0]);
    assert_eq!(log[2].insertions.to_vec(), vec![1]);
    assert_eq!(items.len().unwrap(), 2);
}

#[test]
fn test_refresh_inside_callback_is_ignored() {
    let fx = Fixture::new(items_schema());
    let items = fx.session.table("item").unwrap();
    let refreshed = Rc::new(RefCell::new(Vec::new()));
    let (sink, session) = (refreshed.clone(), fx.session.clone());
    let _token = items
        .observe(move |_| sink.borrow_mut().push(session.refresh()))
        .unwrap();
    fx.settle();
    assert_eq!(*refreshed.borrow(), vec![false]);
}

#[test]
fn test_add_and_remove_during_delivery() {
    let fx = Fixture::new(items_schema());
    let items = fx.session.table("item").unwrap();
    let later: Log = Rc::new(RefCell::new(Vec::new()));
    let removed_calls = Rc::new(RefCell::new(0));

    let slot: Rc<RefCell<Option<Collection>>> = Rc::new(RefCell::new(Some(items.clone())));
    let victim: Rc<RefCell<Option<NotificationToken>>> = Rc::new(RefCell::new(None));
    let added: Rc<RefCell<Vec<NotificationToken>>> = Rc::new(RefCell::new(Vec::new()));

    let (s, v, a, l) = (slot.clone(), victim.clone(), added.clone(), later.clone());
    let _first = items
        .observe(move |c| {
            if c.map_or(true, ChangeSet::is_empty) {
                return;
            }
            // Drop the callback registered after this one, add a new one.
            v.borrow_mut().take();
            if !a.borrow().is_empty() {
                return;
            }
            if let Some(collection) = s.borrow().as_ref() {
                let sink = l.clone();
                let token = collection
                    .observe(move |c| sink.borrow_mut().extend(c.ok().cloned()))
                    .unwrap();
                a.borrow_mut().push(token);
            }
        })
        .unwrap();
    let counter = removed_calls.clone();
    *victim.borrow_mut() = Some(items.observe(move |_| *counter.borrow_mut() += 1).unwrap());
    fx.settle();
    assert_eq!(*removed_calls.borrow(), 1);

    insert_items(&fx, &[1]);
    fx.settle();
    assert_eq!(*removed_calls.borrow(), 1);
    assert!(later.borrow().is_empty());

    insert_items(&fx, &[2]);
    fx.settle();
    {
        let later = later.borrow();
        assert_eq!(later.len(), 2);
        assert!(later[0].is_empty());
        assert_eq!(later[0].new_len, 1);
        assert_eq!(later[1].insertions.to_vec(), vec![1]);
    }

    slot.borrow_mut().take();
    added.borrow_mut().clear();
}

#[test]
fn test_dropped_token_stops_delivery() {
    let fx = Fixture::new(items_schema());
    let items = fx.session.table("item").unwrap();
    let (token, log) = record(&items, &[]);
    fx.settle();
    drop(token);
    assert_eq!(fx.coordinator.notifier_count(), 0);

    insert_items(&fx, &[1]);
    fx.settle();
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn test_before_and_after_see_old_and_new_rows() {
    let fx = Fixture::new(items_schema());
    insert_items(&fx, &[1]);
    let items = fx.session.table("item").unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let slot: Rc<RefCell<Option<Collection>>> = Rc::new(RefCell::new(Some(items.clone())));

    let (before_seen, before_slot) = (seen.clone(), slot.clone());
    let (after_seen, after_slot) = (seen.clone(), slot.clone());
    let _token = items
        .add_notification_callback(
            CollectionCallback::before_after(
                move |_| {
                    let len = before_slot.borrow().as_ref().map(|c| c.len().unwrap());
                    before_seen.borrow_mut().push(("before", len));
                },
                move |_| {
                    let len = after_slot.borrow().as_ref().map(|c| c.len().unwrap());
                    after_seen.borrow_mut().push(("after", len));
                },
            ),
            &[],
        )
        .unwrap();
    fx.settle();

    // Written by another session so that only the delivery advances this one.
    let other = Session::open(&fx.coordinator, QueueScheduler::new(), SessionConfig::default());
    other
        .write(|tx| tx.insert(ITEM, vec![Value::Int(2), Value::from("a")]).map(|_| ()))
        .unwrap();
    fx.settle();

    assert_eq!(
        *seen.borrow(),
        vec![
            ("before", Some(1)),
            ("after", Some(1)),
            ("before", Some(1)),
            ("after", Some(2)),
        ]
    );
    slot.borrow_mut().take();
}

#[test]
fn test_manual_refresh_policy() {
    let schema = items_schema();
    let coordinator = Coordinator::new(
        "manual-refresh",
        VersionedStore::new(schema),
        Arc::new(ScanEvaluator),
        CoordinatorConfig::manual(),
    );
    let scheduler = QueueScheduler::new();
    let session = Session::open(
        &coordinator,
        scheduler.clone(),
        SessionConfig {
            auto_refresh: false,
        },
    );
    let items = session.table("item").unwrap();
    let (_token, log) = record(&items, &[]);
    coordinator.run_async_notifiers();
    scheduler.run_pending();
    assert_eq!(log.borrow().len(), 1);

    let writer = Session::open(&coordinator, QueueScheduler::new(), SessionConfig::default());
    writer
        .write(|tx| tx.insert(ITEM, vec![Value::Int(1), Value::from("a")]).map(|_| ()))
        .unwrap();
    coordinator.run_async_notifiers();
    scheduler.run_pending();
    assert_eq!(log.borrow().len(), 1);
    assert_eq!(items.len().unwrap(), 0);

    assert!(session.refresh());
    assert_eq!(log.borrow().len(), 2);
    assert_eq!(items.len().unwrap(), 1);
}

#[test]
fn test_refresh_waits_for_first_run_only() {
    let fx = Fixture::with_config(items_schema(), CoordinatorConfig::default());
    assert!(fx.coordinator.has_worker());
    insert_items(&fx, &[1, 2]);
    let items = fx.session.table("item").unwrap();
    let (_token, log) = record(&items, &[]);

    fx.session.refresh();
    assert_eq!(log.borrow().len(), 1);
    assert_eq!(log.borrow()[0].new_len, 2);

    insert_items(&fx, &[3]);
    let deadline = Instant::now() + Duration::from_secs(10);
    while log.borrow().len() < 2 && Instant::now() < deadline {
        fx.scheduler.run_pending();
        std::thread::sleep(Duration::from_millis(1));
    }
    let log = log.borrow();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].insertions.to_vec(), vec![2]);
}

fn chain_schema() -> Schema {
    Schema::builder()
        .table(
            TableBuilder::new("holder")
                .unwrap()
                .add_link("node", "node")
                .unwrap(),
        )
        .table(
            TableBuilder::new("node")
                .unwrap()
                .add_column("v", DataType::Int)
                .unwrap()
                .add_link("next", "node")
                .unwrap(),
        )
        .build()
        .unwrap()
}

#[test]
fn test_linked_change_found_at_any_depth_within_limit() {
    const HOLDER: u32 = 0;
    const NODE: u32 = 1;
    let fx = Fixture::new(chain_schema());
    // far -> n1 -> n2 -> n3 -> n4 -> n5, near -> n2
    let (nodes, far, near) = fx.write(|tx| {
        let mut nodes = Vec::new();
        let mut next = Value::Link(None);
        for v in (1..=5).rev() {
            let key = tx.insert(NODE, vec![Value::Int(v), next])?;
            nodes.insert(0, key);
            next = Value::from(key);
        }
        let far = tx.insert(HOLDER, vec![Value::from(nodes[0])])?;
        let near = tx.insert(HOLDER, vec![Value::from(nodes[1])])?;
        Ok((nodes, far, near))
    });
    let holders = fx.session.table("holder").unwrap();
    let (_token, log) = record(&holders, &[]);
    fx.settle();
    assert_eq!(holders.keys().unwrap(), vec![far, near]);

    fx.write(|tx| tx.set(NODE, nodes[4], 0, Value::Int(50)));
    fx.settle();

    let log = log.borrow();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].modifications.to_vec(), vec![1]);
}

#[test]
fn test_link_to_same_table_reports_modification() {
    let schema = Schema::builder()
        .table(
            TableBuilder::new("person")
                .unwrap()
                .add_column("name", DataType::String)
                .unwrap()
                .add_link("friend", "person")
                .unwrap(),
        )
        .build()
        .unwrap();
    let fx = Fixture::new(schema);
    let (bo, _ann) = fx.write(|tx| {
        let bo = tx.insert(PERSON, vec![Value::from("Bo"), Value::Link(None)])?;
        let ann = tx.insert(PERSON, vec![Value::from("Ann"), Value::from(bo)])?;
        Ok((bo, ann))
    });
    let people = fx.session.table("person").unwrap();
    let (_token, log) = record(&people, &[]);
    fx.settle();

    fx.write(|tx| tx.set(PERSON, bo, NAME, Value::from("Bob")));
    fx.settle();

    let log = log.borrow();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].modifications.to_vec(), vec![0, 1]);
}

#[test]
fn test_token_dropped_between_run_and_delivery() {
    let fx = Fixture::new(items_schema());
    let items = fx.session.table("item").unwrap();
    let (token, dropped) = record(&items, &[]);
    let (_kept, kept) = record(&items, &[]);
    fx.settle();

    insert_items(&fx, &[1]);
    fx.coordinator.run_async_notifiers();
    drop(token);
    fx.scheduler.run_pending();

    assert_eq!(dropped.borrow().len(), 1);
    assert_eq!(kept.borrow().len(), 2);
    assert_eq!(kept.borrow()[1].insertions.to_vec(), vec![0]);
}

#[test]
fn test_one_notify_delivers_every_collection() {
    let fx = Fixture::new(items_schema());
    let items = fx.session.table("item").unwrap();
    let sorted = items.sort(by_value());
    let (_a, unsorted_log) = record(&items, &[]);
    let (_b, sorted_log) = record(&sorted, &[]);
    fx.settle();

    insert_items(&fx, &[3, 1]);
    fx.coordinator.run_async_notifiers();
    fx.session.notify();

    assert_eq!(fx.session.read_version(), fx.coordinator.store().current_version());
    assert_eq!(unsorted_log.borrow().len(), 2);
    assert_eq!(sorted_log.borrow().len(), 2);
    assert_eq!(unsorted_log.borrow()[1].insertions.to_vec(), vec![0, 1]);
    assert_eq!(sorted_log.borrow()[1].insertions.to_vec(), vec![0, 1]);

    fx.scheduler.run_pending();
    assert_eq!(unsorted_log.borrow().len(), 2);
    assert_eq!(sorted_log.borrow().len(), 2);
}

#[test]
fn test_observe_receives_error() {
    let fx = Fixture::new(items_schema());
    let items = fx.session.table("item").unwrap();
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = errors.clone();
    let token = items
        .observe(move |r| {
            if let Err(e) = r {
                sink.borrow_mut().push(e.clone());
            }
        })
        .unwrap();

    let before_after_errors = Rc::new(RefCell::new(0));
    let counter = before_after_errors.clone();
    let paired = items
        .add_notification_callback(
            CollectionCallback::before_after(|_| {}, |_| {})
                .on_error(move |_| *counter.borrow_mut() += 1),
            &[],
        )
        .unwrap();

    fx.coordinator.store().fail_points().arm(FailPoint::OpenSnapshot);
    fx.settle();

    assert_eq!(errors.borrow().len(), 1);
    assert!(matches!(errors.borrow()[0], Error::NotifierRunFailed(_)));
    assert_eq!(*before_after_errors.borrow(), 1);
    assert!(!token.is_registered());
    assert!(!paired.is_registered());
}
