mod common;

use std::sync::{Arc, Mutex};

use common::{by_age_spec, memory_db, user, Event, Recorder, User, UsersByAge};
use vellum::{ChangeKind, FlatView, ObserverState, PutOutcome, SectionChangeKind};

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[test]
fn users_by_age_end_to_end() {
    let db = memory_db();
    let users = db.collection::<User>("users");
    users.put("u1", user("u1", "Al", 30)).wait().unwrap();

    let observer = users.observe_view(Arc::new(UsersByAge)).unwrap();
    let recorder = Recorder::new();
    observer.add_listener(Arc::clone(&recorder));

    assert_eq!(observer.number_of_groups(), 1);
    assert_eq!(observer.number_of_sections(), 1);
    assert_eq!(observer.number_of_items(0), 1);
    assert_eq!(observer.object_at(0, 0).map(|u| u.name), Some("Al".to_string()));

    users.put("u2", user("u2", "Bo", 10)).wait().unwrap();
    db.flush().unwrap();

    let events = recorder.take();
    assert_eq!(events.len(), 4, "{events:?}");
    assert_eq!(events[0], Event::Begin);
    match &events[1] {
        Event::Section(section) => {
            assert_eq!(section.kind, SectionChangeKind::Insert);
            assert_eq!(section.group, "minor");
        }
        other => panic!("expected a section change, got {other:?}"),
    }
    match &events[2] {
        Event::Row(row) => {
            assert_eq!(row.kind, ChangeKind::Insert);
            let to = row.to.as_ref().unwrap();
            assert_eq!(to.group, "minor");
            assert_eq!(to.index, 0);
        }
        other => panic!("expected a row change, got {other:?}"),
    }
    assert_eq!(events[3], Event::End);
    assert_eq!(observer.number_of_groups(), 2);
}

#[test]
fn listener_sees_new_state_inside_callbacks() {
    struct Probe {
        observer: Mutex<Option<Arc<vellum::ViewObserver<UsersByAge>>>>,
        counts: Mutex<Vec<usize>>,
    }

    impl vellum::ViewListener for Probe {
        fn begin_updates(&self) {
            if let Some(observer) = self.observer.lock().unwrap().as_ref() {
                self.counts.lock().unwrap().push(observer.mappings().total_items());
            }
        }
    }

    let db = memory_db();
    let users = db.collection::<User>("users");
    let observer = Arc::new(users.observe_view(Arc::new(UsersByAge)).unwrap());
    let probe = Arc::new(Probe {
        observer: Mutex::new(Some(Arc::clone(&observer))),
        counts: Mutex::new(Vec::new()),
    });
    observer.add_listener(Arc::clone(&probe));

    users.put_sync("a", &user("a", "Al", 30)).unwrap();
    db.flush().unwrap();
    users.put_sync("b", &user("b", "Bo", 40)).unwrap();
    db.flush().unwrap();

    assert_eq!(*probe.counts.lock().unwrap(), vec![1, 2]);
    probe.observer.lock().unwrap().take();
}

// ---------------------------------------------------------------------------
// Diff shape
// ---------------------------------------------------------------------------

#[test]
fn insert_in_the_middle_is_a_single_insert() {
    let db = memory_db();
    let users = db.collection::<User>("users");
    users
        .put_many_sync([
            ("a", &user("a", "A", 1)),
            ("b", &user("b", "B", 3)),
            ("c", &user("c", "C", 4)),
        ])
        .unwrap();

    let observer = users.observe_flat(by_age_spec(1)).unwrap();
    let recorder = Recorder::new();
    observer.add_listener(Arc::clone(&recorder));

    users.put_sync("d", &user("d", "D", 2)).unwrap();
    db.flush().unwrap();

    let events = recorder.take();
    let rows = Recorder::rows(&events);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].kind, ChangeKind::Insert);
    assert_eq!(rows[0].key, "d");
    assert_eq!(rows[0].to.as_ref().map(|p| p.index), Some(1));
    assert!(!events.iter().any(|e| matches!(e, Event::Section(_))));
    assert_eq!(
        observer.all_objects().into_iter().map(|(k, _)| k).collect::<Vec<_>>(),
        vec!["a", "d", "b", "c"]
    );
}

#[test]
fn changing_the_sort_field_is_a_move() {
    let db = memory_db();
    let users = db.collection::<User>("users");
    users
        .put_objects_sync([&user("a", "A", 1), &user("b", "B", 2), &user("c", "C", 3)])
        .unwrap();

    let view = Arc::new(FlatView::new("by_age", 1, |a: &User, b: &User| a.age.cmp(&b.age)));
    let observer = users.observe_flat(view).unwrap();
    let recorder = Recorder::new();
    observer.add_listener(Arc::clone(&recorder));

    users.put_object_sync(&user("a", "A", 9)).unwrap();
    db.flush().unwrap();

    let rows = Recorder::rows(&recorder.take());
    assert_eq!(rows.len(), 1, "{rows:?}");
    assert_eq!(rows[0].kind, ChangeKind::Move);
    assert_eq!(rows[0].from.as_ref().map(|p| p.index), Some(0));
    assert_eq!(rows[0].to.as_ref().map(|p| p.index), Some(2));
}

#[test]
fn in_place_change_is_an_update() {
    let db = memory_db();
    let users = db.collection::<User>("users");
    users
        .put_objects_sync([&user("a", "Al", 30), &user("b", "Bo", 40)])
        .unwrap();
    let observer = users.observe_view(Arc::new(UsersByAge)).unwrap();
    let recorder = Recorder::new();
    observer.add_listener(Arc::clone(&recorder));

    users.put_object_sync(&user("b", "Bo", 41)).unwrap();
    db.flush().unwrap();

    let rows = Recorder::rows(&recorder.take());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].kind, ChangeKind::Update);
    assert_eq!(rows[0].key, "b");
    assert_eq!(observer.object_at(0, 1).map(|u| u.age), Some(41));
}

#[test]
fn removal_reports_delete_and_section_delete() {
    let db = memory_db();
    let users = db.collection::<User>("users");
    users
        .put_objects_sync([&user("a", "Al", 30), &user("b", "Bo", 10)])
        .unwrap();
    let observer = users.observe_view(Arc::new(UsersByAge)).unwrap();
    let recorder = Recorder::new();
    observer.add_listener(Arc::clone(&recorder));

    users.remove("b").wait().unwrap();
    db.flush().unwrap();

    let events = recorder.take();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::Section(s) if s.kind == SectionChangeKind::Delete && s.group == "minor" && s.section == 1
    )));
    let rows = Recorder::rows(&events);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].kind, ChangeKind::Delete);
    assert_eq!(rows[0].from.as_ref().map(|p| (p.section, p.index)), Some((1, 0)));
    assert_eq!(observer.number_of_sections(), 1);
}

// ---------------------------------------------------------------------------
// Write suppression
// ---------------------------------------------------------------------------

#[test]
fn identical_put_writes_once() {
    let db = memory_db();
    let users = db.collection::<User>("users");
    let al = user("u1", "Al", 30);

    assert_eq!(users.put_sync("u1", &al).unwrap(), PutOutcome::Written);
    let commit = db.commit();
    let before = users.metadata("u1").unwrap().unwrap();

    assert_eq!(users.put("u1", al.clone()).wait().unwrap(), PutOutcome::Unchanged);
    assert_eq!(db.commit(), commit);
    assert_eq!(users.metadata("u1").unwrap().unwrap(), before);
}

#[test]
fn suppressed_put_does_not_notify() {
    let db = memory_db();
    let users = db.collection::<User>("users");
    users.put_sync("u1", &user("u1", "Al", 30)).unwrap();
    let observer = users.observe_key("u1").unwrap();
    let calls = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&calls);
    observer.add_listener(move |_| *counter.lock().unwrap() += 1);

    users.put_sync("u1", &user("u1", "Al", 30)).unwrap();
    db.flush().unwrap();
    assert_eq!(*calls.lock().unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Key and collection observers
// ---------------------------------------------------------------------------

#[test]
fn key_observer_follows_queued_writes() {
    let db = memory_db();
    let users = db.collection::<User>("users");
    let observer = users.observe_key("u1").unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    observer.add_listener(move |value: &Option<User>| {
        sink.lock().unwrap().push(value.as_ref().map(|u| u.age));
    });

    users.put("u1", user("u1", "Al", 30)).wait().unwrap();
    db.flush().unwrap();
    users.put("u1", user("u1", "Al", 31)).wait().unwrap();
    db.flush().unwrap();
    users.remove("u1").wait().unwrap();
    db.flush().unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![Some(30), Some(31), None]);
    assert_eq!(observer.get(), None);
}

#[test]
fn collection_observer_sees_replace_all() {
    let db = memory_db();
    let users = db.collection::<User>("users");
    users.put_sync("old", &user("old", "Old", 99)).unwrap();
    let observer = users.observe().unwrap();

    users
        .replace_all(vec![
            ("x".to_string(), user("x", "X", 1)),
            ("y".to_string(), user("y", "Y", 2)),
        ])
        .wait()
        .unwrap();
    db.flush().unwrap();

    let keys: Vec<String> = observer.objects().iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(keys, vec!["x", "y"]);
}

// ---------------------------------------------------------------------------
// Disposal
// ---------------------------------------------------------------------------

#[test]
fn disposed_observer_never_calls_back() {
    let db = memory_db();
    let users = db.collection::<User>("users");
    let observer = users.observe_view(Arc::new(UsersByAge)).unwrap();
    let recorder = Recorder::new();
    observer.add_listener(Arc::clone(&recorder));

    users.put_sync("u1", &user("u1", "Al", 30)).unwrap();
    observer.dispose();
    assert_eq!(observer.state(), ObserverState::Disposed);
    let delivered = recorder.take().len();
    assert!(delivered == 0 || delivered == 4);

    for i in 0..5 {
        users.put_sync(&format!("n{i}"), &user("n", "N", i)).unwrap();
    }
    db.flush().unwrap();
    assert!(recorder.take().is_empty());
}

#[test]
fn observers_stop_when_the_database_closes() {
    let db = memory_db();
    let users = db.collection::<User>("users");
    let observer = users.observe_key("u1").unwrap();
    db.close().unwrap();

    assert!(matches!(users.observe_key("u1"), Err(vellum::VellumError::Closed)));
    assert!(matches!(users.put_sync("u1", &user("u1", "Al", 1)), Err(vellum::VellumError::Closed)));
    assert!(observer.value().is_none());
    observer.dispose();
}
