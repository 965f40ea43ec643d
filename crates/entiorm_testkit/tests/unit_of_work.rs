//! Unit-of-work behaviour shared by every backend.

use std::sync::Arc;

use entiorm_core::{ContextState, CoreError, ErrorKind, IsolationLevel};
use entiorm_testkit::prelude::*;
use parking_lot::Mutex;
use serde_json::json;

fn with_extra(name: &str, key: &str, value: serde_json::Value) -> TestTable {
    let mut row = TestTable::named(name);
    row.extra.insert(key.to_string(), value);
    row
}

#[test]
fn saved_rows_round_trip_by_key() {
    with_factory(TestBackend::all(), |factory| {
        let backend = factory.backend();
        let mut row = with_extra("round", "size", json!(3));
        factory.commit(|ctx| ctx.save(&mut row).unwrap());

        let mut ctx = factory.context();
        let id = row.id;
        let fetched = ctx.get::<TestTable>(|t| t.id == id).unwrap();
        assert_eq!(fetched, Some(row), "{backend}");
    });
}

#[test]
fn generated_keys_are_written_back() {
    with_factory(TestBackend::all(), |factory| {
        let backend = factory.backend();
        let mut ctx = factory.context();
        let mut first = TestTable::named("a");
        let mut second = TestTable::named("b");
        ctx.save(&mut first).unwrap();
        ctx.save(&mut second).unwrap();
        assert_ne!(first.id, 0, "{backend}");
        assert_ne!(first.id, second.id, "{backend}");

        let mut login = LoginSession {
            user: "ada".into(),
            ..LoginSession::default()
        };
        ctx.save(&mut login).unwrap();
        assert!(!login.id.is_nil(), "{backend}");
        ctx.save_changes().unwrap();
    });
}

#[test]
fn second_save_updates_instead_of_inserting() {
    with_factory(TestBackend::all(), |factory| {
        let backend = factory.backend();
        let mut row = TestTable::named("twice");
        factory.commit(|ctx| ctx.save(&mut row).unwrap());

        factory.commit(|ctx| {
            row.name = "twice-renamed".into();
            ctx.save(&mut row).unwrap();
        });

        let mut ctx = factory.context();
        let id = row.id;
        assert_eq!(ctx.count::<TestTable>(|t| t.id == id).unwrap(), 1, "{backend}");
        assert_eq!(ctx.count::<TestTable>(|_| true).unwrap(), 1, "{backend}");
        let stored = ctx.get::<TestTable>(|t| t.id == id).unwrap().unwrap();
        assert_eq!(stored.name, "twice-renamed", "{backend}");
    });
}

#[test]
fn update_where_returns_matched_count() {
    with_factory(TestBackend::all(), |factory| {
        let backend = factory.backend();
        factory.commit(|ctx| {
            for name in ["red", "red", "red", "blue"] {
                ctx.save(&mut TestTable::named(name)).unwrap();
            }
        });

        let updated = factory.commit(|ctx| {
            ctx.update_where::<TestTable>(|t| t.name == "red", |t| t.name = "green".into())
                .unwrap()
        });
        assert_eq!(updated, 3, "{backend}");

        let mut ctx = factory.context();
        assert_eq!(ctx.count::<TestTable>(|t| t.name == "green").unwrap(), 3, "{backend}");
        assert_eq!(ctx.count::<TestTable>(|t| t.name == "red").unwrap(), 0, "{backend}");
        assert_eq!(ctx.count::<TestTable>(|t| t.name == "blue").unwrap(), 1, "{backend}");
    });
}

#[test]
fn delete_where_removes_only_matches() {
    with_factory(TestBackend::all(), |factory| {
        let backend = factory.backend();
        factory.commit(|ctx| {
            for name in ["keep", "drop", "drop", "keep-too"] {
                ctx.save(&mut TestTable::named(name)).unwrap();
            }
        });

        let deleted = factory.commit(|ctx| ctx.delete_where::<TestTable>(|t| t.name == "drop").unwrap());
        assert_eq!(deleted, 2, "{backend}");

        let mut ctx = factory.context();
        assert!(ctx.get::<TestTable>(|t| t.name == "drop").unwrap().is_none(), "{backend}");
        let mut names = ctx.query::<TestTable>().select(|t| t.name.clone()).unwrap();
        names.sort();
        assert_eq!(names, vec!["keep", "keep-too"], "{backend}");
    });
}

#[test]
fn test_table_scenario() {
    with_factory(TestBackend::all(), |factory| {
        let backend = factory.backend();
        factory.commit(|ctx| {
            ctx.save(&mut TestTable::named("TestName")).unwrap();
            ctx.save(&mut TestTable::named("OtherName")).unwrap();
        });
        assert_eq!(factory.context().count::<TestTable>(|_| true).unwrap(), 2, "{backend}");

        factory.commit(|ctx| {
            ctx.update_where::<TestTable>(
                |t| t.name == "TestName",
                |t| {
                    t.name = "TestNameUpdated".into();
                    t.extra.insert("TestKey".into(), json!("TestValue"));
                },
            )
            .unwrap()
        });
        let updated = factory
            .context()
            .get::<TestTable>(|t| t.name == "TestNameUpdated")
            .unwrap()
            .unwrap();
        assert_eq!(updated.extra.get("TestKey"), Some(&json!("TestValue")), "{backend}");

        factory.commit(|ctx| ctx.delete_where::<TestTable>(|t| t.name == "TestNameUpdated").unwrap());
        let mut ctx = factory.context();
        assert!(ctx.get::<TestTable>(|t| t.name == "TestNameUpdated").unwrap().is_none(), "{backend}");
        assert!(ctx.get::<TestTable>(|t| t.name == "OtherName").unwrap().is_some(), "{backend}");
    });
}

#[test]
fn nested_serialized_member_round_trips() {
    with_factory(TestBackend::all(), |factory| {
        let backend = factory.backend();
        let nested = json!({
            "list": [1, "two", null, {"deep": true}],
            "map": {"a": {"b": {"c": "d"}}},
            "negative": -17,
        });
        let mut row = with_extra("nested", "payload", nested.clone());
        row.extra.insert("flag".into(), json!(false));
        factory.commit(|ctx| ctx.save(&mut row).unwrap());

        let id = row.id;
        let fetched = factory
            .context()
            .get::<TestTable>(|t| t.id == id)
            .unwrap()
            .unwrap();
        assert_eq!(fetched.extra.get("payload"), Some(&nested), "{backend}");
        assert_eq!(fetched.extra, row.extra, "{backend}");
    });
}

#[test]
fn dispose_without_commit_discards_writes() {
    with_factory(TestBackend::transactional(), |factory| {
        let backend = factory.backend();
        factory.commit(|ctx| ctx.save(&mut TestTable::named("committed")).unwrap());

        let mut ctx = factory.context();
        ctx.save(&mut TestTable::named("pending")).unwrap();
        ctx.update_where::<TestTable>(|t| t.name == "committed", |t| t.name = "changed".into())
            .unwrap();
        ctx.dispose();
        assert_eq!(ctx.state(), ContextState::Disposed);

        let mut ctx = factory.context();
        let names = ctx.query::<TestTable>().select(|t| t.name.clone()).unwrap();
        assert_eq!(names, vec!["committed"], "{backend}");
    });
}

#[test]
fn dropping_a_context_discards_writes() {
    with_factory(TestBackend::transactional(), |factory| {
        let backend = factory.backend();
        {
            let mut ctx = factory.context();
            ctx.save(&mut TestTable::named("dropped")).unwrap();
        }
        assert_eq!(factory.context().count::<TestTable>(|_| true).unwrap(), 0, "{backend}");
    });
}

#[test]
fn context_stays_open_after_save_changes() {
    with_factory(TestBackend::transactional(), |factory| {
        let backend = factory.backend();
        let mut ctx = factory.context();
        ctx.save(&mut TestTable::named("first")).unwrap();
        ctx.save_changes().unwrap();
        assert_eq!(ctx.state(), ContextState::Open);
        ctx.save(&mut TestTable::named("second")).unwrap();
        assert_eq!(ctx.count::<TestTable>(|_| true).unwrap(), 2, "{backend}");
        drop(ctx);

        let names = factory.context().query::<TestTable>().select(|t| t.name.clone()).unwrap();
        assert_eq!(names, vec!["first"], "{backend}");
    });
}

#[test]
fn writes_are_visible_inside_their_context() {
    with_factory(TestBackend::all(), |factory| {
        let backend = factory.backend();
        let mut ctx = factory.context();
        let mut row = TestTable::named("mine");
        ctx.save(&mut row).unwrap();
        let id = row.id;
        assert!(ctx.get::<TestTable>(|t| t.id == id).unwrap().is_some(), "{backend}");
        ctx.delete(&row).unwrap();
        assert!(ctx.get::<TestTable>(|t| t.id == id).unwrap().is_none(), "{backend}");
    });
}

#[test]
fn callbacks_fire_once_in_registration_order() {
    for backend in [TestBackend::SessionMemory, TestBackend::ModelSqlite, TestBackend::DocumentMemory] {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let container = fixture_container();
        container
            .register_save_callback::<TestTable, _>(Recorder::new("first", &log))
            .register_save_callback::<TestTable, _>(Recorder::new("second", &log))
            .register_delete_callback::<TestTable, _>(Recorder::new("first", &log));
        let factory = backend.factory_with(container);

        let mut ctx = factory.context();
        let mut row = TestTable::named("watched");
        ctx.save(&mut row).unwrap();
        assert_eq!(
            *log.lock(),
            vec!["before_save:first", "before_save:second", "after_save:first", "after_save:second"],
            "{backend}"
        );

        log.lock().clear();
        ctx.delete(&row).unwrap();
        assert_eq!(*log.lock(), vec!["before_delete:first", "after_delete:first"], "{backend}");
        ctx.save_changes().unwrap();
    }
}

#[test]
fn before_save_changes_are_persisted() {
    for backend in TestBackend::all() {
        let container = fixture_container();
        container.register_save_callback::<TestTable, _>(Stamp);
        let factory = backend.factory_with(container);

        let mut row = TestTable::named("stamped");
        factory.commit(|ctx| ctx.save(&mut row).unwrap());
        assert_eq!(row.extra.get("stamped"), Some(&json!(true)), "{backend}");

        let id = row.id;
        let fetched = factory.context().get::<TestTable>(|t| t.id == id).unwrap().unwrap();
        assert_eq!(fetched.extra.get("stamped"), Some(&json!(true)), "{backend}");
    }
}

#[test]
fn save_with_applies_update_after_callbacks() {
    with_factory([TestBackend::SessionMemory, TestBackend::MapperSqlite], |factory| {
        let mut row = TestTable::named("draft");
        factory.commit(|ctx| ctx.save_with(&mut row, |t| t.name = "final".into()).unwrap());
        assert_eq!(row.name, "final");
        let stored = factory.context().get::<TestTable>(|t| t.name == "final").unwrap();
        assert_eq!(stored, Some(row));
    });
}

#[test]
fn failing_callback_faults_the_context() {
    for backend in [TestBackend::SessionMemory, TestBackend::DocumentMemory] {
        let container = fixture_container();
        container.register_save_callback::<TestTable, _>(Veto);
        let factory = backend.factory_with(container);

        let mut ctx = factory.context();
        let err = ctx.save(&mut TestTable::named("forbidden")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }), "{backend}: {err}");
        assert_eq!(ctx.state(), ContextState::Faulted);

        let err = ctx.count::<TestTable>(|_| true).unwrap_err();
        assert!(matches!(err, CoreError::ContextFaulted), "{backend}");
        assert_eq!(err.kind(), ErrorKind::Usage);

        ctx.dispose();
        assert!(matches!(ctx.save_changes().unwrap_err(), CoreError::ContextDisposed));
        assert_eq!(factory.context().count::<TestTable>(|_| true).unwrap(), 0, "{backend}");
    }
}

#[test]
fn disposed_context_rejects_every_operation() {
    let factory = TestBackend::SessionMemory.factory();
    let mut ctx = factory.context();
    ctx.dispose();
    ctx.dispose();

    let mut row = TestTable::named("late");
    assert!(matches!(ctx.save(&mut row), Err(CoreError::ContextDisposed)));
    assert!(matches!(ctx.delete(&row), Err(CoreError::ContextDisposed)));
    assert!(matches!(ctx.get::<TestTable>(|_| true), Err(CoreError::ContextDisposed)));
    assert!(matches!(ctx.query::<TestTable>().to_vec(), Err(CoreError::ContextDisposed)));
    assert!(matches!(
        ctx.update_where::<TestTable>(|_| true, |_| {}),
        Err(CoreError::ContextDisposed)
    ));
    assert!(matches!(ctx.delete_where::<TestTable>(|_| true), Err(CoreError::ContextDisposed)));
}

#[test]
fn queries_are_re_enumerable() {
    with_factory(TestBackend::all(), |factory| {
        let backend = factory.backend();
        factory.commit(|ctx| {
            for name in ["alpha", "beta", "gamma", "delta"] {
                ctx.save(&mut TestTable::named(name)).unwrap();
            }
        });

        let mut ctx = factory.context();
        let mut query = ctx
            .query::<TestTable>()
            .filter(|t| t.name.len() == 5)
            .filter(|t| t.name != "gamma");
        assert_eq!(query.count().unwrap(), 2, "{backend}");
        assert_eq!(query.count().unwrap(), 2, "{backend}");
        assert!(query.any().unwrap(), "{backend}");
        let mut names = query.select(|t| t.name.clone()).unwrap();
        names.sort();
        assert_eq!(names, vec!["alpha", "delta"], "{backend}");
        assert!(query.first().unwrap().is_some(), "{backend}");
        assert_eq!(query.to_vec().unwrap().len(), 2, "{backend}");
        drop(query);

        let mut none = ctx.query::<TestTable>().filter(|t| t.name == "omega");
        assert!(!none.any().unwrap(), "{backend}");
        assert!(none.first().unwrap().is_none(), "{backend}");
    });
}

#[test]
fn contexts_report_their_configuration() {
    for backend in TestBackend::all() {
        let factory = backend.factory();
        let ctx = factory.context();
        assert_eq!(ctx.orm(), backend.orm());
        assert_eq!(ctx.database(), backend.database());
        assert_eq!(ctx.isolation_level(), Some(IsolationLevel::ReadCommitted));
        assert_eq!(ctx.state(), ContextState::Open);
        drop(ctx);

        let ctx = factory.create_context_with(Some(IsolationLevel::Serializable)).unwrap();
        assert_eq!(ctx.isolation_level(), Some(IsolationLevel::Serializable));
    }
}

#[test]
fn contexts_without_transaction_write_through() {
    with_factory([TestBackend::SessionMemory, TestBackend::ModelSqlite], |factory| {
        let backend = factory.backend();
        let mut ctx = factory.create_context_with(None).unwrap();
        assert_eq!(ctx.isolation_level(), None);
        ctx.save(&mut TestTable::named("direct")).unwrap();
        drop(ctx);
        assert_eq!(factory.context().count::<TestTable>(|_| true).unwrap(), 1, "{backend}");
    });
}

#[test]
fn uncommitted_writes_are_invisible_to_other_contexts() {
    let factory = TestBackend::SessionMemory.factory();
    let mut writer = factory.context();
    let mut reader = factory.context();

    writer.save(&mut TestTable::named("pending")).unwrap();
    assert_eq!(reader.count::<TestTable>(|_| true).unwrap(), 0);

    writer.save_changes().unwrap();
    assert_eq!(reader.count::<TestTable>(|_| true).unwrap(), 1);
}

#[test]
fn contexts_on_separate_threads() {
    let factory = Arc::new(TestBackend::ModelMemory.factory());
    let handles: Vec<_> = (0..4)
        .map(|n| {
            let factory = Arc::clone(&factory);
            std::thread::spawn(move || {
                let mut ctx = factory.context();
                for i in 0..5 {
                    ctx.save(&mut TestTable::named(&format!("thread-{n}-{i}"))).unwrap();
                }
                ctx.save_changes().unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut ctx = factory.context();
    let mut ids = ctx.query::<TestTable>().select(|t| t.id).unwrap();
    assert_eq!(ids.len(), 20);
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 20);
}
