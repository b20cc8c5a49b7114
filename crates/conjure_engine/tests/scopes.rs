//! Scoped resource dependencies composed through an [`Engine`].

use std::sync::Arc;

use conjure_engine::prelude::*;
use parking_lot::Mutex;

type Journal = Arc<Mutex<Vec<String>>>;

fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// A scoped factory named `name` whose enter and exit are recorded.
fn recorded(name: &'static str, journal: &Journal, params: &[&str]) -> Callable {
    let journal = Arc::clone(journal);
    match params {
        [] => Callable::scoped(name, &[], move || {
            let on_enter = Arc::clone(&journal);
            let on_exit = Arc::clone(&journal);
            Value::scope(scope_fn(
                move || {
                    on_enter.lock().push(format!("enter {name}"));
                    Ok(Value::new(name))
                },
                move |error| {
                    let outcome = if error.is_some() { "error" } else { "ok" };
                    on_exit.lock().push(format!("exit {name} ({outcome})"));
                    Ok(())
                },
            ))
        }),
        [param] => Callable::scoped(name, &[*param], move |_outer: &'static str| {
            let on_enter = Arc::clone(&journal);
            let on_exit = Arc::clone(&journal);
            Value::scope(scope_fn(
                move || {
                    on_enter.lock().push(format!("enter {name}"));
                    Ok(Value::new(name))
                },
                move |error| {
                    let outcome = if error.is_some() { "error" } else { "ok" };
                    on_exit.lock().push(format!("exit {name} ({outcome})"));
                    Ok(())
                },
            ))
        }),
        _ => unreachable!("recorded scopes take at most one parameter"),
    }
}

#[derive(Debug)]
struct Boom;

impl core::fmt::Display for Boom {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("boom")
    }
}

impl core::error::Error for Boom {}

#[test]
fn nested_scopes_exit_in_reverse_order() {
    let log = journal();
    let engine = Engine::new();
    engine.register_by_name("outer", recorded("outer", &log, &[]));
    engine.register_by_name("inner", recorded("inner", &log, &["outer"]));

    let body_log = Arc::clone(&log);
    let target = Callable::from_fn("target", &["inner"], move |inner: &'static str| {
        body_log.lock().push(format!("use {inner}"));
        inner.len()
    });

    let result = engine.invoke(&target, Args::new()).unwrap();
    assert_eq!(result.extract::<usize>(), Some(5));
    assert_eq!(
        *log.lock(),
        [
            "enter outer",
            "enter inner",
            "use inner",
            "exit inner (ok)",
            "exit outer (ok)"
        ]
    );
}

#[test]
fn scopes_exit_when_the_target_fails() {
    let log = journal();
    let engine = Engine::new();
    engine.register_by_name("session", recorded("session", &log, &[]));

    let body_log = Arc::clone(&log);
    let target = Callable::try_from_fn("target", &["session"], move |_session: &'static str| {
        body_log.lock().push("use session".to_owned());
        Err::<(), _>(Boom)
    });

    let err = engine.invoke(&target, Args::new()).unwrap_err();
    assert!(err.as_call().is_some_and(|call| call.failure_ref::<Boom>().is_some()));
    assert_eq!(
        *log.lock(),
        ["enter session", "use session", "exit session (error)"]
    );
}

#[test]
fn scopes_exit_once_when_the_target_panics() {
    let log = journal();
    let engine = Engine::new();
    engine.register_by_name("session", recorded("session", &log, &[]));

    let target = Callable::from_fn("target", &["session"], |_session: &'static str| -> i64 {
        panic!("target gave up")
    });

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        engine.invoke(&target, Args::new())
    }));
    assert!(outcome.is_err());
    assert_eq!(*log.lock(), ["enter session", "exit session (error)"]);
}

#[test]
fn forced_scope_wraps_the_target() {
    let log = journal();
    let engine = Engine::new();
    let body_log = Arc::clone(&log);
    let target = Callable::from_fn("target", &["i"], move |i: i64| {
        body_log.lock().push(format!("target {i}"));
        i
    });

    let composed = engine
        .compose(
            &target,
            &ComposeOptions::new().with_forced(recorded("guard", &log, &[])),
        )
        .unwrap();
    let result = composed.call(Args::new().arg(5_i64)).unwrap();
    assert_eq!(result.extract::<i64>(), Some(5));
    assert_eq!(
        *log.lock(),
        ["enter guard", "target 5", "exit guard (ok)"]
    );
}

#[test]
fn scope_kind_can_come_from_the_hook() {
    let log = journal();
    let engine = Engine::new();
    let on_enter = Arc::clone(&log);
    let on_exit = Arc::clone(&log);
    let plain = Callable::from_fn("lock", &[], move || {
        let on_enter = Arc::clone(&on_enter);
        let on_exit = Arc::clone(&on_exit);
        Value::scope(scope_fn(
            move || {
                on_enter.lock().push("acquire".to_owned());
                Ok(Value::new(7_u8))
            },
            move |_| {
                on_exit.lock().push("release".to_owned());
                Ok(())
            },
        ))
    });
    engine.register(Hook::for_name("lock", plain).with_resource_kind(ResourceKind::Sync));

    let target = Callable::from_fn("target", &["lock"], |lock: u8| lock);
    let result = engine.invoke(&target, Args::new()).unwrap();
    assert_eq!(result.extract::<u8>(), Some(7));
    assert_eq!(*log.lock(), ["acquire", "release"]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Async scopes
// ─────────────────────────────────────────────────────────────────────────────

struct Transaction {
    journal: Journal,
    fail_commit: bool,
}

impl AsyncScopedResource for Transaction {
    fn enter(&mut self) -> BoxFuture<'_, Result<Value, BoxError>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.journal.lock().push("begin".to_owned());
            Ok(Value::new(42_u64))
        })
    }

    fn exit<'a>(&'a mut self, error: Option<&'a CallError>) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            let action = if error.is_some() { "rollback" } else { "commit" };
            self.journal.lock().push(action.to_owned());
            if self.fail_commit && error.is_none() {
                return Err(Box::new(Boom) as BoxError);
            }
            Ok(())
        })
    }
}

fn transaction(journal: &Journal, fail_commit: bool) -> Callable {
    let journal = Arc::clone(journal);
    Callable::async_scoped("transaction", &[], move || {
        Value::async_scope(Transaction {
            journal: Arc::clone(&journal),
            fail_commit,
        })
    })
}

#[tokio::test]
async fn async_scope_commits_after_the_target() {
    let log = journal();
    let engine = Engine::new();
    engine.register_by_name("tx", transaction(&log, false));

    let body_log = Arc::clone(&log);
    let target = Callable::from_fn("target", &["tx"], move |tx: u64| {
        body_log.lock().push(format!("write {tx}"));
        tx
    });

    let composed = engine.compose_default(&target).unwrap();
    assert!(composed.is_async());
    let result = composed.call_async(Args::new()).await.unwrap();
    assert_eq!(result.extract::<u64>(), Some(42));
    assert_eq!(*log.lock(), ["begin", "write 42", "commit"]);
}

#[tokio::test]
async fn async_scope_rolls_back_on_error() {
    let log = journal();
    let engine = Engine::new();
    engine.register_by_name("tx", transaction(&log, false));

    let target = Callable::try_from_fn("target", &["tx"], |_tx: u64| Err::<u64, _>(Boom));
    let err = engine.invoke_async(&target, Args::new()).await.unwrap_err();
    assert!(err.as_call().is_some());
    assert_eq!(*log.lock(), ["begin", "rollback"]);
}

#[tokio::test]
async fn failing_exit_becomes_the_result() {
    let log = journal();
    let engine = Engine::new();
    engine.register_by_name("tx", transaction(&log, true));

    let target = Callable::from_fn("target", &["tx"], |tx: u64| tx);
    let err = engine.invoke_async(&target, Args::new()).await.unwrap_err();
    let call = err.as_call().unwrap();
    assert_eq!(call.callable(), "transaction");
    assert!(call.failure_ref::<Boom>().is_some());
    assert_eq!(*log.lock(), ["begin", "commit"]);
}

#[tokio::test]
async fn async_forced_scope_with_shared_parameters() {
    let log = journal();
    let engine = Engine::new();
    engine
        .register_by_type(Callable::from_fn("dep1", &[], || 5_i64), None)
        .unwrap();

    let enter_log = Arc::clone(&log);
    let scope = Callable::async_scoped("scope", &["my_int", "f"], move |my_int: i64, f: f64| {
        Value::async_scope(Checked {
            journal: Arc::clone(&enter_log),
            seen: format!("{my_int} {f}"),
        })
    });

    let body_log = Arc::clone(&log);
    let target = Callable::from_fn("target", &["i", "f"], move |i: i64, f: f64| {
        body_log.lock().push("target".to_owned());
        i as f64 + f
    });

    let composed = engine
        .compose(&target, &ComposeOptions::new().with_forced(scope))
        .unwrap();
    let names: Vec<&str> = composed.params().iter().map(Parameter::name).collect();
    assert_eq!(names, ["f"]);

    let result = composed.call_async(Args::new().arg(10.0_f64)).await.unwrap();
    assert_eq!(result.extract::<f64>(), Some(15.0));
    assert_eq!(*log.lock(), ["enter 5 10", "target", "exit"]);
}

struct Checked {
    journal: Journal,
    seen: String,
}

impl AsyncScopedResource for Checked {
    fn enter(&mut self) -> BoxFuture<'_, Result<Value, BoxError>> {
        Box::pin(async move {
            self.journal.lock().push(format!("enter {}", self.seen));
            Ok(Value::unit())
        })
    }

    fn exit<'a>(
        &'a mut self,
        _error: Option<&'a CallError>,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(async move {
            self.journal.lock().push("exit".to_owned());
            Ok(())
        })
    }
}
