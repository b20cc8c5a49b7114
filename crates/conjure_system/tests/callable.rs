//! Tests for callables, argument binding and scoped resources.
//!
//! These tests exercise the public surface the composition engine relies on:
//! - Typed closures of several arities
//! - Keyword, positional-only and keyword-only binding
//! - Subtype-aware argument checks
//! - Scoped resources stored inside values

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use conjure_system::prelude::*;

// ─────────────────────────────────────────────────────────────────────────────
// Test Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct Customer {
    name: String,
}

#[derive(Debug, Clone, PartialEq)]
struct FrenchCustomer {
    name: String,
}

fn customer_ty() -> Ty {
    Ty::of::<Customer>()
}

fn french_ty() -> Ty {
    Ty::of::<FrenchCustomer>().with_supertype(customer_ty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Closures
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn eight_parameter_closure() {
    let sum = Callable::from_fn(
        "sum",
        &["a", "b", "c", "d", "e", "f", "g", "h"],
        |a: u8, b: u8, c: u8, d: u8, e: u8, f: u8, g: u8, h: u8| {
            u32::from(a + b + c + d + e + f + g + h)
        },
    );
    let args = (1..=8_u8).fold(Args::new(), Args::arg);
    let result = sum.call(args).unwrap();
    assert_eq!(result.extract::<u32>(), Some(36));
}

#[test]
fn value_parameters_accept_anything() {
    let describe = Callable::from_fn("describe", &["anything"], |anything: Value| {
        anything.ty().name().to_owned()
    });
    assert_eq!(describe.params()[0].ty(), None);

    let result = describe.call(Args::new().arg(3.5_f64)).unwrap();
    assert_eq!(result.extract::<String>().as_deref(), Some("f64"));
}

#[test]
fn returning_value_is_not_wrapped_twice() {
    let passthrough = Callable::from_fn("passthrough", &["x"], |x: Value| x);
    assert_eq!(passthrough.return_type(), None);

    let result = passthrough.call(Args::new().arg(7_i16)).unwrap();
    assert_eq!(result.extract::<i16>(), Some(7));
}

#[tokio::test]
async fn async_closure_sees_bound_defaults() {
    let greet = Callable::from_async_fn(
        "greet",
        &["name", "greeting"],
        |name: String, greeting: String| async move { format!("{greeting}, {name}") },
    )
    .with_default("greeting", String::from("Hello"));

    let result = greet
        .call_async(Args::new().arg(String::from("Mary")))
        .await
        .unwrap();
    assert_eq!(result.extract::<String>().as_deref(), Some("Hello, Mary"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Binding
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn keyword_only_parameters_reject_positional() {
    let f = Callable::from_fn("f", &["a", "flag"], |a: i32, flag: bool| if flag { a } else { -a })
        .keyword_only("flag");

    let err = f.call(Args::new().arg(1_i32).arg(true)).unwrap_err();
    assert!(matches!(err, CallError::TooManyArguments { expected: 1, given: 2, .. }));

    let ok = f.call(Args::new().arg(1_i32).kwarg("flag", false)).unwrap();
    assert_eq!(ok.extract::<i32>(), Some(-1));
}

#[test]
fn declared_supertypes_pass_the_binding_check() {
    let f = Callable::from_fn("welcome", &["customer"], |customer: Value| {
        customer
            .downcast_ref::<FrenchCustomer>()
            .map(|c| format!("Bonjour {}", c.name))
            .unwrap_or_default()
    })
    .with_param_type("customer", customer_ty());

    let henri = Value::with_type(
        FrenchCustomer {
            name: "Henri".into(),
        },
        french_ty(),
    );
    let result = f.call(Args::from_values(vec![henri])).unwrap();
    assert_eq!(result.extract::<String>().as_deref(), Some("Bonjour Henri"));

    let err = f.call(Args::new().arg(1_u8)).unwrap_err();
    assert!(matches!(err, CallError::ArgumentType { .. }));
}

#[test]
fn unexpected_keyword_is_reported() {
    let f = Callable::from_fn("f", &["a"], |a: i32| a);
    let err = f
        .call(Args::new().arg(1_i32).kwarg("b", 2_i32))
        .unwrap_err();
    assert!(matches!(err, CallError::UnexpectedKeyword { ref name, .. } if name == "b"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Scoped resources
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn scoped_factory_returns_an_enterable_resource() {
    let exits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&exits);
    let factory = Callable::scoped("session", &["user"], move |user: String| {
        let counter = Arc::clone(&counter);
        Value::scope(scope_fn(
            move || Ok(Value::new(format!("session for {user}"))),
            move |_error| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        ))
    });

    let value = factory.call(Args::new().arg(String::from("Mary"))).unwrap();
    let Some(AcquiredScope::Sync(mut session)) = value.take_scope() else {
        panic!("expected a sync scope");
    };
    let entered = session.enter().unwrap();
    assert_eq!(
        entered.extract::<String>().as_deref(),
        Some("session for Mary")
    );
    session.exit(None).unwrap();
    assert_eq!(exits.load(Ordering::SeqCst), 1);
}
