//! Plan execution.
//!
//! [`execute`] and [`execute_async`] interpret a [`CompiledPlan`]: steps run
//! in order, each result is stored in its slot, and scoped results are
//! entered on a stack. When the target call finishes (with a value or an
//! error) the stack is exited in reverse order, each exit seeing the error
//! the plan is finishing with, if any.
//!
//! # Errors during exit
//!
//! The first error wins. An exit that fails while the plan is already
//! failing is logged and discarded; an exit that fails on the success path
//! becomes the result, and the scopes entered before it see that error.
//!
//! # Cancellation
//!
//! Dropping the future of [`execute_async`] drops the entered resources
//! without exiting them. A panic inside a synchronous plan exits the entered
//! synchronous resources while unwinding.

use std::sync::Arc;

use conjure_system::callable::{Body, BoxFuture, Callable};
use conjure_system::error::CallError;
use conjure_system::param::Parameter;
use conjure_system::resource::{AcquiredScope, AsyncScopedResource, ScopedResource};
use conjure_system::value::Value;

use crate::plan::{ArgSource, CompiledPlan};

/// Runs a synchronous plan with the bound outer arguments.
///
/// # Errors
///
/// The first [`CallError`] raised by a factory, the target, or a scope exit.
pub fn execute(plan: &CompiledPlan, outer: Vec<Value>) -> Result<Value, CallError> {
    let mut frame = Frame::new(plan, outer);
    let mut scopes = SyncScopes::new(plan.target().name());
    let result = run_steps(plan, &mut frame, &mut scopes);
    scopes.unwind(result)
}

/// Runs a plan asynchronously with the bound outer arguments.
///
/// Synchronous factories are called inline; only asynchronous factories and
/// async scope transitions are awaited.
///
/// # Errors
///
/// The first [`CallError`] raised by a factory, the target, or a scope exit.
pub async fn execute_async(plan: Arc<CompiledPlan>, outer: Vec<Value>) -> Result<Value, CallError> {
    let mut frame = Frame::new(&plan, outer);
    let mut scopes = AsyncScopes::default();
    let result = run_steps_async(&plan, &mut frame, &mut scopes).await;
    scopes.unwind(result).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Frame
// ─────────────────────────────────────────────────────────────────────────────

/// Per-run storage: outer arguments and step results.
struct Frame {
    outer: Vec<Value>,
    slots: Vec<Option<Value>>,
}

impl Frame {
    fn new(plan: &CompiledPlan, outer: Vec<Value>) -> Self {
        Self {
            outer,
            slots: vec![None; plan.slot_count()],
        }
    }

    fn store(&mut self, slot: Option<usize>, value: Value) {
        if let Some(entry) = slot.and_then(|slot| self.slots.get_mut(slot)) {
            *entry = Some(value);
        }
    }

    /// Reads a non-inline source.
    fn read(
        &self,
        source: &ArgSource,
        consumer: &Callable,
        param: &Parameter,
    ) -> Result<Value, CallError> {
        let value = match source {
            ArgSource::Outer(index) => self.outer.get(*index).cloned(),
            ArgSource::Slot(slot) => self.slots.get(*slot).cloned().flatten(),
            ArgSource::Default(value) => Some(value.clone()),
            ArgSource::Inline(_) => None,
        };
        value.ok_or_else(|| CallError::UnresolvedArgument {
            callable: consumer.name().to_owned(),
            param: param.name().to_owned(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Synchronous execution
// ─────────────────────────────────────────────────────────────────────────────

fn run_steps(
    plan: &CompiledPlan,
    frame: &mut Frame,
    scopes: &mut SyncScopes,
) -> Result<Value, CallError> {
    for step in plan.steps() {
        let args = arguments(frame, &step.call.factory, &step.call.args)?;
        let value = step.call.factory.call_bound(args)?;
        let value = if step.kind.is_scoped() {
            scopes.enter(&step.call.factory, value)?
        } else {
            value
        };
        frame.store(step.slot, value);
    }
    let call = plan.call();
    let args = arguments(frame, &call.factory, &call.args)?;
    call.factory.call_bound(args)
}

fn arguments(
    frame: &Frame,
    consumer: &Callable,
    sources: &[ArgSource],
) -> Result<Vec<Value>, CallError> {
    sources
        .iter()
        .zip(consumer.params())
        .map(|(source, param)| match source {
            ArgSource::Inline(call) => {
                let args = arguments(frame, &call.factory, &call.args)?;
                call.factory.call_bound(args)
            }
            source => frame.read(source, consumer, param),
        })
        .collect()
}

/// Entered synchronous resources. Exits whatever is left if dropped while
/// a step panics.
struct SyncScopes {
    callable: String,
    stack: Vec<(String, Box<dyn ScopedResource>)>,
}

impl SyncScopes {
    fn new(callable: &str) -> Self {
        Self {
            callable: callable.to_owned(),
            stack: Vec::new(),
        }
    }

    fn enter(&mut self, factory: &Callable, value: Value) -> Result<Value, CallError> {
        match value.take_scope() {
            Some(AcquiredScope::Sync(mut resource)) => {
                let entered = resource
                    .enter()
                    .map_err(|error| CallError::from_boxed(factory.name(), error))?;
                self.stack.push((factory.name().to_owned(), resource));
                Ok(entered)
            }
            Some(AcquiredScope::Async(_)) => Err(CallError::ScopeExpected {
                factory: factory.name().to_owned(),
                found: "asynchronous scoped resource",
            }),
            None => Err(CallError::ScopeExpected {
                factory: factory.name().to_owned(),
                found: value.ty().name(),
            }),
        }
    }

    fn unwind(mut self, mut result: Result<Value, CallError>) -> Result<Value, CallError> {
        let stack = std::mem::take(&mut self.stack);
        for (name, mut resource) in stack.into_iter().rev() {
            let exit = resource.exit(result.as_ref().err());
            settle(&name, exit, &mut result);
        }
        result
    }
}

impl Drop for SyncScopes {
    fn drop(&mut self) {
        if self.stack.is_empty() {
            return;
        }
        let error = CallError::failed(self.callable.clone(), "composed call panicked");
        while let Some((name, mut resource)) = self.stack.pop() {
            if let Err(exit_error) = resource.exit(Some(&error)) {
                tracing::warn!(
                    scope = %name,
                    error = %exit_error,
                    "scope exit failed during panic"
                );
            }
        }
    }
}

/// Folds the outcome of one scope exit into the plan result.
fn settle(
    name: &str,
    exit: Result<(), conjure_system::error::BoxError>,
    result: &mut Result<Value, CallError>,
) {
    let Err(exit_error) = exit else {
        return;
    };
    match result {
        Ok(_) => *result = Err(CallError::from_boxed(name, exit_error)),
        Err(pending) => {
            tracing::warn!(
                scope = %name,
                error = %exit_error,
                pending = %pending,
                "scope exit failed while unwinding an error; discarding"
            );
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Asynchronous execution
// ─────────────────────────────────────────────────────────────────────────────

async fn run_steps_async(
    plan: &CompiledPlan,
    frame: &mut Frame,
    scopes: &mut AsyncScopes,
) -> Result<Value, CallError> {
    for step in plan.steps() {
        let args = arguments_async(frame, &step.call.factory, &step.call.args).await?;
        let value = invoke(&step.call.factory, args).await?;
        let value = if step.kind.is_scoped() {
            scopes.enter(&step.call.factory, value).await?
        } else {
            value
        };
        frame.store(step.slot, value);
    }
    let call = plan.call();
    let args = arguments_async(frame, &call.factory, &call.args).await?;
    invoke(&call.factory, args).await
}

/// Calls `factory`, awaiting only asynchronous bodies.
async fn invoke(factory: &Callable, args: Vec<Value>) -> Result<Value, CallError> {
    match factory.body() {
        Body::Sync(body) => body(args),
        Body::Async(body) => body(args).await,
    }
}

fn arguments_async<'a>(
    frame: &'a Frame,
    consumer: &'a Callable,
    sources: &'a [ArgSource],
) -> BoxFuture<'a, Result<Vec<Value>, CallError>> {
    Box::pin(async move {
        let mut args = Vec::with_capacity(sources.len());
        for (source, param) in sources.iter().zip(consumer.params()) {
            let value = match source {
                ArgSource::Inline(call) => {
                    let inner = arguments_async(frame, &call.factory, &call.args).await?;
                    invoke(&call.factory, inner).await?
                }
                source => frame.read(source, consumer, param)?,
            };
            args.push(value);
        }
        Ok(args)
    })
}

enum Entered {
    Sync(Box<dyn ScopedResource>),
    Async(Box<dyn AsyncScopedResource>),
}

#[derive(Default)]
struct AsyncScopes {
    stack: Vec<(String, Entered)>,
}

impl AsyncScopes {
    async fn enter(&mut self, factory: &Callable, value: Value) -> Result<Value, CallError> {
        let (entered, resource) = match value.take_scope() {
            Some(AcquiredScope::Sync(mut resource)) => {
                let entered = resource.enter();
                (entered, Entered::Sync(resource))
            }
            Some(AcquiredScope::Async(mut resource)) => {
                let entered = resource.enter().await;
                (entered, Entered::Async(resource))
            }
            None => {
                return Err(CallError::ScopeExpected {
                    factory: factory.name().to_owned(),
                    found: value.ty().name(),
                });
            }
        };
        let entered = entered.map_err(|error| CallError::from_boxed(factory.name(), error))?;
        self.stack.push((factory.name().to_owned(), resource));
        Ok(entered)
    }

    async fn unwind(self, mut result: Result<Value, CallError>) -> Result<Value, CallError> {
        for (name, resource) in self.stack.into_iter().rev() {
            let exit = match resource {
                Entered::Sync(mut resource) => resource.exit(result.as_ref().err()),
                Entered::Async(mut resource) => resource.exit(result.as_ref().err()).await,
            };
            settle(&name, exit, &mut result);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use conjure_system::resource::scope_fn;
    use parking_lot::Mutex;

    use super::*;
    use crate::graph::DependencyGraph;
    use crate::hook::Hook;
    use crate::plan::CompileOptions;
    use crate::reconcile::reconcile;

    type Log = Arc<Mutex<Vec<String>>>;

    fn logging_scope(log: &Log, name: &'static str, fail_exit: bool) -> Callable {
        let log = Arc::clone(log);
        Callable::scoped(name, &[], move || {
            let enter_log = Arc::clone(&log);
            let exit_log = Arc::clone(&log);
            Value::scope(scope_fn(
                move || {
                    enter_log.lock().push(format!("enter {name}"));
                    Ok(Value::new(name))
                },
                move |error: Option<&CallError>| {
                    exit_log
                        .lock()
                        .push(format!("exit {name} error={}", error.is_some()));
                    if fail_exit {
                        Err("exit failed".into())
                    } else {
                        Ok(())
                    }
                },
            ))
        })
    }

    fn plan(target: &Callable, registry: &[Hook]) -> CompiledPlan {
        let graph = DependencyGraph::build(target, &[], registry, &[]).unwrap();
        let outer = reconcile(&graph).unwrap();
        CompiledPlan::new(&graph, outer, false, CompileOptions::default())
    }

    #[test]
    fn scopes_exit_in_reverse_order() {
        let log: Log = Arc::default();
        let outer_scope = logging_scope(&log, "outer", false);
        let inner_scope = logging_scope(&log, "inner", false);
        let body_log = Arc::clone(&log);
        let target = Callable::from_fn(
            "target",
            &["outer", "inner"],
            move |o: &'static str, i: &'static str| {
                body_log.lock().push(format!("body {o} {i}"));
            },
        );
        let registry = [
            Hook::for_name("outer", outer_scope),
            Hook::for_name("inner", inner_scope),
        ];

        execute(&plan(&target, &registry), Vec::new()).unwrap();
        let log = log.lock();
        assert_eq!(log[2], "body outer inner");
        assert_eq!(log[3].split(' ').nth(1), log[1].split(' ').nth(1));
        assert_eq!(log[4].split(' ').nth(1), log[0].split(' ').nth(1));
        assert!(log[3].ends_with("error=false"));
    }

    #[test]
    fn exit_sees_the_step_error() {
        let log: Log = Arc::default();
        let scope = logging_scope(&log, "session", false);
        let target = Callable::try_from_fn("target", &["session"], |_s: &'static str| {
            Err::<(), _>("boom")
        });

        let registry = [Hook::for_name("session", scope)];
        let err = execute(&plan(&target, &registry), Vec::new()).unwrap_err();
        assert_eq!(err.callable(), "target");
        assert_eq!(log.lock().last().map(String::as_str), Some("exit session error=true"));
    }

    #[test]
    fn exit_failure_on_success_becomes_the_result() {
        let log: Log = Arc::default();
        let scope = logging_scope(&log, "session", true);
        let target = Callable::from_fn("target", &["session"], |s: &'static str| s);

        let registry = [Hook::for_name("session", scope)];
        let err = execute(&plan(&target, &registry), Vec::new()).unwrap_err();
        assert_eq!(err.callable(), "session");
    }

    #[test]
    fn exit_failure_after_error_keeps_first_error() {
        let log: Log = Arc::default();
        let scope = logging_scope(&log, "session", true);
        let target = Callable::try_from_fn("target", &["session"], |_s: &'static str| {
            Err::<(), _>("boom")
        });

        let registry = [Hook::for_name("session", scope)];
        let err = execute(&plan(&target, &registry), Vec::new()).unwrap_err();
        assert_eq!(err.callable(), "target");
    }

    #[test]
    fn non_scope_value_from_scoped_factory_fails() {
        let fake = Callable::from_fn("fake", &[], || 1_u8)
            .with_resource_kind(conjure_system::resource::ResourceKind::Sync);
        let target = Callable::from_fn("target", &["fake"], |v: Value| v);

        let registry = [Hook::for_name("fake", fake)];
        let err = execute(&plan(&target, &registry), Vec::new()).unwrap_err();
        assert!(matches!(err, CallError::ScopeExpected { ref factory, .. } if factory == "fake"));
    }

    #[tokio::test]
    async fn async_plan_exits_sync_scopes_too() {
        let log: Log = Arc::default();
        let scope = logging_scope(&log, "session", false);
        let target = Callable::from_async_fn("target", &["session"], |s: &'static str| async move {
            s.len()
        });
        let registry = [Hook::for_name("session", scope)];
        let graph = DependencyGraph::build(&target, &[], &registry, &[]).unwrap();
        let outer = reconcile(&graph).unwrap();
        let plan = Arc::new(CompiledPlan::new(&graph, outer, true, CompileOptions::default()));

        let value = execute_async(plan, Vec::new()).await.unwrap();
        assert_eq!(value.extract::<usize>(), Some(7));
        assert_eq!(
            *log.lock(),
            ["enter session", "exit session error=false"]
        );
    }
}
