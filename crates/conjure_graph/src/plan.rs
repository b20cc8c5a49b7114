//! Compiled plans: the fixed invocation routine of a composed callable.
//!
//! [`compile`] turns a [`DependencyGraph`] and its reconciled outer
//! parameters into a [`CompiledPlan`] and wraps it in a [`Callable`] whose
//! signature is the outer parameter list. The plan is immutable; every call
//! of the composed callable runs it through the [executor](crate::executor).
//!
//! # Steps
//!
//! Each non-target node becomes a [`Step`] unless it is inlined. A step's
//! result lands in a slot that later steps read. A forced node nothing
//! consumes runs for its effect and gets no slot. A scoped step enters the
//! resource its factory returns; the resource is exited after every later
//! step and the target call have finished.
//!
//! # Inlining
//!
//! A plain, unforced node consumed exactly once, by the node right after it,
//! is evaluated as a nested call inside its consumer's argument list. The
//! observable call order is unchanged.

use std::sync::Arc;

use conjure_system::callable::Callable;
use conjure_system::param::{Parameter, Signature};
use conjure_system::resource::ResourceKind;
use conjure_system::value::Value;
use hashbrown::HashMap;

use crate::error::ComposeError;
use crate::executor;
use crate::graph::DependencyGraph;
use crate::node::{Dependency, DependencyNode, NodeId};

/// Where one argument of a call comes from at run time.
#[derive(Debug, Clone)]
pub enum ArgSource {
    /// The outer argument at this index.
    Outer(usize),
    /// The step result stored in this slot.
    Slot(usize),
    /// A nested factory call evaluated in place.
    Inline(Box<Call>),
    /// A fixed default value.
    Default(Value),
}

/// A callable together with the sources of its arguments.
#[derive(Debug, Clone)]
pub struct Call {
    /// The callable.
    pub factory: Callable,
    /// One source per parameter, in declaration order.
    pub args: Vec<ArgSource>,
}

/// One factory invocation in a compiled plan.
#[derive(Debug, Clone)]
pub struct Step {
    /// The factory and its argument sources.
    pub call: Call,
    /// Where the result is stored; `None` if nothing consumes it.
    pub slot: Option<usize>,
    /// `true` for forced factories nothing consumes.
    pub forced: bool,
    /// Whether the result is entered as a scoped resource.
    pub kind: ResourceKind,
}

/// Options controlling plan compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Evaluate single-use factories in place instead of as separate steps.
    pub inline: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self { inline: true }
    }
}

/// The fixed routine behind a composed callable.
#[derive(Debug)]
pub struct CompiledPlan {
    outer: Vec<Parameter>,
    steps: Vec<Step>,
    call: Call,
    slots: usize,
    is_async: bool,
}

impl CompiledPlan {
    /// Lowers `graph` into steps. `outer` must be the reconciled outer
    /// parameters of `graph`.
    #[must_use]
    pub fn new(
        graph: &DependencyGraph,
        outer: Vec<Parameter>,
        is_async: bool,
        options: CompileOptions,
    ) -> Self {
        let nodes = graph.nodes();
        let target = nodes.len() - 1;

        let mut consumers = vec![0_usize; nodes.len()];
        for node in nodes {
            for dep in node.factory_dependencies() {
                consumers[dep.index()] += 1;
            }
        }

        let inlined: Vec<bool> = nodes
            .iter()
            .enumerate()
            .map(|(index, node)| {
                options.inline
                    && index < target
                    && node.kind == ResourceKind::None
                    && consumers[index] == 1
                    && nodes[index + 1].depends_on(node.id)
            })
            .collect();

        let mut slots = 0;
        let slot_of: Vec<Option<usize>> = (0..nodes.len())
            .map(|index| {
                if index == target || inlined[index] || consumers[index] == 0 {
                    return None;
                }
                slots += 1;
                Some(slots - 1)
            })
            .collect();

        let (steps, call) = {
            let lowering = Lowering {
                nodes,
                inlined: &inlined,
                slot_of: &slot_of,
                outer_index: outer
                    .iter()
                    .enumerate()
                    .map(|(index, param)| (param.name(), index))
                    .collect(),
            };
            let steps: Vec<Step> = nodes[..target]
                .iter()
                .filter(|node| !inlined[node.id.index()])
                .map(|node| Step {
                    call: lowering.call(node),
                    slot: slot_of[node.id.index()],
                    forced: consumers[node.id.index()] == 0,
                    kind: node.kind,
                })
                .collect();
            (steps, lowering.call(&nodes[target]))
        };

        tracing::debug!(
            callable = %call.factory.name(),
            steps = steps.len(),
            inlined = inlined.iter().filter(|&&inlined| inlined).count(),
            is_async,
            "compiled plan"
        );

        Self {
            outer,
            steps,
            call,
            slots,
            is_async,
        }
    }

    /// Returns the outer parameters, in call order.
    #[must_use]
    pub fn outer(&self) -> &[Parameter] {
        &self.outer
    }

    /// Returns the steps, in execution order.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Returns the final call of the target.
    #[must_use]
    pub fn call(&self) -> &Call {
        &self.call
    }

    /// Returns the target.
    #[must_use]
    pub fn target(&self) -> &Callable {
        &self.call.factory
    }

    /// Returns the number of result slots a run needs.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots
    }

    /// Returns `true` if the plan runs asynchronously.
    #[must_use]
    pub fn is_async(&self) -> bool {
        self.is_async
    }

    /// Wraps the plan in a callable named `compose(<target>)` taking the
    /// outer parameters.
    #[must_use]
    pub fn into_callable(self: Arc<Self>) -> Callable {
        let name = format!("compose({})", self.target().name());
        let signature = Signature::new(self.outer.clone(), self.target().return_type().cloned());
        if self.is_async {
            Callable::asynchronous(name, signature, move |args| {
                Box::pin(executor::execute_async(Arc::clone(&self), args))
            })
        } else {
            Callable::sync(name, signature, move |args| executor::execute(&self, args))
        }
    }
}

struct Lowering<'a> {
    nodes: &'a [DependencyNode],
    inlined: &'a [bool],
    slot_of: &'a [Option<usize>],
    outer_index: HashMap<&'a str, usize>,
}

impl Lowering<'_> {
    fn call(&self, node: &DependencyNode) -> Call {
        let mut dependencies = node.dependencies.iter();
        let args = node
            .factory
            .params()
            .iter()
            .enumerate()
            .map(|(position, param)| {
                if node.skipped.contains(&position) {
                    return ArgSource::Default(param.default().cloned().unwrap_or_else(Value::unit));
                }
                match dependencies.next() {
                    Some(Dependency::Outer { arg_name, .. }) => {
                        ArgSource::Outer(self.outer_index[arg_name.as_str()])
                    }
                    Some(Dependency::Factory { node, .. }) => self.factory_source(*node),
                    None => {
                        ArgSource::Default(param.default().cloned().unwrap_or_else(Value::unit))
                    }
                }
            })
            .collect();
        Call {
            factory: node.factory.clone(),
            args,
        }
    }

    fn factory_source(&self, id: NodeId) -> ArgSource {
        let index = id.index();
        if self.inlined[index] {
            return ArgSource::Inline(Box::new(self.call(&self.nodes[index])));
        }
        match self.slot_of[index] {
            Some(slot) => ArgSource::Slot(slot),
            None => unreachable!("consumed node {id} has no slot"),
        }
    }
}

/// Compiles `graph` into a composed callable.
///
/// `requested` fixes the mode: `None` infers it (asynchronous if any node,
/// target included, is asynchronous or an async scoped resource). A graph of
/// only the target whose mode needs no adaptation returns the target itself.
///
/// # Errors
///
/// [`ComposeError::AsyncMismatch`] if a synchronous plan is requested but a
/// node is asynchronous.
pub fn compile(
    graph: &DependencyGraph,
    outer: Vec<Parameter>,
    requested: Option<bool>,
    options: CompileOptions,
) -> Result<Callable, ComposeError> {
    let target = &graph.target().factory;
    if graph.len() == 1 && requested.is_none_or(|is_async| is_async == target.is_async()) {
        return Ok(target.clone());
    }

    let is_async = match requested {
        None => graph.nodes().iter().any(DependencyNode::is_async),
        Some(true) => true,
        Some(false) => {
            if let Some(node) = graph.nodes().iter().find(|node| node.is_async()) {
                return Err(ComposeError::AsyncMismatch {
                    factory: node.factory.name().to_owned(),
                });
            }
            false
        }
    };

    Ok(Arc::new(CompiledPlan::new(graph, outer, is_async, options)).into_callable())
}

#[cfg(test)]
mod tests {
    use conjure_system::callable::Callable;

    use super::*;
    use crate::graph::ForcedDep;
    use crate::hook::Hook;
    use crate::reconcile::reconcile;

    fn plan_for(
        target: &Callable,
        registry: &[Hook],
        forced: &[ForcedDep],
        options: CompileOptions,
    ) -> CompiledPlan {
        let graph = DependencyGraph::build(target, &[], registry, forced).unwrap();
        let outer = reconcile(&graph).unwrap();
        CompiledPlan::new(&graph, outer, false, options)
    }

    fn chain() -> (Callable, Vec<Hook>) {
        let dep2 = Callable::from_fn("dep2", &["input"], |input: i64| input + 1);
        let dep1 = Callable::from_fn("dep1", &["dep2"], |dep2: i64| dep2 + 1);
        let target = Callable::from_fn("target", &["dep1"], |dep1: i64| dep1 + 1);
        (target, vec![Hook::for_name("dep1", dep1), Hook::for_name("dep2", dep2)])
    }

    #[test]
    fn linear_chain_is_fully_inlined() {
        let (target, registry) = chain();
        let plan = plan_for(&target, &registry, &[], CompileOptions::default());
        assert!(plan.steps().is_empty());
        assert_eq!(plan.slot_count(), 0);
        let ArgSource::Inline(dep1) = &plan.call().args[0] else {
            panic!("expected dep1 inlined");
        };
        assert!(matches!(dep1.args[0], ArgSource::Inline(_)));
    }

    #[test]
    fn inlining_can_be_disabled() {
        let (target, registry) = chain();
        let plan = plan_for(&target, &registry, &[], CompileOptions { inline: false });
        assert_eq!(plan.steps().len(), 2);
        assert_eq!(plan.slot_count(), 2);
        assert!(matches!(plan.call().args[0], ArgSource::Slot(1)));
    }

    #[test]
    fn shared_results_get_slots() {
        let shared = Callable::from_fn("shared", &[], || 1_i64);
        let target = Callable::from_fn("target", &["a", "b"], |a: i64, b: i64| a + b);
        let registry = [Hook::for_name("a", shared.clone()), Hook::for_name("b", shared)];

        let plan = plan_for(&target, &registry, &[], CompileOptions::default());
        assert_eq!(plan.steps().len(), 1);
        assert_eq!(plan.steps()[0].slot, Some(0));
        assert!(matches!(
            plan.call().args.as_slice(),
            [ArgSource::Slot(0), ArgSource::Slot(0)]
        ));
    }

    #[test]
    fn forced_only_step_has_no_slot() {
        let audit = Callable::from_fn("audit", &[], || ());
        let target = Callable::from_fn("target", &[], || 1_u8);

        let plan = plan_for(&target, &[], &[ForcedDep::from(audit)], CompileOptions::default());
        assert_eq!(plan.steps().len(), 1);
        assert!(plan.steps()[0].forced);
        assert_eq!(plan.steps()[0].slot, None);
    }

    #[test]
    fn scoped_steps_are_never_inlined() {
        let session = Callable::scoped("session", &[], || Value::unit());
        let target = Callable::from_fn("target", &["session"], |s: Value| s);
        let registry = [Hook::for_name("session", session)];

        let plan = plan_for(&target, &registry, &[], CompileOptions::default());
        assert_eq!(plan.steps().len(), 1);
        assert_eq!(plan.steps()[0].kind, ResourceKind::Sync);
    }

    #[test]
    fn lone_target_passes_through() {
        let target = Callable::from_fn("target", &["x"], |x: i64| x);
        let graph = DependencyGraph::build(&target, &[], &[], &[]).unwrap();
        let outer = reconcile(&graph).unwrap();

        assert_eq!(
            compile(&graph, outer.clone(), None, CompileOptions::default()).unwrap(),
            target
        );
        assert_eq!(
            compile(&graph, outer.clone(), Some(false), CompileOptions::default()).unwrap(),
            target
        );
        let wrapped = compile(&graph, outer, Some(true), CompileOptions::default()).unwrap();
        assert_ne!(wrapped, target);
        assert!(wrapped.is_async());
        assert_eq!(wrapped.name(), "compose(target)");
    }

    #[test]
    fn sync_request_with_async_dependency_fails() {
        let slow = Callable::from_async_fn("slow", &[], || async { 1_i64 });
        let target = Callable::from_fn("target", &["slow"], |x: i64| x);
        let graph =
            DependencyGraph::build(&target, &[], &[Hook::for_name("slow", slow)], &[]).unwrap();
        let outer = reconcile(&graph).unwrap();

        let err =
            compile(&graph, outer.clone(), Some(false), CompileOptions::default()).unwrap_err();
        assert_eq!(
            err,
            ComposeError::AsyncMismatch {
                factory: "slow".into()
            }
        );
        let inferred = compile(&graph, outer, None, CompileOptions::default()).unwrap();
        assert!(inferred.is_async());
    }
}
