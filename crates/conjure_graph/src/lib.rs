//! Hooks, dependency graphs and compiled plans for Conjure (Layer 2).
//!
//! `conjure_graph` turns a target callable and a set of hooks into a single
//! composed callable:
//!
//! 1. [`DependencyGraph::build`] resolves parameters through hooks into an
//!    ordered list of factory nodes ending in the target.
//! 2. [`reconcile`](reconcile::reconcile) collapses the parameters left to the
//!    caller into one outer parameter list.
//! 3. [`compile`](plan::compile) lowers the graph into a [`CompiledPlan`] and
//!    wraps it in a [`Callable`](conjure_system::callable::Callable).
//! 4. The [`executor`] runs the plan on every call.
//!
//! # Example
//!
//! ```
//! use conjure_graph::prelude::*;
//! use conjure_system::prelude::*;
//!
//! let dep = Callable::from_fn("dep", &["input"], |input: f64| input * 2.0);
//! let target = Callable::from_fn("target", &["dep", "input"], |dep: f64, input: f64| dep + input);
//! let registry = [Hook::for_name("dep", dep)];
//!
//! let graph = DependencyGraph::build(&target, &[], &registry, &[]).unwrap();
//! let outer = reconcile(&graph).unwrap();
//! let composed = compile(&graph, outer, None, CompileOptions::default()).unwrap();
//!
//! let result = composed.call(Args::new().arg(4.0_f64)).unwrap();
//! assert_eq!(result.extract::<f64>(), Some(12.0));
//! ```
//!
//! # Architecture
//!
//! - **Layer 1** (`conjure_system`): callables and values
//! - **Layer 2** (`conjure_graph`): hooks, dependency graphs and plans (this crate)
//! - **Layer 3** (`conjure_engine`): the engine, its caches and direct calls

/// Composition errors.
pub mod error;

/// Plan execution.
pub mod executor;

/// Dependency graph construction.
pub mod graph;

/// Hooks and the hook registry.
pub mod hook;

/// Node types for dependency graphs.
pub mod node;

/// Compiled plans.
pub mod plan;

/// Outer parameter reconciliation.
pub mod reconcile;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::error::ComposeError;
    pub use crate::executor::{execute, execute_async};
    pub use crate::graph::{DependencyGraph, ForcedDep};
    pub use crate::hook::{FactoryProvider, Hook, HookRegistry, Resolver};
    pub use crate::node::{Dependency, DependencyNode, NodeId};
    pub use crate::plan::{ArgSource, Call, CompileOptions, CompiledPlan, Step, compile};
    pub use crate::reconcile::reconcile;
}

// Re-export key types at crate root for convenience
pub use error::ComposeError;
pub use graph::{DependencyGraph, ForcedDep};
pub use hook::{Hook, HookRegistry};
pub use plan::{CompileOptions, CompiledPlan};
