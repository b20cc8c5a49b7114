//! Node types for dependency graphs.
//!
//! Each node is one factory invocation (or the target itself) together with
//! where each of its arguments comes from.

use core::fmt;

use conjure_system::callable::Callable;
use conjure_system::resource::ResourceKind;
use conjure_system::value::{Ty, Value};

/// Identifier of a node: its position in the graph's execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a new node ID.
    #[must_use]
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

/// Where one argument of a node comes from.
#[derive(Debug, Clone)]
pub enum Dependency {
    /// Supplied by the caller of the composed callable.
    Outer {
        /// Outer parameter name (after overrides).
        arg_name: String,
        /// Declared type, `None` if untyped.
        ty: Option<Ty>,
        /// Declared default.
        default: Option<Value>,
    },
    /// The result of another node.
    Factory {
        /// The producing node.
        node: NodeId,
        /// Parameter name (after overrides).
        arg_name: String,
    },
}

impl Dependency {
    /// Returns the parameter name.
    #[must_use]
    pub fn arg_name(&self) -> &str {
        match self {
            Dependency::Outer { arg_name, .. } | Dependency::Factory { arg_name, .. } => arg_name,
        }
    }

    /// Returns the producing node for factory dependencies.
    #[must_use]
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Dependency::Factory { node, .. } => Some(*node),
            Dependency::Outer { .. } => None,
        }
    }
}

/// One factory invocation in a dependency graph.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    /// Position in execution order.
    pub id: NodeId,
    /// The factory (or the target, for the last node).
    pub factory: Callable,
    /// How the factory's result is used.
    pub kind: ResourceKind,
    /// One dependency per parameter, in declaration order, skipping the
    /// positions listed in `skipped`.
    pub dependencies: Vec<Dependency>,
    /// Parameter positions left to their defaults.
    pub skipped: Vec<usize>,
}

impl DependencyNode {
    /// Returns `true` if running this node requires an async plan.
    #[must_use]
    pub fn is_async(&self) -> bool {
        self.factory.is_async() || self.kind == ResourceKind::Async
    }

    /// Returns the nodes this node depends on, in parameter order.
    pub fn factory_dependencies(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.dependencies.iter().filter_map(Dependency::node)
    }

    /// Returns `true` if any dependency is produced by `node`.
    #[must_use]
    pub fn depends_on(&self, node: NodeId) -> bool {
        self.factory_dependencies().any(|dep| dep == node)
    }
}
