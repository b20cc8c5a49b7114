//! Dependency graph construction.
//!
//! [`DependencyGraph::build`] expands a target callable breadth-first: every
//! parameter is offered to the hooks (per-call hooks first, then the registry
//! newest-first), and each matched factory becomes a node that is expanded in
//! turn. The resulting nodes are ordered so that every factory runs after the
//! factories it depends on, with the target last.
//!
//! # Ordering
//!
//! Nodes are first ordered most-recently-discovered first, then stable-sorted
//! by how many direct dependencies they have. That order is kept wherever it
//! already satisfies every dependency; where it does not, the offending nodes
//! are moved after their dependencies. A dependency cycle is an error.

use std::collections::VecDeque;

use conjure_system::callable::Callable;
use conjure_system::param::Parameter;
use conjure_system::resource::ResourceKind;
use hashbrown::HashMap;

use crate::error::ComposeError;
use crate::hook::Hook;
use crate::node::{Dependency, DependencyNode, NodeId};

/// A factory that runs whether or not anything consumes its result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForcedDep {
    factory: Callable,
    kind: Option<ResourceKind>,
}

impl ForcedDep {
    /// Forces `factory` with its intrinsic resource kind.
    #[must_use]
    pub fn new(factory: Callable) -> Self {
        Self {
            factory,
            kind: None,
        }
    }

    /// Treats the factory as producing `kind` resources.
    #[must_use]
    pub fn with_kind(mut self, kind: ResourceKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Returns the factory.
    #[must_use]
    pub fn factory(&self) -> &Callable {
        &self.factory
    }

    /// Returns the effective resource kind.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind.unwrap_or_else(|| self.factory.resource_kind())
    }
}

impl From<Callable> for ForcedDep {
    fn from(factory: Callable) -> Self {
        Self::new(factory)
    }
}

/// Factories in execution order. The last node is the target.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<DependencyNode>,
}

impl DependencyGraph {
    /// Builds the dependency graph of `target`.
    ///
    /// `extra` hooks are consulted before `registry` hooks. Every `forced`
    /// factory becomes a node even if nothing consumes it; a forced factory
    /// that is also resolved by a hook is one shared node.
    ///
    /// # Errors
    ///
    /// [`ComposeError::CyclicDependency`] if factories depend on each other
    /// in a cycle. Parameters no hook resolves are not an error; they become
    /// outer parameters.
    pub fn build(
        target: &Callable,
        extra: &[Hook],
        registry: &[Hook],
        forced: &[ForcedDep],
    ) -> Result<Self, ComposeError> {
        let hooks: Vec<&Hook> = extra.iter().chain(registry).collect();
        let mut builder = Builder::default();

        let (target_id, _) = builder.intern(target, ResourceKind::None);
        let mut wave = vec![target_id];
        for dep in forced {
            let (id, is_new) = builder.intern(dep.factory(), dep.kind());
            if is_new {
                wave.push(id);
            }
        }

        let mut discovered = VecDeque::with_capacity(builder.pending.len());
        while !wave.is_empty() {
            let mut next = Vec::new();
            for id in wave {
                builder.expand(id, id == target_id, &hooks, &mut next);
                discovered.push_front(id);
            }
            wave = next;
        }

        // The target was discovered first, so it is last.
        let mut order: Vec<usize> = discovered.into_iter().collect();
        order.pop();
        order.sort_by_key(|&id| builder.pending[id].dependencies.len());
        let mut order = builder.dependency_safe(order, target_id)?;
        order.push(target_id);

        let graph = builder.finish(&order);
        tracing::debug!(
            callable = %target.name(),
            nodes = graph.len(),
            "built dependency graph"
        );
        Ok(graph)
    }

    /// Returns the nodes in execution order.
    #[must_use]
    pub fn nodes(&self) -> &[DependencyNode] {
        &self.nodes
    }

    /// Returns a node by ID.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&DependencyNode> {
        self.nodes.get(id.index())
    }

    /// Returns the target node.
    #[must_use]
    pub fn target(&self) -> &DependencyNode {
        // `build` always pushes the target.
        &self.nodes[self.nodes.len() - 1]
    }

    /// Returns the number of nodes, target included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`: a graph contains at least its target.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the number of nodes consuming the result of `id`.
    #[must_use]
    pub fn consumers(&self, id: NodeId) -> usize {
        self.nodes
            .iter()
            .map(|node| node.factory_dependencies().filter(|&dep| dep == id).count())
            .sum()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

struct Pending {
    factory: Callable,
    kind: ResourceKind,
    /// Factory dependencies use discovery indices until `finish`.
    dependencies: Vec<Dependency>,
    skipped: Vec<usize>,
}

#[derive(Default)]
struct Builder {
    pending: Vec<Pending>,
    seen: HashMap<Callable, usize>,
}

impl Builder {
    /// Returns the discovery index of `factory`, and whether it is new.
    fn intern(&mut self, factory: &Callable, kind: ResourceKind) -> (usize, bool) {
        if let Some(&id) = self.seen.get(factory) {
            return (id, false);
        }
        let id = self.pending.len();
        self.pending.push(Pending {
            factory: factory.clone(),
            kind,
            dependencies: Vec::new(),
            skipped: Vec::new(),
        });
        self.seen.insert(factory.clone(), id);
        (id, true)
    }

    fn expand(&mut self, id: usize, is_target: bool, hooks: &[&Hook], next: &mut Vec<usize>) {
        let factory = self.pending[id].factory.clone();
        let mut dependencies = Vec::with_capacity(factory.params().len());
        let mut skipped = Vec::new();

        for (position, param) in factory.params().iter().enumerate() {
            // Optional keyword-only parameters of dependencies keep their defaults.
            if !is_target && param.is_optional_keyword_only() {
                skipped.push(position);
                continue;
            }
            let param = param.effective();
            dependencies.push(self.resolve(&factory, &param, hooks, next));
        }

        let node = &mut self.pending[id];
        node.dependencies = dependencies;
        node.skipped = skipped;
    }

    fn resolve(
        &mut self,
        consumer: &Callable,
        param: &Parameter,
        hooks: &[&Hook],
        next: &mut Vec<usize>,
    ) -> Dependency {
        for hook in hooks {
            if !hook.matches(param) {
                continue;
            }
            let Some((factory, kind)) = hook.resolve(param) else {
                return outer(param);
            };
            // A factory cannot satisfy its own parameters.
            if factory == *consumer {
                continue;
            }
            let (id, is_new) = self.intern(&factory, kind);
            if is_new {
                next.push(id);
            }
            return Dependency::Factory {
                node: NodeId(id),
                arg_name: param.name().to_owned(),
            };
        }
        outer(param)
    }

    fn dependencies_of(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        self.pending[id]
            .dependencies
            .iter()
            .filter_map(Dependency::node)
            .map(|node| node.0)
    }

    /// Reorders `order` so each node follows its dependencies, keeping the
    /// given order wherever it is already valid.
    fn dependency_safe(
        &self,
        mut remaining: Vec<usize>,
        target: usize,
    ) -> Result<Vec<usize>, ComposeError> {
        let mut placed = vec![false; self.pending.len()];
        let mut order = Vec::with_capacity(remaining.len() + 1);

        while !remaining.is_empty() {
            let ready = remaining
                .iter()
                .position(|&id| self.dependencies_of(id).all(|dep| placed[dep]));
            let Some(position) = ready else {
                return Err(self.cycle(remaining[0], &placed));
            };
            let id = remaining.remove(position);
            placed[id] = true;
            order.push(id);
        }

        if let Some(dep) = self.dependencies_of(target).find(|&dep| !placed[dep]) {
            return Err(self.cycle(dep, &placed));
        }
        Ok(order)
    }

    fn cycle(&self, start: usize, placed: &[bool]) -> ComposeError {
        let mut path: Vec<usize> = Vec::new();
        let mut current = start;
        loop {
            if let Some(position) = path.iter().position(|&id| id == current) {
                path.drain(..position);
                path.push(current);
                break;
            }
            path.push(current);
            match self.dependencies_of(current).find(|&dep| !placed[dep]) {
                Some(dep) => current = dep,
                None => break,
            }
        }
        ComposeError::CyclicDependency {
            cycle: path
                .into_iter()
                .map(|id| self.pending[id].factory.name().to_owned())
                .collect(),
        }
    }

    fn finish(self, order: &[usize]) -> DependencyGraph {
        let mut position = vec![0; self.pending.len()];
        for (index, &id) in order.iter().enumerate() {
            position[id] = index;
        }

        let mut pending: Vec<Option<Pending>> = self.pending.into_iter().map(Some).collect();
        let nodes = order
            .iter()
            .enumerate()
            .filter_map(|(index, &id)| {
                let node = pending[id].take()?;
                let dependencies = node
                    .dependencies
                    .into_iter()
                    .map(|dep| match dep {
                        Dependency::Factory { node, arg_name } => Dependency::Factory {
                            node: NodeId(position[node.0]),
                            arg_name,
                        },
                        outer @ Dependency::Outer { .. } => outer,
                    })
                    .collect();
                Some(DependencyNode {
                    id: NodeId(index),
                    factory: node.factory,
                    kind: node.kind,
                    dependencies,
                    skipped: node.skipped,
                })
            })
            .collect();
        DependencyGraph { nodes }
    }
}

fn outer(param: &Parameter) -> Dependency {
    Dependency::Outer {
        arg_name: param.name().to_owned(),
        ty: param.ty().cloned(),
        default: param.default().cloned(),
    }
}
