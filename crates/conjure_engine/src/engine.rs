//! The [`Engine`]: a hook registry plus cached composition.
//!
//! # Example
//!
//! ```
//! use conjure_engine::prelude::*;
//!
//! let engine = Engine::new();
//! engine.register_by_name("dep2", Callable::from_fn("dep2", &["input"], |input: i64| input + 1));
//! engine.register_by_name("dep1", Callable::from_fn("dep1", &["dep2"], |dep2: i64| dep2 + 1));
//!
//! let target = Callable::from_fn("target", &["dep1"], |dep1: i64| dep1 + 1);
//! let composed = engine.compose_default(&target).unwrap();
//! assert_eq!(composed.params().len(), 1);
//!
//! let result = composed.call(Args::new().arg(1_i64)).unwrap();
//! assert_eq!(result.extract::<i64>(), Some(4));
//! ```

use std::sync::Arc;

use conjure_graph::error::ComposeError;
use conjure_graph::graph::{DependencyGraph, ForcedDep};
use conjure_graph::hook::{Hook, HookRegistry};
use conjure_graph::plan::{CompileOptions, compile};
use conjure_graph::reconcile::reconcile;
use conjure_system::callable::Callable;
use conjure_system::error::CallError;
use conjure_system::param::{ParamPredicate, Parameter};
use conjure_system::value::{Args, Ty, Value};
use parking_lot::RwLock;

use crate::cache::BuildCache;
use crate::config::EngineConfig;
use crate::direct::{AdaptKey, DirectKey, Routing, adapted};
use crate::error::EngineError;

// ─────────────────────────────────────────────────────────────────────────────
// ComposeOptions
// ─────────────────────────────────────────────────────────────────────────────

/// Per-call composition settings.
#[derive(Debug, Clone, Default)]
pub struct ComposeOptions {
    /// Hooks evaluated before the registry, in order.
    pub hooks: Vec<Hook>,
    /// `Some(true)` for an async callable, `Some(false)` for a sync one,
    /// `None` to infer from the dependencies.
    pub is_async: Option<bool>,
    /// Factories run for their effect even if nothing consumes them.
    pub forced: Vec<ForcedDep>,
}

impl ComposeOptions {
    /// Creates options with no extra hooks, inferred mode and no forced
    /// dependencies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a per-call hook. Hooks added earlier take precedence.
    #[must_use]
    pub fn with_hook(mut self, hook: Hook) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Requests a sync (`false`) or async (`true`) callable.
    #[must_use]
    pub fn with_async(mut self, is_async: bool) -> Self {
        self.is_async = Some(is_async);
        self
    }

    /// Adds a forced dependency.
    #[must_use]
    pub fn with_forced(mut self, forced: impl Into<ForcedDep>) -> Self {
        self.forced.push(forced.into());
        self
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct CompositionKey {
    target: Callable,
    hooks: Vec<Hook>,
    is_async: Option<bool>,
    forced: Vec<ForcedDep>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Composes callables with their dependencies.
///
/// The engine owns a [`HookRegistry`]. Registration takes `&self` and
/// clears every cache; compose and call methods may run concurrently from
/// many threads.
pub struct Engine {
    config: EngineConfig,
    registry: RwLock<HookRegistry>,
    plans: BuildCache<CompositionKey, Callable>,
    routes: BuildCache<DirectKey, Arc<Routing>>,
    adapters: BuildCache<AdaptKey, Callable>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::with_config(EngineConfig::default())
    }
}

impl core::fmt::Debug for Engine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("hooks", &self.registry.read().len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine with an empty registry and the default
    /// configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine with an empty registry.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            registry: RwLock::new(HookRegistry::new()),
            plans: BuildCache::new("plans", config.plan_cache()),
            routes: BuildCache::new("routes", config.direct_cache()),
            adapters: BuildCache::new("adapters", config.direct_cache()),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns a snapshot of the registered hooks, newest first.
    #[must_use]
    pub fn hooks(&self) -> Vec<Hook> {
        self.registry.read().hooks().to_vec()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────

    /// Registers a hook with precedence over every hook registered before.
    pub fn register(&self, hook: Hook) -> &Self {
        self.registry.write().insert(hook);
        self.invalidate();
        self
    }

    /// Resolves parameters named `name` with `factory`.
    pub fn register_by_name(&self, name: impl Into<String>, factory: Callable) -> &Self {
        self.register(Hook::for_name(name, factory))
    }

    /// Resolves parameters named like `factory` itself.
    pub fn register_named(&self, factory: Callable) -> &Self {
        let name = factory.name().to_owned();
        self.register(Hook::for_name(name, factory))
    }

    /// Resolves parameters declared as `ty`, or as a declared subtype of it,
    /// with `factory`. `ty` defaults to the factory's return type.
    ///
    /// # Errors
    ///
    /// [`ComposeError::Configuration`] if no type is given and the factory
    /// declares no return type.
    pub fn register_by_type(
        &self,
        factory: Callable,
        ty: Option<Ty>,
    ) -> Result<&Self, ComposeError> {
        let Some(ty) = ty.or_else(|| factory.return_type().cloned()) else {
            return Err(ComposeError::Configuration {
                reason: format!(
                    "factory `{}` declares no return type; provide a type to register it by",
                    factory.name()
                ),
            });
        };
        Ok(self.register(Hook::for_subtypes_of(ty, factory)))
    }

    /// Resolves parameters matching `predicate` with `factory`.
    pub fn register_hook<P>(&self, predicate: P, factory: Callable) -> &Self
    where
        P: Fn(&Parameter) -> bool + Send + Sync + 'static,
    {
        self.register(Hook::new(predicate, factory))
    }

    /// Resolves parameters matching `predicate` with a factory computed from
    /// the parameter.
    pub fn register_hook_factory<P, F>(&self, predicate: P, provider: F) -> &Self
    where
        P: Fn(&Parameter) -> bool + Send + Sync + 'static,
        F: Fn(&Parameter) -> Callable + Send + Sync + 'static,
    {
        self.register(Hook::with_provider(predicate, provider))
    }

    /// Surfaces parameters named `name` to the caller, even if an older hook
    /// would resolve them.
    pub fn register_passthrough_name(&self, name: impl Into<String>) -> &Self {
        self.register(Hook::passthrough_name(name))
    }

    /// Surfaces parameters declared as `ty` to the caller.
    pub fn register_passthrough_type(&self, ty: Ty) -> &Self {
        self.register(Hook::passthrough_type(ty))
    }

    fn invalidate(&self) {
        self.plans.clear();
        self.routes.clear();
        self.adapters.clear();
        tracing::debug!("hook registry changed, caches cleared");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Composition
    // ─────────────────────────────────────────────────────────────────────

    /// Composes `target` with its dependencies.
    ///
    /// Results are cached per target, per-call hooks, mode and forced
    /// dependencies until the next registration.
    ///
    /// # Errors
    ///
    /// Any [`ComposeError`]; nothing is cached on error.
    pub fn compose(
        &self,
        target: &Callable,
        options: &ComposeOptions,
    ) -> Result<Callable, ComposeError> {
        let key = CompositionKey {
            target: target.clone(),
            hooks: options.hooks.clone(),
            is_async: options.is_async,
            forced: options.forced.clone(),
        };
        self.plans.get_or_build(key, || self.build(target, options))
    }

    /// Composes `target` with no per-call hooks, inferred mode and no forced
    /// dependencies.
    ///
    /// # Errors
    ///
    /// Any [`ComposeError`].
    pub fn compose_default(&self, target: &Callable) -> Result<Callable, ComposeError> {
        self.compose(target, &ComposeOptions::default())
    }

    /// Returns the parameters of the composed `target`.
    ///
    /// # Errors
    ///
    /// Any [`ComposeError`].
    pub fn parameters(&self, target: &Callable) -> Result<Vec<Parameter>, ComposeError> {
        Ok(self.compose_default(target)?.params().to_vec())
    }

    fn build(&self, target: &Callable, options: &ComposeOptions) -> Result<Callable, ComposeError> {
        let registry = self.hooks();
        let graph = DependencyGraph::build(target, &options.hooks, &registry, &options.forced)?;
        let outer = reconcile(&graph)?;
        compile(
            &graph,
            outer,
            options.is_async,
            CompileOptions {
                inline: self.config.inlining(),
            },
        )
    }

    /// Composes `target` as a sync callable and calls it.
    ///
    /// # Errors
    ///
    /// [`EngineError::Compose`] if composition fails (including when a
    /// dependency is async), [`EngineError::Call`] if the call fails.
    pub fn invoke(&self, target: &Callable, args: Args) -> Result<Value, EngineError> {
        let composed = self.compose(target, &ComposeOptions::new().with_async(false))?;
        Ok(composed.call(args)?)
    }

    /// Composes `target` as an async callable and awaits it.
    ///
    /// # Errors
    ///
    /// [`EngineError::Compose`] if composition fails, [`EngineError::Call`]
    /// if the call fails.
    pub async fn invoke_async(&self, target: &Callable, args: Args) -> Result<Value, EngineError> {
        let composed = self.compose(target, &ComposeOptions::new().with_async(true))?;
        Ok(composed.call_async(args).await?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Direct calls
    // ─────────────────────────────────────────────────────────────────────

    fn route(&self, target: &Callable, args: &Args) -> Result<Arc<Routing>, CallError> {
        let key = DirectKey::new(target, args);
        self.routes.get_or_build(key.clone(), || {
            Routing::plan(target, key.positional(), key.keyword()).map(Arc::new)
        })
    }

    /// Calls `target` directly, routing the call-site arguments onto its
    /// parameters by name and type. No dependencies are composed and
    /// arguments that match nothing are ignored.
    ///
    /// # Errors
    ///
    /// [`CallError::UnresolvedArgument`] if a required parameter cannot be
    /// filled, [`CallError::AsyncCallable`] for an async target, or the
    /// target's own error.
    pub fn invoke_direct(&self, target: &Callable, args: Args) -> Result<Value, CallError> {
        let routing = self.route(target, &args)?;
        let values = routing.apply(target, args)?;
        target.call_bound(values)
    }

    /// Async form of [`invoke_direct`](Self::invoke_direct); works for sync
    /// and async targets.
    ///
    /// # Errors
    ///
    /// As [`invoke_direct`](Self::invoke_direct), minus the async check.
    pub async fn invoke_direct_async(
        &self,
        target: &Callable,
        args: Args,
    ) -> Result<Value, CallError> {
        let routing = self.route(target, &args)?;
        let values = routing.apply(target, args)?;
        target.call_bound_async(values).await
    }

    /// Produces a callable with a fixed call-site shape that forwards to
    /// `target`.
    ///
    /// `positional` predicates describe the positional arguments the adapted
    /// callable takes (`arg0`, `arg1`, ...); `keyword` predicates describe
    /// keyword arguments by name. Routing follows the same rules as
    /// [`invoke_direct`](Self::invoke_direct) with predicates in place of
    /// runtime types.
    ///
    /// # Errors
    ///
    /// [`CallError::UnresolvedArgument`] if a required parameter of `target`
    /// cannot be routed.
    pub fn adapt(
        &self,
        target: &Callable,
        positional: Vec<ParamPredicate>,
        keyword: Vec<(String, ParamPredicate)>,
    ) -> Result<Callable, CallError> {
        let key = AdaptKey::new(target, &positional, &keyword);
        self.adapters.get_or_build(key, || {
            let routing = Routing::plan(target, &positional, &keyword)?;
            tracing::debug!(
                callable = %target.name(),
                positional = positional.len(),
                keyword = keyword.len(),
                "adapted callable"
            );
            Ok(adapted(target, positional.len(), routing))
        })
    }
}
