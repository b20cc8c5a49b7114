//! Hooks: rules deciding how a parameter gets its value.
//!
//! A [`Hook`] pairs a parameter predicate with an optional resolver. When the
//! predicate matches, the resolver names the factory whose result becomes
//! the argument. A hook without a resolver is a passthrough: the parameter
//! is surfaced to the caller as an outer parameter.
//!
//! # Example
//!
//! ```
//! use conjure_graph::hook::Hook;
//! use conjure_system::prelude::*;
//!
//! let config = Callable::from_fn("config", &[], || 5_i64);
//! let hook = Hook::for_name("limit", config.clone());
//!
//! let limit = Parameter::typed::<i64>("limit");
//! assert!(hook.matches(&limit));
//! let (factory, kind) = hook.resolve(&limit).unwrap();
//! assert_eq!(factory, config);
//! assert_eq!(kind, ResourceKind::None);
//! ```

use core::fmt;
use core::hash::{Hash, Hasher};
use std::sync::Arc;

use conjure_system::callable::Callable;
use conjure_system::param::{ParamPredicate, Parameter};
use conjure_system::resource::ResourceKind;
use conjure_system::value::Ty;

/// Produces the factory for a matched parameter.
pub type FactoryProvider = Arc<dyn Fn(&Parameter) -> Callable + Send + Sync>;

/// The resolving half of a hook.
#[derive(Clone)]
pub struct Resolver {
    provider: FactoryProvider,
    kind: Option<ResourceKind>,
}

impl Resolver {
    /// Returns the factory for `param` and the resource kind to treat it as.
    ///
    /// The resolver's kind wins over the factory's intrinsic kind.
    #[must_use]
    pub fn resolve(&self, param: &Parameter) -> (Callable, ResourceKind) {
        let factory = (self.provider)(param);
        let kind = self.kind.unwrap_or_else(|| factory.resource_kind());
        (factory, kind)
    }

    /// Returns the kind override, if any.
    #[must_use]
    pub fn kind(&self) -> Option<ResourceKind> {
        self.kind
    }
}

#[derive(Clone)]
struct HookInner {
    predicate: ParamPredicate,
    resolver: Option<Resolver>,
}

/// A parameter-resolution rule. Compared by identity.
#[derive(Clone)]
pub struct Hook(Arc<HookInner>);

impl Hook {
    /// Creates a hook resolving matching parameters with `factory`.
    #[must_use]
    pub fn new<P>(predicate: P, factory: Callable) -> Self
    where
        P: Fn(&Parameter) -> bool + Send + Sync + 'static,
    {
        Self::with_provider(predicate, move |_: &Parameter| factory.clone())
    }

    /// Creates a hook whose factory is computed from the matched parameter.
    #[must_use]
    pub fn with_provider<P, F>(predicate: P, provider: F) -> Self
    where
        P: Fn(&Parameter) -> bool + Send + Sync + 'static,
        F: Fn(&Parameter) -> Callable + Send + Sync + 'static,
    {
        Self(Arc::new(HookInner {
            predicate: Arc::new(predicate),
            resolver: Some(Resolver {
                provider: Arc::new(provider),
                kind: None,
            }),
        }))
    }

    /// Creates a passthrough hook: matching parameters become outer
    /// parameters even if a later hook could resolve them.
    #[must_use]
    pub fn passthrough<P>(predicate: P) -> Self
    where
        P: Fn(&Parameter) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(HookInner {
            predicate: Arc::new(predicate),
            resolver: None,
        }))
    }

    /// Matches parameters named `name`.
    #[must_use]
    pub fn for_name(name: impl Into<String>, factory: Callable) -> Self {
        let name = name.into();
        Self::new(move |param| param.name() == name, factory)
    }

    /// Matches parameters declared exactly as `ty`; subtypes do not match.
    #[must_use]
    pub fn for_type(ty: Ty, factory: Callable) -> Self {
        Self::new(move |param| param.ty() == Some(&ty), factory)
    }

    /// Matches parameters declared as `ty` or a declared subtype of it.
    #[must_use]
    pub fn for_subtypes_of(ty: Ty, factory: Callable) -> Self {
        Self::new(
            move |param| param.ty().is_some_and(|declared| declared.is_assignable_to(&ty)),
            factory,
        )
    }

    /// Passthrough for parameters named `name`.
    #[must_use]
    pub fn passthrough_name(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::passthrough(move |param| param.name() == name)
    }

    /// Passthrough for parameters declared exactly as `ty`.
    #[must_use]
    pub fn passthrough_type(ty: Ty) -> Self {
        Self::passthrough(move |param| param.ty() == Some(&ty))
    }

    /// Treats the resolved factory as producing `kind` resources, whatever
    /// its intrinsic kind. No effect on passthrough hooks.
    #[must_use]
    pub fn with_resource_kind(mut self, kind: ResourceKind) -> Self {
        if let Some(resolver) = &mut Arc::make_mut(&mut self.0).resolver {
            resolver.kind = Some(kind);
        }
        self
    }

    /// Returns `true` if this hook applies to `param`.
    #[must_use]
    pub fn matches(&self, param: &Parameter) -> bool {
        (self.0.predicate)(param)
    }

    /// Returns the factory and resource kind for `param`, `None` for
    /// passthrough hooks.
    #[must_use]
    pub fn resolve(&self, param: &Parameter) -> Option<(Callable, ResourceKind)> {
        self.0.resolver.as_ref().map(|resolver| resolver.resolve(param))
    }

    /// Returns the resolver, `None` for passthrough hooks.
    #[must_use]
    pub fn resolver(&self) -> Option<&Resolver> {
        self.0.resolver.as_ref()
    }

    /// Returns `true` for passthrough hooks.
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        self.0.resolver.is_none()
    }
}

impl PartialEq for Hook {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Hook {}

impl Hash for Hook {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).cast::<()>().hash(state);
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("passthrough", &self.is_passthrough())
            .field("kind", &self.0.resolver.as_ref().and_then(Resolver::kind))
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HookRegistry
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered hooks, most recently registered first.
#[derive(Debug, Clone, Default)]
pub struct HookRegistry {
    hooks: Vec<Hook>,
}

impl HookRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `hook` ahead of every existing hook.
    pub fn insert(&mut self, hook: Hook) {
        self.hooks.insert(0, hook);
    }

    /// Returns the hooks in evaluation order.
    #[must_use]
    pub fn hooks(&self) -> &[Hook] {
        &self.hooks
    }

    /// Returns the number of hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns `true` if no hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}
