//! Engine configuration.

/// Configuration for an [`Engine`](crate::engine::Engine).
///
/// # Example
///
/// ```
/// use conjure_engine::prelude::*;
///
/// let engine = Engine::with_config(
///     EngineConfig::default()
///         .with_inlining(false)
///         .with_direct_cache(false),
/// );
/// assert!(engine.config().plan_cache());
/// assert!(!engine.config().inlining());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    plan_cache: bool,
    inlining: bool,
    direct_cache: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            plan_cache: true,
            inlining: true,
            direct_cache: true,
        }
    }
}

impl EngineConfig {
    /// Creates the default configuration: every cache enabled, inlining on.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables caching of composed callables.
    ///
    /// With the cache disabled every `compose` builds a fresh plan.
    #[must_use]
    pub fn with_plan_cache(mut self, enabled: bool) -> Self {
        self.plan_cache = enabled;
        self
    }

    /// Enables or disables inlining of single-use plain factories.
    #[must_use]
    pub fn with_inlining(mut self, enabled: bool) -> Self {
        self.inlining = enabled;
        self
    }

    /// Enables or disables caching of direct-call routes and adapted
    /// callables.
    #[must_use]
    pub fn with_direct_cache(mut self, enabled: bool) -> Self {
        self.direct_cache = enabled;
        self
    }

    /// Returns `true` if composed callables are cached.
    #[must_use]
    pub fn plan_cache(&self) -> bool {
        self.plan_cache
    }

    /// Returns `true` if plans inline single-use factories.
    #[must_use]
    pub fn inlining(&self) -> bool {
        self.inlining
    }

    /// Returns `true` if direct-call routes are cached.
    #[must_use]
    pub fn direct_cache(&self) -> bool {
        self.direct_cache
    }
}
