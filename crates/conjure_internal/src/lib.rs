//! # Conjure Internal Library
//!
//! Re-exports the core Conjure crates for convenience.

/// Layer 1: values, signatures and callables.
pub use conjure_system;

/// Layer 2: hooks, dependency graphs and compiled plans.
pub use conjure_graph;

/// Layer 3: the engine, its caches and direct calls.
pub use conjure_engine;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use conjure_engine::prelude::*;
}
