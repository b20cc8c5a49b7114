//! The Conjure engine (Layer 3).
//!
//! [`Engine`] owns a registry of hooks and turns target callables into
//! composed callables whose dependencies are resolved through those hooks.
//! Composed callables are cached until the next registration.
//!
//! # Example
//!
//! ```
//! use conjure_engine::prelude::*;
//!
//! let engine = Engine::new();
//! engine.register_by_name(
//!     "dep",
//!     Callable::from_fn("dep", &["input"], |input: f64| input * 2.0),
//! );
//!
//! let target = Callable::from_fn("target", &["dep", "input"], |dep: f64, input: f64| dep + input);
//! let params = engine.parameters(&target).unwrap();
//! assert_eq!(params.len(), 1);
//!
//! let result = engine.invoke(&target, Args::new().arg(4.0_f64)).unwrap();
//! assert_eq!(result.extract::<f64>(), Some(12.0));
//! ```
//!
//! # Architecture
//!
//! - **Layer 1** (`conjure_system`): callables and values
//! - **Layer 2** (`conjure_graph`): hooks, dependency graphs and plans
//! - **Layer 3** (`conjure_engine`): the engine, its caches and direct calls (this crate)

/// Generation-checked build caches.
pub mod cache;

/// Engine configuration.
pub mod config;

/// Direct-call routing and adapted callables.
pub mod direct;

/// The engine.
pub mod engine;

/// Engine errors.
pub mod error;

/// Tracing subscriber setup.
pub mod telemetry;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::direct::{Route, Routing};
    pub use crate::engine::{ComposeOptions, Engine};
    pub use crate::error::EngineError;
    pub use crate::telemetry::{TracingConfig, TracingFormat};
    pub use conjure_graph::prelude::*;
    pub use conjure_system::prelude::*;
}

// Re-export key types at crate root for convenience
pub use config::EngineConfig;
pub use engine::{ComposeOptions, Engine};
pub use error::EngineError;
