//! Values, signatures and callables for Conjure (Layer 1).
//!
//! `conjure_system` provides the primitives the composition engine works on:
//!
//! - [`value`] - Type-erased values, runtime type descriptors, call-site arguments
//! - [`param`] - Parameters, signatures and argument binding
//! - [`callable`] - Sync and async callables built from closures or raw bodies
//! - [`resource`] - Scoped resources with an acquire/release lifecycle
//! - [`error`] - Call-time errors
//!
//! # Architecture
//!
//! This crate is Layer 1 of the Conjure architecture:
//!
//! - **Layer 1** (`conjure_system`): callables and values (this crate)
//! - **Layer 2** (`conjure_graph`): hooks, dependency graphs and compiled plans
//! - **Layer 3** (`conjure_engine`): the engine, its caches and direct calls
//!
//! # Example
//!
//! ```
//! use conjure_system::prelude::*;
//!
//! let greet = Callable::from_fn("greet", &["name", "punctuation"], |name: String, p: char| {
//!     format!("hello {name}{p}")
//! })
//! .with_default("punctuation", '!');
//!
//! let out = greet
//!     .call(Args::new().kwarg("name", String::from("conjure")))
//!     .unwrap();
//! assert_eq!(out.extract::<String>().as_deref(), Some("hello conjure!"));
//! ```

/// Callables: named, identity-compared units of computation.
pub mod callable;

/// Call-time errors.
pub mod error;

/// Parameters, signatures and argument binding.
pub mod param;

/// Scoped resources with an acquire/release lifecycle.
pub mod resource;

/// Type-erased values and runtime type descriptors.
pub mod value;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::callable::*;
    pub use crate::error::*;
    pub use crate::param::*;
    pub use crate::resource::*;
    pub use crate::value::*;
}
