//! Compose callables with the factories that produce their arguments.
//!
//! Register factories on an [`Engine`](conjure_engine::Engine) through hooks,
//! then compose a target: every parameter a hook resolves is filled by its
//! factory (recursively), and the composed callable only asks the caller
//! for what is left.
//!
//! ```
//! use conjure::prelude::*;
//!
//! let engine = Engine::new();
//! engine.register_by_name("dep2", Callable::from_fn("dep2", &[], || 2_i64));
//! engine.register_by_name("dep1", Callable::from_fn("dep1", &["dep2"], |dep2: i64| dep2 + 1));
//!
//! let target = Callable::from_fn("target", &["dep1"], |dep1: i64| dep1 + 1);
//! let result = engine.invoke(&target, Args::new()).unwrap();
//! assert_eq!(result.extract::<i64>(), Some(4));
//! ```

pub use conjure_internal::*;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use conjure_internal::prelude::*;
}
