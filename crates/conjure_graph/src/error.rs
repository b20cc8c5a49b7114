//! Composition errors.
//!
//! Every [`ComposeError`] is raised while a plan is being built, before any
//! user code runs.

use core::fmt;

/// Errors raised while building, reconciling or compiling a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeError {
    /// Two parameters sharing one outer name declare different types.
    TypeConflict {
        /// The outer parameter name.
        argument: String,
        /// The type declared first.
        first: &'static str,
        /// The conflicting type.
        second: &'static str,
    },
    /// A synchronous plan was requested but a node is asynchronous.
    AsyncMismatch {
        /// The asynchronous factory (or target).
        factory: String,
    },
    /// The factories depend on each other in a cycle.
    CyclicDependency {
        /// Names along the cycle, first name repeated at the end.
        cycle: Vec<String>,
    },
    /// A registration could not be turned into a hook.
    Configuration {
        /// What is wrong.
        reason: String,
    },
}

impl fmt::Display for ComposeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComposeError::TypeConflict {
                argument,
                first,
                second,
            } => {
                write!(
                    f,
                    "unable to reconcile types `{first}` and `{second}` for argument `{argument}`"
                )
            }
            ComposeError::AsyncMismatch { factory } => {
                write!(
                    f,
                    "the composed call would be asynchronous because of `{factory}`; \
                     use the async entry point"
                )
            }
            ComposeError::CyclicDependency { cycle } => {
                write!(f, "cyclic dependency: {}", cycle.join(" -> "))
            }
            ComposeError::Configuration { reason } => {
                write!(f, "configuration error: {reason}")
            }
        }
    }
}

impl core::error::Error for ComposeError {}
