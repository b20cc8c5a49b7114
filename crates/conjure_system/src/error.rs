//! Call-time errors.

use core::error::Error;

/// Boxed error type returned by user callables and scoped resources.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Errors raised while calling a [`Callable`](crate::callable::Callable).
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// A required parameter received no value.
    #[error("`{callable}` is missing a value for parameter `{param}`")]
    UnresolvedArgument {
        /// Name of the callable.
        callable: String,
        /// Name of the parameter.
        param: String,
    },

    /// More positional arguments than positional parameters.
    #[error("`{callable}` takes {expected} positional argument(s) but {given} were given")]
    TooManyArguments {
        /// Name of the callable.
        callable: String,
        /// Number of positional parameters.
        expected: usize,
        /// Number of positional arguments supplied.
        given: usize,
    },

    /// A keyword that matches no keyword-capable parameter.
    #[error("`{callable}` got an unexpected keyword argument `{name}`")]
    UnexpectedKeyword {
        /// Name of the callable.
        callable: String,
        /// The keyword.
        name: String,
    },

    /// A parameter supplied both positionally and by keyword.
    #[error("`{callable}` got multiple values for argument `{name}`")]
    DuplicateArgument {
        /// Name of the callable.
        callable: String,
        /// Name of the parameter.
        name: String,
    },

    /// A value whose runtime type does not fit the declared type.
    #[error("`{callable}` expected `{expected}` for parameter `{param}`, found `{found}`")]
    ArgumentType {
        /// Name of the callable.
        callable: String,
        /// Name of the parameter.
        param: String,
        /// Declared type name.
        expected: &'static str,
        /// Runtime type name of the supplied value.
        found: &'static str,
    },

    /// An asynchronous callable invoked through a synchronous entry point.
    #[error("`{callable}` is asynchronous; call it through the async entry point")]
    AsyncCallable {
        /// Name of the callable.
        callable: String,
    },

    /// A scoped factory that did not produce a scoped resource.
    #[error("scoped factory `{factory}` returned `{found}` instead of a scoped resource")]
    ScopeExpected {
        /// Name of the factory.
        factory: String,
        /// Runtime type name of what it returned.
        found: &'static str,
    },

    /// An error raised by user code.
    #[error("`{callable}` failed: {source}")]
    Failed {
        /// Name of the callable (or scoped factory) that failed.
        callable: String,
        /// The underlying error.
        #[source]
        source: BoxError,
    },
}

impl CallError {
    /// Wraps a user error raised by `callable`.
    pub fn failed(callable: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Failed {
            callable: callable.into(),
            source: source.into(),
        }
    }

    /// Wraps a boxed user error, passing a boxed [`CallError`] through
    /// unchanged.
    #[must_use]
    pub fn from_boxed(callable: &str, error: BoxError) -> Self {
        match error.downcast::<CallError>() {
            Ok(error) => *error,
            Err(source) => Self::Failed {
                callable: callable.to_owned(),
                source,
            },
        }
    }

    /// Returns the user error if this is a [`CallError::Failed`] wrapping an `E`.
    #[must_use]
    pub fn failure_ref<E: Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Failed { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Returns the name of the callable the error is attributed to.
    #[must_use]
    pub fn callable(&self) -> &str {
        match self {
            Self::UnresolvedArgument { callable, .. }
            | Self::TooManyArguments { callable, .. }
            | Self::UnexpectedKeyword { callable, .. }
            | Self::DuplicateArgument { callable, .. }
            | Self::ArgumentType { callable, .. }
            | Self::AsyncCallable { callable }
            | Self::Failed { callable, .. } => callable,
            Self::ScopeExpected { factory, .. } => factory,
        }
    }
}
