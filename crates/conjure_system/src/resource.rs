//! Scoped resources: values with an acquire/release lifecycle.
//!
//! A scoped factory returns a resource wrapped with [`Value::scope`] or
//! [`Value::async_scope`]. The composed plan enters it, hands the entered
//! value to dependents, and exits it once the rest of the plan has finished,
//! whether that ended in a value or an error. Nested scopes exit in reverse
//! order of entry.
//!
//! # Example
//!
//! ```
//! use conjure_system::resource::{scope_fn, ScopedResource};
//! use conjure_system::value::Value;
//!
//! let mut session = scope_fn(
//!     || Ok(Value::new(String::from("session"))),
//!     |_error| Ok(()),
//! );
//! let entered = session.enter().unwrap();
//! assert_eq!(entered.extract::<String>().as_deref(), Some("session"));
//! session.exit(None).unwrap();
//! ```

use core::fmt;

use parking_lot::Mutex;

use crate::callable::BoxFuture;
use crate::error::{BoxError, CallError};
use crate::value::Value;

/// The kind of resource a factory produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceKind {
    /// A plain value.
    #[default]
    None,
    /// A [`ScopedResource`].
    Sync,
    /// An [`AsyncScopedResource`].
    Async,
}

impl ResourceKind {
    /// Returns `true` for `Sync` and `Async`.
    #[must_use]
    pub fn is_scoped(self) -> bool {
        self != Self::None
    }
}

/// A synchronous acquire/release capability.
pub trait ScopedResource: Send + 'static {
    /// Acquires the resource, returning the value dependents receive.
    ///
    /// # Errors
    ///
    /// Returns the user error if acquisition fails; the resource is then not
    /// exited.
    fn enter(&mut self) -> Result<Value, BoxError>;

    /// Releases the resource. `error` is the failure the scope is exiting
    /// with, if any.
    ///
    /// # Errors
    ///
    /// Returns the user error if release fails.
    fn exit(&mut self, error: Option<&CallError>) -> Result<(), BoxError>;
}

/// An asynchronous acquire/release capability.
pub trait AsyncScopedResource: Send + 'static {
    /// Acquires the resource, returning the value dependents receive.
    fn enter(&mut self) -> BoxFuture<'_, Result<Value, BoxError>>;

    /// Releases the resource. `error` is the failure the scope is exiting
    /// with, if any.
    fn exit<'a>(&'a mut self, error: Option<&'a CallError>)
    -> BoxFuture<'a, Result<(), BoxError>>;
}

/// A scoped resource taken out of a [`Value`], ready to be entered.
pub enum AcquiredScope {
    /// Synchronous resource.
    Sync(Box<dyn ScopedResource>),
    /// Asynchronous resource.
    Async(Box<dyn AsyncScopedResource>),
}

impl AcquiredScope {
    /// Returns the matching [`ResourceKind`].
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Sync(_) => ResourceKind::Sync,
            Self::Async(_) => ResourceKind::Async,
        }
    }
}

impl fmt::Debug for AcquiredScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("AcquiredScope::Sync"),
            Self::Async(_) => f.write_str("AcquiredScope::Async"),
        }
    }
}

/// Holder stored inside a [`Value`] until a plan takes the resource.
pub struct ScopeCell(Mutex<Option<AcquiredScope>>);

impl ScopeCell {
    pub(crate) fn new(scope: AcquiredScope) -> Self {
        Self(Mutex::new(Some(scope)))
    }

    /// Takes the resource; `None` once taken.
    #[must_use]
    pub fn take(&self) -> Option<AcquiredScope> {
        self.0.lock().take()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Closure-backed resources
// ─────────────────────────────────────────────────────────────────────────────

/// A [`ScopedResource`] built from an enter closure and an exit closure.
pub struct ScopeFn<E, X> {
    enter: E,
    exit: X,
}

/// Builds a [`ScopedResource`] from closures.
pub fn scope_fn<E, X>(enter: E, exit: X) -> ScopeFn<E, X>
where
    E: FnMut() -> Result<Value, BoxError> + Send + 'static,
    X: FnMut(Option<&CallError>) -> Result<(), BoxError> + Send + 'static,
{
    ScopeFn { enter, exit }
}

impl<E, X> ScopedResource for ScopeFn<E, X>
where
    E: FnMut() -> Result<Value, BoxError> + Send + 'static,
    X: FnMut(Option<&CallError>) -> Result<(), BoxError> + Send + 'static,
{
    fn enter(&mut self) -> Result<Value, BoxError> {
        (self.enter)()
    }

    fn exit(&mut self, error: Option<&CallError>) -> Result<(), BoxError> {
        (self.exit)(error)
    }
}
