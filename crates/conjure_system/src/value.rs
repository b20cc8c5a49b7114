//! Type-erased values and runtime type descriptors.
//!
//! Everything that flows through a composed call (call-site arguments,
//! factory results, defaults) is a [`Value`]. Declared parameter types and
//! the runtime types of values are both described by [`Ty`].
//!
//! # Subtyping
//!
//! A [`Ty`] lists its supertypes explicitly. A value is assignable to a
//! declared type when the types are equal or the declared type is among the
//! value's supertypes:
//!
//! ```
//! use conjure_system::value::Ty;
//!
//! struct Customer;
//! struct FrenchCustomer;
//!
//! let customer = Ty::of::<Customer>();
//! let french = Ty::of::<FrenchCustomer>().with_supertype(customer.clone());
//!
//! assert!(french.is_assignable_to(&customer));
//! assert!(!customer.is_assignable_to(&french));
//! ```

use core::any::{Any, TypeId};
use core::fmt;
use core::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::resource::{AcquiredScope, AsyncScopedResource, ScopeCell, ScopedResource};

// ─────────────────────────────────────────────────────────────────────────────
// Ty
// ─────────────────────────────────────────────────────────────────────────────

/// Runtime type descriptor.
///
/// Equality and hashing only consider the underlying [`TypeId`]; declared
/// supertypes affect [`is_assignable_to`](Self::is_assignable_to) only.
#[derive(Clone)]
pub struct Ty {
    id: TypeId,
    name: &'static str,
    supertypes: Arc<[Ty]>,
}

impl Ty {
    /// Returns the descriptor for `T`, with no declared supertypes.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: core::any::type_name::<T>(),
            supertypes: Arc::from(Vec::new()),
        }
    }

    /// Declares `supertype` as a behavioral supertype of this type.
    #[must_use]
    pub fn with_supertype(mut self, supertype: Ty) -> Self {
        let mut supertypes = self.supertypes.to_vec();
        supertypes.push(supertype);
        self.supertypes = Arc::from(supertypes);
        self
    }

    /// Returns the underlying `TypeId`.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Returns the type name for error messages.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the declared supertypes.
    #[must_use]
    pub fn supertypes(&self) -> &[Ty] {
        &self.supertypes
    }

    /// Returns `true` if this type is `target` or a declared (transitive)
    /// subtype of it.
    #[must_use]
    pub fn is_assignable_to(&self, target: &Ty) -> bool {
        self.id == target.id
            || self
                .supertypes
                .iter()
                .any(|supertype| supertype.is_assignable_to(target))
    }
}

impl PartialEq for Ty {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Ty {}

impl Hash for Ty {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ty({})", self.name)
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Returns the declared type for a closure parameter or return type.
///
/// [`Value`] itself means "untyped".
#[must_use]
pub fn declared_type<T: ?Sized + 'static>() -> Option<Ty> {
    if TypeId::of::<T>() == TypeId::of::<Value>() {
        None
    } else {
        Some(Ty::of::<T>())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Value
// ─────────────────────────────────────────────────────────────────────────────

/// A shared, immutable, type-erased value.
///
/// Cloning a `Value` is a reference-count increment, so a factory result
/// consumed by several dependents is never recomputed or deep-copied.
///
/// # Example
///
/// ```
/// use conjure_system::value::Value;
///
/// let value = Value::new(41_i64);
/// assert!(value.is::<i64>());
/// assert_eq!(value.extract::<i64>(), Some(41));
///
/// // Wrapping a Value again is a no-op.
/// let same = Value::new(value.clone());
/// assert_eq!(same.extract::<i64>(), Some(41));
/// ```
#[derive(Clone)]
pub struct Value {
    data: Arc<dyn Any + Send + Sync>,
    ty: Ty,
}

impl Value {
    /// Wraps `value`. Passing a [`Value`] returns it unchanged.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        let boxed: Box<dyn Any + Send + Sync> = Box::new(value);
        match boxed.downcast::<Value>() {
            Ok(value) => *value,
            Err(boxed) => Self {
                data: Arc::from(boxed),
                ty: Ty::of::<T>(),
            },
        }
    }

    /// Wraps `value` with an explicit runtime type descriptor.
    ///
    /// Used to attach declared supertypes to a value.
    ///
    /// # Panics
    ///
    /// Panics if `ty` does not describe `T`.
    pub fn with_type<T: Any + Send + Sync>(value: T, ty: Ty) -> Self {
        assert_eq!(
            ty.type_id(),
            TypeId::of::<T>(),
            "descriptor `{}` does not describe `{}`",
            ty.name(),
            core::any::type_name::<T>()
        );
        Self {
            data: Arc::new(value),
            ty,
        }
    }

    /// The unit value, produced by callables with nothing to return.
    #[must_use]
    pub fn unit() -> Self {
        Self::new(())
    }

    /// Wraps a synchronous scoped resource so a plan can acquire it.
    pub fn scope<R: ScopedResource>(resource: R) -> Self {
        Self::new(ScopeCell::new(AcquiredScope::Sync(Box::new(resource))))
    }

    /// Wraps an asynchronous scoped resource so a plan can acquire it.
    pub fn async_scope<R: AsyncScopedResource>(resource: R) -> Self {
        Self::new(ScopeCell::new(AcquiredScope::Async(Box::new(resource))))
    }

    /// Takes the scoped resource out of a value built with [`Value::scope`]
    /// or [`Value::async_scope`].
    ///
    /// Returns `None` for any other value, or if the resource was already
    /// taken.
    #[must_use]
    pub fn take_scope(&self) -> Option<AcquiredScope> {
        self.downcast_ref::<ScopeCell>().and_then(ScopeCell::take)
    }

    /// Returns the runtime type descriptor.
    #[must_use]
    pub fn ty(&self) -> &Ty {
        &self.ty
    }

    /// Returns `true` if the wrapped value is a `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.data.is::<T>()
    }

    /// Returns a reference to the wrapped value if it is a `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    /// Returns a shared handle to the wrapped value if it is a `T`.
    #[must_use]
    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.data).downcast::<T>().ok()
    }

    /// Clones the wrapped value out if it is a `T`.
    ///
    /// Extracting `Value` returns a clone of `self`.
    #[must_use]
    pub fn extract<T: Any + Clone>(&self) -> Option<T> {
        if let Some(value) = (self as &dyn Any).downcast_ref::<T>() {
            return Some(value.clone());
        }
        self.downcast_ref::<T>().cloned()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({})", self.ty.name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Args
// ─────────────────────────────────────────────────────────────────────────────

/// Call-site arguments: positional values plus keyword values.
///
/// Keywords keep their insertion order.
///
/// # Example
///
/// ```
/// use conjure_system::value::Args;
///
/// let args = Args::new().arg(5.0_f64).kwarg("name", String::from("conjure"));
/// assert_eq!(args.positional().len(), 1);
/// assert!(args.keyword().contains_key("name"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Args {
    positional: Vec<Value>,
    keyword: IndexMap<String, Value>,
}

impl Args {
    /// Creates an empty argument list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an argument list from positional values.
    #[must_use]
    pub fn from_values(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keyword: IndexMap::new(),
        }
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn arg<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.positional.push(Value::new(value));
        self
    }

    /// Sets a keyword argument.
    #[must_use]
    pub fn kwarg<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.keyword.insert(name.into(), Value::new(value));
        self
    }

    /// Returns the positional arguments.
    #[must_use]
    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    /// Returns the keyword arguments.
    #[must_use]
    pub fn keyword(&self) -> &IndexMap<String, Value> {
        &self.keyword
    }

    /// Returns the total number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positional.len() + self.keyword.len()
    }

    /// Returns `true` if there are no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Splits into positional and keyword parts.
    #[must_use]
    pub fn into_parts(self) -> (Vec<Value>, IndexMap<String, Value>) {
        (self.positional, self.keyword)
    }
}
