//! Callables: named, identity-compared units of computation.
//!
//! A [`Callable`] couples a [`Signature`] with a type-erased body. Bodies are
//! either synchronous or asynchronous; the composition engine uses that
//! distinction to decide whether a composed plan must be asynchronous.
//!
//! Two callables are equal only if they are clones of the same callable.
//! Builder adjustments such as [`Callable::with_default`] produce a new
//! identity when the callable is shared.
//!
//! # Example
//!
//! ```
//! use conjure_system::callable::Callable;
//! use conjure_system::value::Args;
//!
//! let add = Callable::from_fn("add", &["a", "b"], |a: i64, b: i64| a + b)
//!     .with_default("b", 1_i64);
//!
//! let result = add.call(Args::new().arg(41_i64)).unwrap();
//! assert_eq!(result.extract::<i64>(), Some(42));
//! ```

mod handler;

use core::fmt;
use core::future::Future;
use core::hash::{Hash, Hasher};
use core::pin::Pin;
use std::sync::Arc;

pub use handler::{ArgContext, AsyncFallible, AsyncPlain, Fallible, Handler, Plain};

use crate::error::CallError;
use crate::param::{Override, ParamKind, Parameter, Signature};
use crate::resource::ResourceKind;
use crate::value::{Args, Ty, Value};

/// A boxed future that is Send.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-erased synchronous body.
pub type SyncBody = Arc<dyn Fn(Vec<Value>) -> Result<Value, CallError> + Send + Sync>;

/// Type-erased asynchronous body.
pub type AsyncBody =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, CallError>> + Send + Sync>;

/// The body of a callable. Receives one value per parameter, in order.
#[derive(Clone)]
pub enum Body {
    /// Runs to completion on the calling thread.
    Sync(SyncBody),
    /// Returns a future.
    Async(AsyncBody),
}

#[derive(Clone)]
struct CallableInner {
    name: Arc<str>,
    signature: Signature,
    kind: ResourceKind,
    body: Body,
}

/// A named callable with a signature and a sync or async body.
#[derive(Clone)]
pub struct Callable(Arc<CallableInner>);

impl Callable {
    // ─────────────────────────────────────────────────────────────────────
    // Construction
    // ─────────────────────────────────────────────────────────────────────

    /// Creates a callable from a raw body.
    #[must_use]
    pub fn new(name: impl AsRef<str>, signature: Signature, body: Body) -> Self {
        Self(Arc::new(CallableInner {
            name: Arc::from(name.as_ref()),
            signature,
            kind: ResourceKind::None,
            body,
        }))
    }

    /// Creates a callable from a raw synchronous body.
    #[must_use]
    pub fn sync<F>(name: impl AsRef<str>, signature: Signature, body: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        Self::new(name, signature, Body::Sync(Arc::new(body)))
    }

    /// Creates a callable from a raw asynchronous body.
    #[must_use]
    pub fn asynchronous<F>(name: impl AsRef<str>, signature: Signature, body: F) -> Self
    where
        F: Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, CallError>>
            + Send
            + Sync
            + 'static,
    {
        Self::new(name, signature, Body::Async(Arc::new(body)))
    }

    fn from_handler<H, M>(name: &str, params: &[&str], handler: H) -> Self
    where
        H: Handler<M>,
    {
        let types = H::param_types();
        assert_eq!(
            params.len(),
            types.len(),
            "callable `{name}` declares {} parameter name(s) for {} closure parameter(s)",
            params.len(),
            types.len()
        );
        let signature = Signature::new(
            params
                .iter()
                .zip(types)
                .map(|(param, ty)| Parameter::new(param, ty))
                .collect(),
            H::return_type(),
        );
        let name: Arc<str> = Arc::from(name);
        let body = handler.into_body(ArgContext::new(Arc::clone(&name), params));
        Self(Arc::new(CallableInner {
            name,
            signature,
            kind: ResourceKind::None,
            body,
        }))
    }

    /// Creates a synchronous callable from a closure.
    ///
    /// `params` names the closure parameters in order. Declared types are the
    /// closure parameter types; [`Value`] parameters are untyped.
    ///
    /// # Panics
    ///
    /// Panics if `params` and the closure disagree on the parameter count.
    #[must_use]
    pub fn from_fn<F, M>(name: &str, params: &[&str], f: F) -> Self
    where
        F: Handler<Plain<M>>,
    {
        Self::from_handler::<F, Plain<M>>(name, params, f)
    }

    /// Creates a synchronous callable from a closure returning a `Result`.
    ///
    /// The error is wrapped in [`CallError::Failed`]; a [`CallError`] is
    /// passed through unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `params` and the closure disagree on the parameter count.
    #[must_use]
    pub fn try_from_fn<F, M>(name: &str, params: &[&str], f: F) -> Self
    where
        F: Handler<Fallible<M>>,
    {
        Self::from_handler::<F, Fallible<M>>(name, params, f)
    }

    /// Creates an asynchronous callable from a closure returning a future.
    ///
    /// # Panics
    ///
    /// Panics if `params` and the closure disagree on the parameter count.
    #[must_use]
    pub fn from_async_fn<F, M>(name: &str, params: &[&str], f: F) -> Self
    where
        F: Handler<AsyncPlain<M>>,
    {
        Self::from_handler::<F, AsyncPlain<M>>(name, params, f)
    }

    /// Creates an asynchronous callable from a closure returning a future of
    /// a `Result`.
    ///
    /// # Panics
    ///
    /// Panics if `params` and the closure disagree on the parameter count.
    #[must_use]
    pub fn try_from_async_fn<F, M>(name: &str, params: &[&str], f: F) -> Self
    where
        F: Handler<AsyncFallible<M>>,
    {
        Self::from_handler::<F, AsyncFallible<M>>(name, params, f)
    }

    /// Creates a factory of synchronous scoped resources.
    ///
    /// The closure returns [`Value::scope`]; composed plans enter the
    /// resource and exit it after the dependent steps have run. Factories
    /// that can fail are built with [`Callable::try_from_fn`] and
    /// [`Callable::with_resource_kind`].
    ///
    /// # Panics
    ///
    /// Panics if `params` and the closure disagree on the parameter count.
    #[must_use]
    pub fn scoped<F, M>(name: &str, params: &[&str], f: F) -> Self
    where
        F: Handler<Plain<M>>,
    {
        Self::from_fn(name, params, f).with_resource_kind(ResourceKind::Sync)
    }

    /// Creates a factory of asynchronous scoped resources.
    ///
    /// The closure returns [`Value::async_scope`].
    ///
    /// # Panics
    ///
    /// Panics if `params` and the closure disagree on the parameter count.
    #[must_use]
    pub fn async_scoped<F, M>(name: &str, params: &[&str], f: F) -> Self
    where
        F: Handler<Plain<M>>,
    {
        Self::from_fn(name, params, f).with_resource_kind(ResourceKind::Async)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Builder adjustments
    // ─────────────────────────────────────────────────────────────────────

    fn inner_mut(&mut self) -> &mut CallableInner {
        Arc::make_mut(&mut self.0)
    }

    fn param_mut(&mut self, name: &str) -> &mut Parameter {
        let callable = Arc::clone(&self.0.name);
        match self.inner_mut().signature.param_mut(name) {
            Some(param) => param,
            None => panic!("callable `{callable}` has no parameter `{name}`"),
        }
    }

    fn map_param(mut self, name: &str, f: impl FnOnce(Parameter) -> Parameter) -> Self {
        let param = self.param_mut(name);
        *param = f(param.clone());
        self
    }

    /// Gives parameter `name` a default value.
    ///
    /// # Panics
    ///
    /// Panics if there is no such parameter.
    #[must_use]
    pub fn with_default<T: core::any::Any + Send + Sync>(self, name: &str, value: T) -> Self {
        let value = Value::new(value);
        self.map_param(name, |param| param.with_default(value))
    }

    /// Makes parameter `name` keyword-only.
    ///
    /// # Panics
    ///
    /// Panics if there is no such parameter.
    #[must_use]
    pub fn keyword_only(self, name: &str) -> Self {
        self.map_param(name, |param| param.with_kind(ParamKind::KeywordOnly))
    }

    /// Makes parameter `name` positional-only.
    ///
    /// # Panics
    ///
    /// Panics if there is no such parameter.
    #[must_use]
    pub fn positional_only(self, name: &str) -> Self {
        self.map_param(name, |param| param.with_kind(ParamKind::PositionalOnly))
    }

    /// Removes the declared type of parameter `name`.
    ///
    /// # Panics
    ///
    /// Panics if there is no such parameter.
    #[must_use]
    pub fn untyped(self, name: &str) -> Self {
        self.map_param(name, |param| param.with_ty(None))
    }

    /// Sets the declared type of parameter `name`.
    ///
    /// # Panics
    ///
    /// Panics if there is no such parameter.
    #[must_use]
    pub fn with_param_type(self, name: &str, ty: Ty) -> Self {
        self.map_param(name, |param| param.with_ty(Some(ty)))
    }

    /// Attaches an [`Override`] to parameter `name`.
    ///
    /// # Panics
    ///
    /// Panics if there is no such parameter.
    #[must_use]
    pub fn with_override(self, name: &str, override_with: Override) -> Self {
        self.map_param(name, |param| param.with_override(override_with))
    }

    /// Sets the declared return type.
    #[must_use]
    pub fn returns(mut self, ty: Ty) -> Self {
        self.inner_mut().signature.set_returns(Some(ty));
        self
    }

    /// Sets the intrinsic resource kind.
    #[must_use]
    pub fn with_resource_kind(mut self, kind: ResourceKind) -> Self {
        self.inner_mut().kind = kind;
        self
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    /// Returns the name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Returns the signature.
    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.0.signature
    }

    /// Returns the parameters in declaration order.
    #[must_use]
    pub fn params(&self) -> &[Parameter] {
        self.0.signature.params()
    }

    /// Returns the declared return type.
    #[must_use]
    pub fn return_type(&self) -> Option<&Ty> {
        self.0.signature.returns()
    }

    /// Returns the intrinsic resource kind.
    #[must_use]
    pub fn resource_kind(&self) -> ResourceKind {
        self.0.kind
    }

    /// Returns `true` if the body is asynchronous.
    #[must_use]
    pub fn is_async(&self) -> bool {
        matches!(self.0.body, Body::Async(_))
    }

    /// Returns the body.
    #[must_use]
    pub fn body(&self) -> &Body {
        &self.0.body
    }

    // ─────────────────────────────────────────────────────────────────────
    // Invocation
    // ─────────────────────────────────────────────────────────────────────

    /// Binds `args` and calls a synchronous callable.
    ///
    /// # Errors
    ///
    /// Binding errors, [`CallError::AsyncCallable`] for asynchronous bodies,
    /// or whatever the body returns.
    pub fn call(&self, args: Args) -> Result<Value, CallError> {
        let bound = self.0.signature.bind(&self.0.name, args)?;
        self.call_bound(bound)
    }

    /// Calls a synchronous callable with one value per parameter.
    ///
    /// # Errors
    ///
    /// [`CallError::AsyncCallable`] for asynchronous bodies, or whatever the
    /// body returns.
    pub fn call_bound(&self, args: Vec<Value>) -> Result<Value, CallError> {
        match &self.0.body {
            Body::Sync(body) => body(args),
            Body::Async(_) => Err(CallError::AsyncCallable {
                callable: self.0.name.to_string(),
            }),
        }
    }

    /// Binds `args` and calls the callable, awaiting it if asynchronous.
    ///
    /// A synchronous body runs when the future is first polled.
    pub fn call_async(&self, args: Args) -> BoxFuture<'static, Result<Value, CallError>> {
        match self.0.signature.bind(&self.0.name, args) {
            Ok(bound) => self.call_bound_async(bound),
            Err(error) => Box::pin(async move { Err(error) }),
        }
    }

    /// Calls the callable with one value per parameter, awaiting it if
    /// asynchronous.
    pub fn call_bound_async(
        &self,
        args: Vec<Value>,
    ) -> BoxFuture<'static, Result<Value, CallError>> {
        match &self.0.body {
            Body::Sync(body) => {
                let body = Arc::clone(body);
                Box::pin(async move { body(args) })
            }
            Body::Async(body) => body(args),
        }
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Callable {}

impl Hash for Callable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).cast::<()>().hash(state);
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("name", &self.0.name)
            .field("params", &self.0.signature.params())
            .field("kind", &self.0.kind)
            .field("is_async", &self.is_async())
            .finish()
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::scope_fn;

    #[derive(Debug, thiserror::Error)]
    #[error("denied")]
    struct Denied;

    #[test]
    fn from_fn_declares_types_from_closure() {
        let f = Callable::from_fn("f", &["a", "b"], |a: i64, _b: Value| a);
        let params = f.params();
        assert_eq!(params[0].ty(), Some(&Ty::of::<i64>()));
        assert_eq!(params[1].ty(), None);
        assert_eq!(f.return_type(), Some(&Ty::of::<i64>()));
        assert!(!f.is_async());
    }

    #[test]
    #[should_panic(expected = "declares 1 parameter name(s) for 2 closure parameter(s)")]
    fn from_fn_rejects_name_count_mismatch() {
        let _ = Callable::from_fn("f", &["a"], |a: i64, b: i64| a + b);
    }

    #[test]
    fn try_from_fn_wraps_user_errors() {
        let f = Callable::try_from_fn("guard", &[], || Err::<(), _>(Denied));
        let err = f.call(Args::new()).unwrap_err();
        assert!(err.failure_ref::<Denied>().is_some());
        assert_eq!(err.callable(), "guard");
    }

    #[test]
    fn try_from_fn_passes_call_errors_through() {
        let f = Callable::try_from_fn("outer", &[], || {
            Err::<(), _>(CallError::AsyncCallable {
                callable: "inner".into(),
            })
        });
        let err = f.call(Args::new()).unwrap_err();
        assert!(matches!(err, CallError::AsyncCallable { ref callable } if callable == "inner"));
    }

    #[test]
    fn sync_call_of_async_callable_fails() {
        let f = Callable::from_async_fn("f", &[], || async { 1_u8 });
        assert!(f.is_async());
        let err = f.call(Args::new()).unwrap_err();
        assert!(matches!(err, CallError::AsyncCallable { .. }));
    }

    #[tokio::test]
    async fn call_async_runs_both_kinds() {
        let sync = Callable::from_fn("sync", &["x"], |x: i32| x * 2);
        let asynchronous = Callable::from_async_fn("async", &["x"], |x: i32| async move { x * 3 });

        let a = sync.call_async(Args::new().arg(2_i32)).await.unwrap();
        let b = asynchronous.call_async(Args::new().arg(2_i32)).await.unwrap();
        assert_eq!(a.extract::<i32>(), Some(4));
        assert_eq!(b.extract::<i32>(), Some(6));
    }

    #[tokio::test]
    async fn try_from_async_fn_wraps_user_errors() {
        let f = Callable::try_from_async_fn("f", &[], || async { Err::<u8, _>(Denied) });
        let err = f.call_async(Args::new()).await.unwrap_err();
        assert!(err.failure_ref::<Denied>().is_some());
    }

    #[test]
    fn identity_equality() {
        let f = Callable::from_fn("f", &[], || 1_u8);
        let g = Callable::from_fn("f", &[], || 1_u8);
        assert_eq!(f, f.clone());
        assert_ne!(f, g);
    }

    #[test]
    fn builders_on_shared_callable_create_new_identity() {
        let f = Callable::from_fn("f", &["a"], |a: i64| a);
        let g = f.clone().with_default("a", 5_i64);
        assert_ne!(f, g);
        assert!(!f.params()[0].has_default());
        assert!(g.params()[0].has_default());
    }

    #[test]
    fn builders_adjust_parameters() {
        let f = Callable::from_fn("f", &["a", "b"], |a: Value, b: i64| (a, b))
            .keyword_only("b")
            .with_default("b", 0_i64)
            .with_param_type("a", Ty::of::<String>())
            .returns(Ty::of::<u8>());
        assert!(f.params()[1].is_optional_keyword_only());
        assert_eq!(f.params()[0].ty(), Some(&Ty::of::<String>()));
        assert_eq!(f.return_type(), Some(&Ty::of::<u8>()));
    }

    #[test]
    #[should_panic(expected = "has no parameter `missing`")]
    fn builders_reject_unknown_parameter() {
        let _ = Callable::from_fn("f", &[], || 1_u8).with_default("missing", 1_u8);
    }

    #[test]
    fn scoped_sets_resource_kind() {
        let f = Callable::scoped("session", &[], || {
            Value::scope(scope_fn(|| Ok(Value::unit()), |_| Ok(())))
        });
        assert_eq!(f.resource_kind(), ResourceKind::Sync);
        assert_eq!(f.return_type(), None);
    }

    #[test]
    fn raw_sync_body_receives_bound_values() {
        let sig = Signature::new(vec![Parameter::typed::<i64>("n")], Some(Ty::of::<i64>()));
        let f = Callable::sync("double", sig, |args| {
            let n = args[0].extract::<i64>().unwrap_or_default();
            Ok(Value::new(n * 2))
        });
        let result = f.call(Args::new().kwarg("n", 21_i64)).unwrap();
        assert_eq!(result.extract::<i64>(), Some(42));
    }
}
