//! Typed closures as callable bodies.
//!
//! [`Handler`] is implemented for closures of up to eight parameters. The
//! marker type parameter selects the flavor of closure and keeps the impls
//! from overlapping:
//!
//! | Marker | Closure shape | Constructor |
//! |--------|---------------|-------------|
//! | [`Plain`] | `Fn(P..) -> R` | [`from_fn`] |
//! | [`Fallible`] | `Fn(P..) -> Result<R, E>` | [`try_from_fn`] |
//! | [`AsyncPlain`] | `Fn(P..) -> impl Future<Output = R>` | [`from_async_fn`] |
//! | [`AsyncFallible`] | `Fn(P..) -> impl Future<Output = Result<R, E>>` | [`try_from_async_fn`] |
//!
//! Parameters are cloned out of the bound [`Value`]s. A parameter of type
//! [`Value`] receives the value as-is and is declared untyped.
//!
//! [`from_fn`]: super::Callable::from_fn
//! [`try_from_fn`]: super::Callable::try_from_fn
//! [`from_async_fn`]: super::Callable::from_async_fn
//! [`try_from_async_fn`]: super::Callable::try_from_async_fn

use core::any::Any;
use core::future::Future;
use core::marker::PhantomData;
use std::sync::Arc;

use variadics_please::all_tuples;

use super::{Body, BoxFuture};
use crate::error::{BoxError, CallError};
use crate::value::{Ty, Value, declared_type};

/// Marker for infallible synchronous closures.
pub struct Plain<M>(PhantomData<M>);

/// Marker for fallible synchronous closures.
pub struct Fallible<M>(PhantomData<M>);

/// Marker for infallible asynchronous closures.
pub struct AsyncPlain<M>(PhantomData<M>);

/// Marker for fallible asynchronous closures.
pub struct AsyncFallible<M>(PhantomData<M>);

/// A closure usable as a callable body.
pub trait Handler<Marker>: Send + Sync + Sized + 'static {
    /// Declared parameter types, in order. `None` for [`Value`] parameters.
    fn param_types() -> Vec<Option<Ty>>;

    /// Declared return type. `None` for [`Value`].
    fn return_type() -> Option<Ty>;

    /// Converts the closure into a type-erased body.
    fn into_body(self, ctx: ArgContext) -> Body;
}

/// Name information used to attribute extraction and user errors.
#[derive(Debug, Clone)]
pub struct ArgContext {
    callable: Arc<str>,
    params: Arc<[Arc<str>]>,
}

impl ArgContext {
    pub(crate) fn new(callable: Arc<str>, params: &[&str]) -> Self {
        Self {
            callable,
            params: params.iter().map(|name| Arc::from(*name)).collect(),
        }
    }

    fn param(&self, index: usize) -> &str {
        self.params.get(index).map_or("?", |name| name)
    }

    /// Clones argument `index` out as a `T`.
    ///
    /// # Errors
    ///
    /// [`CallError::UnresolvedArgument`] if the argument is missing,
    /// [`CallError::ArgumentType`] if it is not a `T`.
    pub fn extract<T: Any + Clone>(
        &self,
        index: usize,
        arg: Option<Value>,
    ) -> Result<T, CallError> {
        let value = arg.ok_or_else(|| CallError::UnresolvedArgument {
            callable: self.callable.to_string(),
            param: self.param(index).to_owned(),
        })?;
        value.extract::<T>().ok_or_else(|| CallError::ArgumentType {
            callable: self.callable.to_string(),
            param: self.param(index).to_owned(),
            expected: core::any::type_name::<T>(),
            found: value.ty().name(),
        })
    }

    /// Wraps a user error, passing [`CallError`]s through unchanged.
    #[must_use]
    pub fn fail(&self, error: BoxError) -> CallError {
        CallError::from_boxed(&self.callable, error)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Synchronous closures
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! impl_sync_handler {
    ($($P:ident),*) => {
        #[allow(
            non_snake_case,
            unused_mut,
            unused_variables,
            unused_assignments,
            reason = "macro-generated bindings reuse the type parameter names"
        )]
        impl<F, R, $($P,)*> Handler<Plain<fn($($P,)*) -> R>> for F
        where
            F: Fn($($P),*) -> R + Send + Sync + 'static,
            R: Any + Send + Sync,
            $($P: Any + Clone + Send + Sync,)*
        {
            fn param_types() -> Vec<Option<Ty>> {
                vec![$(declared_type::<$P>()),*]
            }

            fn return_type() -> Option<Ty> {
                declared_type::<R>()
            }

            fn into_body(self, ctx: ArgContext) -> Body {
                let body = move |args: Vec<Value>| -> Result<Value, CallError> {
                    let mut args = args.into_iter();
                    let mut index = 0;
                    $(
                        let $P = ctx.extract::<$P>(index, args.next())?;
                        index += 1;
                    )*
                    Ok(Value::new((self)($($P),*)))
                };
                Body::Sync(Arc::new(body))
            }
        }

        #[allow(
            non_snake_case,
            unused_mut,
            unused_variables,
            unused_assignments,
            reason = "macro-generated bindings reuse the type parameter names"
        )]
        impl<F, R, E, $($P,)*> Handler<Fallible<fn($($P,)*) -> Result<R, E>>> for F
        where
            F: Fn($($P),*) -> Result<R, E> + Send + Sync + 'static,
            R: Any + Send + Sync,
            E: Into<BoxError>,
            $($P: Any + Clone + Send + Sync,)*
        {
            fn param_types() -> Vec<Option<Ty>> {
                vec![$(declared_type::<$P>()),*]
            }

            fn return_type() -> Option<Ty> {
                declared_type::<R>()
            }

            fn into_body(self, ctx: ArgContext) -> Body {
                let body = move |args: Vec<Value>| -> Result<Value, CallError> {
                    let mut args = args.into_iter();
                    let mut index = 0;
                    $(
                        let $P = ctx.extract::<$P>(index, args.next())?;
                        index += 1;
                    )*
                    (self)($($P),*)
                        .map(Value::new)
                        .map_err(|error| ctx.fail(error.into()))
                };
                Body::Sync(Arc::new(body))
            }
        }
    };
}

all_tuples!(impl_sync_handler, 0, 8, P);

// ─────────────────────────────────────────────────────────────────────────────
// Asynchronous closures
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! impl_async_handler {
    ($($P:ident),*) => {
        #[allow(
            non_snake_case,
            unused_mut,
            unused_variables,
            unused_assignments,
            reason = "macro-generated bindings reuse the type parameter names"
        )]
        impl<F, Fut, R, $($P,)*> Handler<AsyncPlain<fn($($P,)*) -> R>> for F
        where
            F: Fn($($P),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: Any + Send + Sync,
            $($P: Any + Clone + Send + Sync,)*
        {
            fn param_types() -> Vec<Option<Ty>> {
                vec![$(declared_type::<$P>()),*]
            }

            fn return_type() -> Option<Ty> {
                declared_type::<R>()
            }

            fn into_body(self, ctx: ArgContext) -> Body {
                let body = move |args: Vec<Value>| -> BoxFuture<'static, Result<Value, CallError>> {
                    let mut args = args.into_iter();
                    let mut index = 0;
                    $(
                        let $P = match ctx.extract::<$P>(index, args.next()) {
                            Ok(value) => value,
                            Err(error) => {
                                return Box::pin(async move { Err::<Value, CallError>(error) });
                            }
                        };
                        index += 1;
                    )*
                    let future = (self)($($P),*);
                    Box::pin(async move { Ok::<Value, CallError>(Value::new(future.await)) })
                };
                Body::Async(Arc::new(body))
            }
        }

        #[allow(
            non_snake_case,
            unused_mut,
            unused_variables,
            unused_assignments,
            reason = "macro-generated bindings reuse the type parameter names"
        )]
        impl<F, Fut, R, E, $($P,)*> Handler<AsyncFallible<fn($($P,)*) -> Result<R, E>>> for F
        where
            F: Fn($($P),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<R, E>> + Send + 'static,
            R: Any + Send + Sync,
            E: Into<BoxError>,
            $($P: Any + Clone + Send + Sync,)*
        {
            fn param_types() -> Vec<Option<Ty>> {
                vec![$(declared_type::<$P>()),*]
            }

            fn return_type() -> Option<Ty> {
                declared_type::<R>()
            }

            fn into_body(self, ctx: ArgContext) -> Body {
                let body = move |args: Vec<Value>| -> BoxFuture<'static, Result<Value, CallError>> {
                    let mut args = args.into_iter();
                    let mut index = 0;
                    $(
                        let $P = match ctx.extract::<$P>(index, args.next()) {
                            Ok(value) => value,
                            Err(error) => {
                                return Box::pin(async move { Err::<Value, CallError>(error) });
                            }
                        };
                        index += 1;
                    )*
                    let future = (self)($($P),*);
                    let ctx = ctx.clone();
                    Box::pin(async move {
                        future
                            .await
                            .map(Value::new)
                            .map_err(|error| ctx.fail(error.into()))
                    })
                };
                Body::Async(Arc::new(body))
            }
        }
    };
}

all_tuples!(impl_async_handler, 0, 8, P);
