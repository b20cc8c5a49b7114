//! Direct calls: routing call-site arguments onto a callable's own
//! parameters, without composing dependencies.
//!
//! For each parameter of the callable, in order:
//!
//! 1. a keyword argument with the same name whose type fits;
//! 2. for typed parameters, the first unused positional argument whose type
//!    fits;
//! 3. a keyword argument with the same name, whatever its type;
//! 4. nothing, if the parameter has a default;
//! 5. otherwise [`CallError::UnresolvedArgument`].
//!
//! Arguments that no parameter claims are ignored.
//!
//! A [`Routing`] depends only on the *shape* of the call site (runtime types
//! for [`Engine::invoke_direct`](crate::engine::Engine::invoke_direct),
//! predicates for [`Engine::adapt`](crate::engine::Engine::adapt)), so the
//! engine caches it per shape.

use core::hash::{Hash, Hasher};
use std::sync::Arc;

use conjure_system::callable::{BoxFuture, Callable};
use conjure_system::error::CallError;
use conjure_system::param::{ParamKind, ParamPredicate, Parameter, Signature};
use conjure_system::value::{Args, Ty, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Probes
// ─────────────────────────────────────────────────────────────────────────────

/// Something standing in for a call-site argument while routing.
pub trait Probe {
    /// Returns `true` if the argument may be bound to `param`.
    fn admits(&self, param: &Parameter) -> bool;
}

impl Probe for Ty {
    fn admits(&self, param: &Parameter) -> bool {
        param.ty().is_none_or(|declared| self.is_assignable_to(declared))
    }
}

impl Probe for ParamPredicate {
    fn admits(&self, param: &Parameter) -> bool {
        self(param)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Routing
// ─────────────────────────────────────────────────────────────────────────────

/// Where one parameter's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// The positional argument at this index.
    Positional(usize),
    /// The keyword argument with this name.
    Keyword(String),
    /// The parameter's default.
    Default,
}

/// Per-parameter routes for one callable and one call-site shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routing {
    routes: Vec<Route>,
}

impl Routing {
    /// Computes the routes for `callable` given positional and keyword
    /// probes.
    ///
    /// # Errors
    ///
    /// [`CallError::UnresolvedArgument`] for a required parameter nothing
    /// can fill.
    pub fn plan<P: Probe>(
        callable: &Callable,
        positional: &[P],
        keyword: &[(String, P)],
    ) -> Result<Self, CallError> {
        let mut used = vec![false; positional.len()];
        let mut routes = Vec::with_capacity(callable.params().len());

        for param in callable.params() {
            let by_name = keyword.iter().find(|(name, _)| name == param.name());

            if let Some((name, probe)) = by_name
                && probe.admits(param)
            {
                routes.push(Route::Keyword(name.clone()));
                continue;
            }

            if param.ty().is_some()
                && let Some(index) = (0..positional.len())
                    .find(|&index| !used[index] && positional[index].admits(param))
            {
                used[index] = true;
                routes.push(Route::Positional(index));
                continue;
            }

            if let Some((name, _)) = by_name {
                routes.push(Route::Keyword(name.clone()));
            } else if param.has_default() {
                routes.push(Route::Default);
            } else {
                return Err(CallError::UnresolvedArgument {
                    callable: callable.name().to_owned(),
                    param: param.name().to_owned(),
                });
            }
        }

        Ok(Self { routes })
    }

    /// Returns the route of each parameter, in signature order.
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Returns the keywords the routing reads, in parameter order.
    pub fn keywords(&self) -> impl Iterator<Item = &str> + '_ {
        self.routes.iter().filter_map(|route| match route {
            Route::Keyword(name) => Some(name.as_str()),
            Route::Positional(_) | Route::Default => None,
        })
    }

    /// Arranges call-site arguments into `callable`'s parameter order.
    ///
    /// # Errors
    ///
    /// [`CallError::UnresolvedArgument`] if a routed argument is missing from
    /// `args`, which happens only when the routing was planned for a
    /// different call-site shape.
    pub fn apply(&self, callable: &Callable, args: Args) -> Result<Vec<Value>, CallError> {
        let (positional, mut keyword) = args.into_parts();
        self.routes
            .iter()
            .zip(callable.params())
            .map(|(route, param)| {
                let value = match route {
                    Route::Positional(index) => positional.get(*index).cloned(),
                    Route::Keyword(name) => keyword.swap_remove(name),
                    Route::Default => param.default().cloned(),
                };
                value.ok_or_else(|| CallError::UnresolvedArgument {
                    callable: callable.name().to_owned(),
                    param: param.name().to_owned(),
                })
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cache keys
// ─────────────────────────────────────────────────────────────────────────────

/// A runtime type compared together with its declared supertypes.
#[derive(Clone)]
pub(crate) struct Shape(Ty);

impl PartialEq for Shape {
    fn eq(&self, other: &Self) -> bool {
        fn same(a: &Ty, b: &Ty) -> bool {
            a == b
                && a.supertypes().len() == b.supertypes().len()
                && a.supertypes()
                    .iter()
                    .zip(b.supertypes())
                    .all(|(a, b)| same(a, b))
        }
        same(&self.0, &other.0)
    }
}

impl Eq for Shape {}

impl Hash for Shape {
    fn hash<H: Hasher>(&self, state: &mut H) {
        fn walk<H: Hasher>(ty: &Ty, state: &mut H) {
            ty.hash(state);
            ty.supertypes().len().hash(state);
            for supertype in ty.supertypes() {
                walk(supertype, state);
            }
        }
        walk(&self.0, state);
    }
}

impl Probe for Shape {
    fn admits(&self, param: &Parameter) -> bool {
        self.0.admits(param)
    }
}

/// Cache key of a direct call: the callable plus runtime argument shapes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) struct DirectKey {
    callable: Callable,
    positional: Vec<Shape>,
    keyword: Vec<(String, Shape)>,
}

impl DirectKey {
    pub(crate) fn new(callable: &Callable, args: &Args) -> Self {
        let mut keyword: Vec<(String, Shape)> = args
            .keyword()
            .iter()
            .map(|(name, value)| (name.clone(), Shape(value.ty().clone())))
            .collect();
        keyword.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            callable: callable.clone(),
            positional: args
                .positional()
                .iter()
                .map(|value| Shape(value.ty().clone()))
                .collect(),
            keyword,
        }
    }

    pub(crate) fn positional(&self) -> &[Shape] {
        &self.positional
    }

    pub(crate) fn keyword(&self) -> &[(String, Shape)] {
        &self.keyword
    }
}

/// A predicate compared by identity.
#[derive(Clone)]
pub(crate) struct PredicateKey(pub(crate) ParamPredicate);

impl PartialEq for PredicateKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for PredicateKey {}

impl Hash for PredicateKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).cast::<()>().hash(state);
    }
}

/// Cache key of an adapted callable.
#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) struct AdaptKey {
    callable: Callable,
    positional: Vec<PredicateKey>,
    keyword: Vec<(String, PredicateKey)>,
}

impl AdaptKey {
    pub(crate) fn new(
        callable: &Callable,
        positional: &[ParamPredicate],
        keyword: &[(String, ParamPredicate)],
    ) -> Self {
        let mut keyword: Vec<(String, PredicateKey)> = keyword
            .iter()
            .map(|(name, predicate)| (name.clone(), PredicateKey(Arc::clone(predicate))))
            .collect();
        keyword.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            callable: callable.clone(),
            positional: positional.iter().cloned().map(PredicateKey).collect(),
            keyword,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Adapted callables
// ─────────────────────────────────────────────────────────────────────────────

/// Builds the callable produced by `adapt`.
///
/// It takes one untyped positional-only parameter per positional predicate
/// (`arg0`, `arg1`, ...) followed by one keyword-only parameter per routed
/// keyword, and forwards to `target`.
pub(crate) fn adapted(target: &Callable, positional: usize, routing: Routing) -> Callable {
    let keywords: Vec<String> = routing.keywords().map(str::to_owned).collect();
    let mut params: Vec<Parameter> = (0..positional)
        .map(|index| Parameter::untyped(format!("arg{index}")).with_kind(ParamKind::PositionalOnly))
        .collect();
    params.extend(
        keywords
            .iter()
            .map(|name| Parameter::untyped(name).with_kind(ParamKind::KeywordOnly)),
    );
    let signature = Signature::new(params, target.return_type().cloned());
    let name = format!("adapt({})", target.name());

    let callee = target.clone();
    let forward = move |values: Vec<Value>| -> Result<Vec<Value>, CallError> {
        let (by_position, by_keyword) = values.split_at(positional);
        routing
            .routes()
            .iter()
            .zip(callee.params())
            .map(|(route, param)| {
                let value = match route {
                    Route::Positional(index) => by_position.get(*index).cloned(),
                    Route::Keyword(name) => keywords
                        .iter()
                        .position(|keyword| keyword == name)
                        .and_then(|slot| by_keyword.get(slot).cloned()),
                    Route::Default => param.default().cloned(),
                };
                value.ok_or_else(|| CallError::UnresolvedArgument {
                    callable: callee.name().to_owned(),
                    param: param.name().to_owned(),
                })
            })
            .collect()
    };

    let target = target.clone();
    if target.is_async() {
        Callable::asynchronous(
            name,
            signature,
            move |values| -> BoxFuture<'static, Result<Value, CallError>> {
                match forward(values) {
                    Ok(values) => target.call_bound_async(values),
                    Err(err) => Box::pin(async move { Err(err) }),
                }
            },
        )
    } else {
        Callable::sync(name, signature, move |values| target.call_bound(forward(values)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Callable {
        Callable::from_fn(
            "target",
            &["count", "label", "scale"],
            |count: i64, label: String, scale: f64| format!("{label}:{}", count as f64 * scale),
        )
        .with_default("scale", 1.0_f64)
    }

    #[test]
    fn positional_arguments_fill_typed_parameters_by_type() {
        let routing = Routing::plan(
            &target(),
            &[Ty::of::<String>(), Ty::of::<i64>()],
            &[],
        )
        .unwrap();
        assert_eq!(
            routing.routes(),
            [Route::Positional(1), Route::Positional(0), Route::Default]
        );
    }

    #[test]
    fn keyword_by_name_wins_over_positional() {
        let routing = Routing::plan(
            &target(),
            &[Ty::of::<i64>(), Ty::of::<String>()],
            &[("count".to_owned(), Ty::of::<i64>())],
        )
        .unwrap();
        assert_eq!(
            routing.routes(),
            [
                Route::Keyword("count".into()),
                Route::Positional(1),
                Route::Default
            ]
        );
    }

    #[test]
    fn positional_arguments_are_consumed_once() {
        let pair = Callable::from_fn("pair", &["a", "b"], |a: i64, b: i64| a - b);
        let routing = Routing::plan(&pair, &[Ty::of::<i64>(), Ty::of::<i64>()], &[]).unwrap();
        assert_eq!(routing.routes(), [Route::Positional(0), Route::Positional(1)]);
    }

    #[test]
    fn untyped_parameters_need_a_keyword() {
        let untyped = Callable::from_fn("untyped", &["x"], |x: Value| x);
        let err = Routing::plan(&untyped, &[Ty::of::<i64>()], &[]).unwrap_err();
        assert!(matches!(
            err,
            CallError::UnresolvedArgument { ref param, .. } if param == "x"
        ));
    }

    #[test]
    fn mistyped_keyword_falls_back_to_name() {
        let routing = Routing::plan(
            &target(),
            &[Ty::of::<String>()],
            &[("count".to_owned(), Ty::of::<f64>())],
        )
        .unwrap();
        assert_eq!(routing.routes()[0], Route::Keyword("count".into()));
    }

    #[test]
    fn apply_arranges_values() {
        let callable = target();
        let args = Args::new()
            .arg(String::from("total"))
            .arg(3_i64)
            .kwarg("unused", true);
        let key = DirectKey::new(&callable, &args);
        let routing = Routing::plan(&callable, key.positional(), key.keyword()).unwrap();
        let values = routing.apply(&callable, args).unwrap();

        let result = callable.call_bound(values).unwrap();
        assert_eq!(result.extract::<String>().as_deref(), Some("total:3"));
    }

    #[test]
    fn direct_keys_ignore_keyword_order() {
        let callable = target();
        let a = DirectKey::new(&callable, &Args::new().kwarg("x", 1_i64).kwarg("y", 2.0_f64));
        let b = DirectKey::new(&callable, &Args::new().kwarg("y", 3.0_f64).kwarg("x", 4_i64));
        assert!(a == b);
    }

    #[test]
    fn direct_keys_distinguish_declared_supertypes() {
        let callable = target();
        let plain = DirectKey::new(&callable, &Args::new().arg(1_u8));
        let widened = Ty::of::<u8>().with_supertype(Ty::of::<i64>());
        let typed = DirectKey::new(
            &callable,
            &Args::from_values(vec![Value::with_type(1_u8, widened.clone())]),
        );
        let again = DirectKey::new(
            &callable,
            &Args::from_values(vec![Value::with_type(2_u8, widened)]),
        );
        assert!(plain != typed);
        assert!(typed == again);
    }

    #[test]
    fn adapted_callable_reorders_arguments() {
        let callable = target();
        let is_i64: ParamPredicate =
            Arc::new(|param: &Parameter| param.ty() == Some(&Ty::of::<i64>()));
        let is_string: ParamPredicate =
            Arc::new(|param: &Parameter| param.ty() == Some(&Ty::of::<String>()));
        let routing = Routing::plan(&callable, &[is_string, is_i64], &[]).unwrap();

        let adapted = adapted(&callable, 2, routing);
        let names: Vec<&str> = adapted.params().iter().map(Parameter::name).collect();
        assert_eq!(names, ["arg0", "arg1"]);

        let result = adapted
            .call(Args::new().arg(String::from("n")).arg(2_i64))
            .unwrap();
        assert_eq!(result.extract::<String>().as_deref(), Some("n:2"));
    }
}
