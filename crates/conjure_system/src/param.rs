//! Parameters, signatures and argument binding.
//!
//! A [`Signature`] is the ordered list of [`Parameter`]s a callable accepts.
//! Hooks inspect parameters to decide how to supply them, and
//! [`Signature::bind`] turns call-site [`Args`] into the positional vector a
//! callable body receives.

use core::fmt;
use std::sync::Arc;

use crate::error::CallError;
use crate::value::{Args, Ty, Value};

/// How a parameter may be supplied at a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParamKind {
    /// Only by position.
    PositionalOnly,
    /// By position or by keyword.
    #[default]
    PositionalOrKeyword,
    /// Only by keyword.
    KeywordOnly,
}

/// A per-parameter override of the name and/or declared type seen by hooks.
///
/// The callable is still invoked with its own parameter positions; only hook
/// matching and outer-parameter naming see the overridden view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Override {
    name: Option<String>,
    ty: Option<Ty>,
}

impl Override {
    /// Overrides the parameter name.
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ty: None,
        }
    }

    /// Overrides the declared type.
    #[must_use]
    pub fn ty(ty: Ty) -> Self {
        Self {
            name: None,
            ty: Some(ty),
        }
    }

    /// Also overrides the declared type.
    #[must_use]
    pub fn with_ty(mut self, ty: Ty) -> Self {
        self.ty = Some(ty);
        self
    }

    /// Also overrides the parameter name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A single parameter of a callable.
#[derive(Clone)]
pub struct Parameter {
    name: Arc<str>,
    ty: Option<Ty>,
    default: Option<Value>,
    kind: ParamKind,
    override_with: Option<Override>,
}

impl Parameter {
    /// Creates a required positional-or-keyword parameter.
    #[must_use]
    pub fn new(name: impl AsRef<str>, ty: Option<Ty>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            ty,
            default: None,
            kind: ParamKind::PositionalOrKeyword,
            override_with: None,
        }
    }

    /// Creates an untyped parameter.
    #[must_use]
    pub fn untyped(name: impl AsRef<str>) -> Self {
        Self::new(name, None)
    }

    /// Creates a parameter declared as `T`.
    #[must_use]
    pub fn typed<T: ?Sized + 'static>(name: impl AsRef<str>) -> Self {
        Self::new(name, Some(Ty::of::<T>()))
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Sets the parameter kind.
    #[must_use]
    pub fn with_kind(mut self, kind: ParamKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the declared type.
    #[must_use]
    pub fn with_ty(mut self, ty: Option<Ty>) -> Self {
        self.ty = ty;
        self
    }

    /// Attaches an override applied before hooks see this parameter.
    #[must_use]
    pub fn with_override(mut self, override_with: Override) -> Self {
        self.override_with = Some(override_with);
        self
    }

    /// Returns the parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared type, `None` if untyped.
    #[must_use]
    pub fn ty(&self) -> Option<&Ty> {
        self.ty.as_ref()
    }

    /// Returns the default value.
    #[must_use]
    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Returns `true` if the parameter has a default value.
    #[must_use]
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Returns the parameter kind.
    #[must_use]
    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    /// Returns the attached override.
    #[must_use]
    pub fn override_with(&self) -> Option<&Override> {
        self.override_with.as_ref()
    }

    /// Returns `true` for keyword-only parameters with a default.
    #[must_use]
    pub fn is_optional_keyword_only(&self) -> bool {
        self.kind == ParamKind::KeywordOnly && self.has_default()
    }

    /// Returns the parameter as hooks see it: override applied and removed.
    #[must_use]
    pub fn effective(&self) -> Parameter {
        let mut effective = self.clone();
        if let Some(override_with) = effective.override_with.take() {
            if let Some(name) = override_with.name {
                effective.name = Arc::from(name);
            }
            if let Some(ty) = override_with.ty {
                effective.ty = Some(ty);
            }
        }
        effective
    }

    /// Returns `true` if `value` may be bound to this parameter.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        self.ty
            .as_ref()
            .is_none_or(|ty| value.ty().is_assignable_to(ty))
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Parameter");
        s.field("name", &self.name)
            .field("ty", &self.ty.as_ref().map(Ty::name))
            .field("kind", &self.kind)
            .field("has_default", &self.has_default());
        if let Some(override_with) = &self.override_with {
            s.field("override", override_with);
        }
        s.finish()
    }
}

/// A predicate over parameters, used by hooks and `adapt`.
pub type ParamPredicate = Arc<dyn Fn(&Parameter) -> bool + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Signature
// ─────────────────────────────────────────────────────────────────────────────

/// The ordered parameters and return type of a callable.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    params: Vec<Parameter>,
    returns: Option<Ty>,
}

impl Signature {
    /// Creates a signature from parameters and a return type.
    #[must_use]
    pub fn new(params: Vec<Parameter>, returns: Option<Ty>) -> Self {
        Self { params, returns }
    }

    /// Returns the parameters in declaration order.
    #[must_use]
    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    /// Returns a mutable parameter by name.
    pub fn param_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.params.iter_mut().find(|param| param.name() == name)
    }

    /// Returns a parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|param| param.name() == name)
    }

    /// Returns the declared return type, `None` if unannotated.
    #[must_use]
    pub fn returns(&self) -> Option<&Ty> {
        self.returns.as_ref()
    }

    /// Sets the declared return type.
    pub fn set_returns(&mut self, returns: Option<Ty>) {
        self.returns = returns;
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns `true` if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Binds call-site arguments to parameters.
    ///
    /// Positional arguments fill non-keyword-only parameters in order, then
    /// keywords fill parameters by name, then defaults fill the rest. Every
    /// bound value is checked against the declared type.
    ///
    /// # Errors
    ///
    /// Returns a [`CallError`] naming `callable` when arguments are missing,
    /// surplus, duplicated, or of the wrong type.
    pub fn bind(&self, callable: &str, args: Args) -> Result<Vec<Value>, CallError> {
        let (positional, mut keyword) = args.into_parts();

        let positional_capacity = self
            .params
            .iter()
            .take_while(|param| param.kind() != ParamKind::KeywordOnly)
            .count();
        if positional.len() > positional_capacity {
            return Err(CallError::TooManyArguments {
                callable: callable.to_owned(),
                expected: positional_capacity,
                given: positional.len(),
            });
        }

        let mut slots: Vec<Option<Value>> = positional.into_iter().map(Some).collect();
        slots.resize(self.params.len(), None);

        for (param, slot) in self.params.iter().zip(slots.iter_mut()) {
            let Some(value) = keyword.shift_remove(param.name()) else {
                continue;
            };
            if slot.is_some() || param.kind() == ParamKind::PositionalOnly {
                if slot.is_some() {
                    return Err(CallError::DuplicateArgument {
                        callable: callable.to_owned(),
                        name: param.name().to_owned(),
                    });
                }
                return Err(CallError::UnexpectedKeyword {
                    callable: callable.to_owned(),
                    name: param.name().to_owned(),
                });
            }
            *slot = Some(value);
        }

        if let Some(name) = keyword.keys().next() {
            return Err(CallError::UnexpectedKeyword {
                callable: callable.to_owned(),
                name: name.clone(),
            });
        }

        self.params
            .iter()
            .zip(slots)
            .map(|(param, slot)| {
                let value = match slot {
                    Some(value) => value,
                    None => param
                        .default()
                        .cloned()
                        .ok_or_else(|| CallError::UnresolvedArgument {
                            callable: callable.to_owned(),
                            param: param.name().to_owned(),
                        })?,
                };
                if !param.accepts(&value) {
                    return Err(CallError::ArgumentType {
                        callable: callable.to_owned(),
                        param: param.name().to_owned(),
                        expected: param.ty().map_or("", Ty::name),
                        found: value.ty().name(),
                    });
                }
                Ok(value)
            })
            .collect()
    }
}
