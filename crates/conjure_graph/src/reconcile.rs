//! Outer parameter reconciliation.
//!
//! Several nodes may surface a parameter with the same name. Those
//! occurrences collapse into one outer parameter: an untyped occurrence yields
//! to a typed one, two different types conflict, and the last declared
//! default wins. Parameters without defaults come first.

use conjure_system::param::Parameter;
use conjure_system::value::{Ty, Value};
use hashbrown::HashMap;

use crate::error::ComposeError;
use crate::graph::DependencyGraph;
use crate::node::Dependency;

/// Collapses the outer dependencies of `graph` into the composed callable's
/// parameter list.
///
/// # Errors
///
/// [`ComposeError::TypeConflict`] if two occurrences of a name declare
/// different types.
pub fn reconcile(graph: &DependencyGraph) -> Result<Vec<Parameter>, ComposeError> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, Option<Ty>, Option<Value>)> = Vec::new();

    let outer = graph
        .nodes()
        .iter()
        .flat_map(|node| node.dependencies.iter())
        .filter_map(|dep| match dep {
            Dependency::Outer {
                arg_name,
                ty,
                default,
            } => Some((arg_name.as_str(), ty, default)),
            Dependency::Factory { .. } => None,
        });

    for (name, ty, default) in outer {
        let Some(&slot) = index.get(name) else {
            index.insert(name, groups.len());
            groups.push((name, ty.clone(), default.clone()));
            continue;
        };
        let group = &mut groups[slot];
        group.1 = reconcile_types(name, group.1.take(), ty.clone())?;
        if default.is_some() {
            group.2 = default.clone();
        }
    }

    let mut params: Vec<Parameter> = groups
        .into_iter()
        .map(|(name, ty, default)| {
            let param = Parameter::new(name, ty);
            match default {
                Some(default) => param.with_default(default),
                None => param,
            }
        })
        .collect();
    params.sort_by_key(Parameter::has_default);
    Ok(params)
}

fn reconcile_types(
    argument: &str,
    first: Option<Ty>,
    second: Option<Ty>,
) -> Result<Option<Ty>, ComposeError> {
    match (first, second) {
        (None, ty) | (ty, None) => Ok(ty),
        (Some(first), Some(second)) if first == second => Ok(Some(first)),
        (Some(first), Some(second)) => Err(ComposeError::TypeConflict {
            argument: argument.to_owned(),
            first: first.name(),
            second: second.name(),
        }),
    }
}
