//! Matching of caller supplied arguments against parameter and property
//! descriptors, falling back to autowiring and declared defaults.

use std::fmt;

use crate::arguments::{Argument, ArgumentKey, Arguments, ResolvedArguments};
use crate::error::{Error, Result};
use crate::helpers::{TypeKey, Value};
use crate::metadata::{DeclaredType, Descriptor};

/// Source of nested dependencies for the engine.
pub trait Dependencies {
    fn should_autowire(&self) -> bool;

    /// Whether `type_key` can be requested from [`Dependencies::make_dependency`].
    fn is_constructible(&self, type_key: TypeKey) -> bool;

    fn make_dependency(&mut self, type_key: TypeKey, arguments: Arguments) -> Result<Option<Value>>;
}

/// Fails unless exactly `required` arguments were supplied.
pub fn check_arity(subject: impl fmt::Display, required: usize, arguments: &Arguments) -> Result<()> {
    let supplied = arguments.len();
    if supplied != required {
        return Err(Error::InvalidArgument(format!(
            "{subject} has {required} parameters, {supplied} arguments provided"
        )));
    }
    Ok(())
}

/// Resolves every descriptor in declaration order, consuming matched entries
/// from `arguments`.
pub fn resolve_arguments<D>(
    dependencies: &mut D,
    descriptors: &[Descriptor],
    arguments: &mut Arguments,
) -> Result<ResolvedArguments>
where
    D: Dependencies + ?Sized,
{
    let mut resolved = ResolvedArguments::new();

    for descriptor in descriptors {
        let value = resolve_descriptor(dependencies, descriptor, arguments)?;
        resolved.insert(descriptor.name(), value);
    }

    Ok(resolved)
}

fn resolve_descriptor<D>(
    dependencies: &mut D,
    descriptor: &Descriptor,
    arguments: &mut Arguments,
) -> Result<Option<Value>>
where
    D: Dependencies + ?Sized,
{
    let autowire = dependencies.should_autowire();
    let declared = descriptor.declared_type();
    let mut resolved = None;

    match take_argument(descriptor, arguments) {
        Some(Argument::Bag(bag)) if autowire && names_constructible(&*dependencies, declared) => {
            resolved = resolve_typed(dependencies, declared, bag)?;
        }
        Some(Argument::Null) if descriptor.is_nullable() => return Ok(None),
        Some(Argument::Null) | None => {}
        Some(Argument::Value(value)) => return accept(descriptor, value),
        Some(Argument::Bag(bag)) => return accept(descriptor, Value::new(bag)),
    }

    if resolved.is_none() && autowire {
        resolved = resolve_typed(dependencies, declared, arguments.clone())?;
    }

    if resolved.is_none() {
        resolved = descriptor.default_value().cloned();
    }

    Ok(resolved)
}

/// Looks the descriptor up by name, then by position, and clears both keys.
fn take_argument(descriptor: &Descriptor, arguments: &mut Arguments) -> Option<Argument> {
    let by_name = arguments.remove(&ArgumentKey::from(descriptor.name()));
    let by_position = descriptor
        .position()
        .and_then(|position| arguments.remove(&ArgumentKey::Position(position)));

    match (by_name, by_position) {
        (Some(argument), _) if !argument.is_null() => Some(argument),
        (_, Some(argument)) if !argument.is_null() => Some(argument),
        (None, None) => None,
        _ => Some(Argument::Null),
    }
}

fn accept(descriptor: &Descriptor, value: Value) -> Result<Option<Value>> {
    match descriptor.declared_type() {
        Some(declared) if !declared.accepts(value.type_key()) => Err(Error::InvalidArgument(format!(
            "invalid type provided for {}: expected {declared}, got {}",
            descriptor.name(),
            value.type_key()
        ))),
        _ => Ok(Some(value)),
    }
}

fn names_constructible<D>(dependencies: &D, declared: Option<&DeclaredType>) -> bool
where
    D: Dependencies + ?Sized,
{
    declared.map_or(false, |declared| {
        declared
            .members()
            .iter()
            .any(|member| dependencies.is_constructible(*member))
    })
}

/// Asks for each constructible member type in turn; the first non-null result wins.
fn resolve_typed<D>(
    dependencies: &mut D,
    declared: Option<&DeclaredType>,
    arguments: Arguments,
) -> Result<Option<Value>>
where
    D: Dependencies + ?Sized,
{
    let Some(declared) = declared else {
        return Ok(None);
    };

    for member in declared.members() {
        if !dependencies.is_constructible(*member) {
            continue;
        }
        if let Some(value) = dependencies.make_dependency(*member, arguments.clone())? {
            return Ok(Some(value));
        }
    }

    Ok(None)
}
