use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::helpers::Value;

/// Key of a caller supplied argument: a parameter/property name, or the
/// zero-based position of a parameter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArgumentKey {
    Position(usize),
    Name(String),
}

impl From<usize> for ArgumentKey {
    fn from(position: usize) -> Self {
        ArgumentKey::Position(position)
    }
}

impl From<&str> for ArgumentKey {
    fn from(name: &str) -> Self {
        ArgumentKey::Name(name.to_owned())
    }
}

impl From<String> for ArgumentKey {
    fn from(name: String) -> Self {
        ArgumentKey::Name(name)
    }
}

impl fmt::Display for ArgumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentKey::Position(position) => write!(f, "#{position}"),
            ArgumentKey::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Argument {
    Null,
    Value(Value),
    /// Arguments for constructing the parameter's type rather than the value itself.
    Bag(Arguments),
}

impl Argument {
    pub fn is_null(&self) -> bool {
        matches!(self, Argument::Null)
    }
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        Argument::Value(value)
    }
}

impl From<Arguments> for Argument {
    fn from(bag: Arguments) -> Self {
        Argument::Bag(bag)
    }
}

impl From<Option<Value>> for Argument {
    fn from(value: Option<Value>) -> Self {
        value.map(Argument::Value).unwrap_or(Argument::Null)
    }
}

/// Caller supplied argument bag, consumed as descriptors are matched.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    entries: BTreeMap<ArgumentKey, Argument>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plain value.
    pub fn with<K, T>(self, key: K, value: T) -> Self
    where
        K: Into<ArgumentKey>,
        T: Send + Sync + 'static,
    {
        self.with_argument(key, Argument::Value(Value::new(value)))
    }

    pub fn with_value<K: Into<ArgumentKey>>(self, key: K, value: Value) -> Self {
        self.with_argument(key, Argument::Value(value))
    }

    pub fn with_bag<K: Into<ArgumentKey>>(self, key: K, bag: Arguments) -> Self {
        self.with_argument(key, Argument::Bag(bag))
    }

    pub fn with_null<K: Into<ArgumentKey>>(self, key: K) -> Self {
        self.with_argument(key, Argument::Null)
    }

    pub fn with_argument<K: Into<ArgumentKey>>(mut self, key: K, argument: Argument) -> Self {
        self.insert(key, argument);
        self
    }

    pub fn insert<K: Into<ArgumentKey>>(&mut self, key: K, argument: Argument) -> Option<Argument> {
        self.entries.insert(key.into(), argument)
    }

    pub fn get(&self, key: &ArgumentKey) -> Option<&Argument> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &ArgumentKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &ArgumentKey) -> Option<Argument> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Positional entries first in ascending order, then named entries.
    pub fn iter(&self) -> impl Iterator<Item = (&ArgumentKey, &Argument)> {
        self.entries.iter()
    }

    pub fn value<T>(&self, key: impl Into<ArgumentKey>) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        match self.entries.get(&key.into()) {
            Some(Argument::Value(value)) => value.downcast::<T>(),
            _ => None,
        }
    }
}

/// Effective values chosen for a list of descriptors, keyed by descriptor name.
///
/// A `None` entry is a descriptor that resolved to null.
#[derive(Debug, Clone, Default)]
pub struct ResolvedArguments {
    entries: Vec<(String, Option<Value>)>,
}

impl ResolvedArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Option<Value>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn extend(&mut self, other: ResolvedArguments) {
        for (name, value) in other.entries {
            self.insert(name, value);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, value)| value.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shared handle to a non-null entry.
    pub fn instance<T>(&self, name: &str) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.optional(name)?.ok_or_else(|| {
            Error::InvalidArgument(format!("no value resolved for {name}"))
        })
    }

    /// Owned copy of a non-null entry.
    pub fn value<T>(&self, name: &str) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.instance::<T>(name).map(|value| T::clone(&value))
    }

    pub fn optional<T>(&self, name: &str) -> Result<Option<Arc<T>>>
    where
        T: Send + Sync + 'static,
    {
        match self.get(name) {
            None => Ok(None),
            Some(value) => value.downcast::<T>().map(Some).ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "{name} resolved to {}, not {}",
                    value.type_key(),
                    std::any::type_name::<T>()
                ))
            }),
        }
    }
}
