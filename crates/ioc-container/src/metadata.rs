//! Statically registered type metadata.
//!
//! A [`MetadataReader`] answers the questions the container would otherwise
//! need runtime reflection for: which types exist, how to build them, which
//! members want injection and which methods act as factories.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::arguments::ResolvedArguments;
use crate::error::{Error, Result};
use crate::helpers::{TypeKey, Value};
use crate::provider::ProvideResult;

/// Declared type of a parameter, property or method return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredType {
    Named(TypeKey),
    Union(Vec<TypeKey>),
}

impl DeclaredType {
    pub fn of<T: ?Sized + 'static>() -> Self {
        DeclaredType::Named(TypeKey::of::<T>())
    }

    pub fn union<I>(members: I) -> Self
    where
        I: IntoIterator<Item = TypeKey>,
    {
        DeclaredType::Union(members.into_iter().collect())
    }

    /// Named types in declaration order.
    pub fn members(&self) -> &[TypeKey] {
        match self {
            DeclaredType::Named(key) => std::slice::from_ref(key),
            DeclaredType::Union(keys) => keys,
        }
    }

    pub fn accepts(&self, key: TypeKey) -> bool {
        self.members().contains(&key)
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.members().iter().map(TypeKey::name).collect();
        f.write_str(&names.join("|"))
    }
}

/// Structural facts about a constructor/method parameter or an injectable property.
#[derive(Debug, Clone)]
pub struct Descriptor {
    name: String,
    declared: Option<DeclaredType>,
    position: Option<usize>,
    default: Option<Option<Value>>,
    nullable: bool,
}

impl Descriptor {
    /// Parameter of type `T`. The position is assigned when the parameter is
    /// attached to a constructor or method.
    pub fn parameter<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::typed(name, DeclaredType::of::<T>())
    }

    pub fn property<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::typed(name, DeclaredType::of::<T>())
    }

    pub fn typed(name: impl Into<String>, declared: DeclaredType) -> Self {
        Descriptor {
            name: name.into(),
            declared: Some(declared),
            position: None,
            default: None,
            nullable: false,
        }
    }

    /// Accepts any supplied value and is never autowired.
    pub fn untyped(name: impl Into<String>) -> Self {
        Descriptor {
            name: name.into(),
            declared: None,
            position: None,
            default: None,
            nullable: true,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default<T>(self, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.with_default_value(Value::new(value))
    }

    pub fn with_default_value(mut self, value: Value) -> Self {
        self.default = Some(Some(value));
        self
    }

    /// `= null`, which also makes the descriptor nullable.
    pub fn with_null_default(mut self) -> Self {
        self.default = Some(None);
        self.nullable = true;
        self
    }

    pub(crate) fn at(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_type(&self) -> Option<&DeclaredType> {
        self.declared.as_ref()
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref().and_then(Option::as_ref)
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

fn positioned<I>(parameters: I) -> Vec<Descriptor>
where
    I: IntoIterator<Item = Descriptor>,
{
    parameters
        .into_iter()
        .enumerate()
        .map(|(position, parameter)| parameter.at(position))
        .collect()
}

pub type Factory = Rc<dyn Fn(&ResolvedArguments) -> ProvideResult<Value>>;
pub type Invoker = Rc<dyn Fn(Option<&Value>, &ResolvedArguments) -> ProvideResult<Option<Value>>>;
/// Converts an instance of a class into one of the abstract types it implements.
pub type Upcast = Rc<dyn Fn(&Value) -> Option<Value>>;

/// Marks a method as a factory. An empty list means the provided types are
/// inferred from the declared return type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolves {
    pub provides: Vec<TypeKey>,
}

#[derive(Clone)]
pub struct MethodDefinition {
    name: String,
    parameters: Vec<Descriptor>,
    is_static: bool,
    is_public: bool,
    returns: Option<DeclaredType>,
    resolves: Option<Resolves>,
    shared: bool,
    invoker: Invoker,
}

impl MethodDefinition {
    /// Method taking no receiver.
    pub fn associated<R, F>(name: impl Into<String>, f: F) -> Self
    where
        R: Send + Sync + 'static,
        F: Fn(&ResolvedArguments) -> ProvideResult<R> + 'static,
    {
        let invoker: Invoker = Rc::new(move |_: Option<&Value>, arguments: &ResolvedArguments| {
            f(arguments).map(|r| Some(Value::new(r)))
        });
        Self::raw(name, true, invoker).returns(DeclaredType::of::<R>())
    }

    /// Method invoked on an instance of `P` obtained from the container.
    pub fn instance<P, R, F>(name: impl Into<String>, f: F) -> Self
    where
        P: Send + Sync + 'static,
        R: Send + Sync + 'static,
        F: Fn(&P, &ResolvedArguments) -> ProvideResult<R> + 'static,
    {
        let invoker: Invoker = Rc::new(
            move |receiver: Option<&Value>, arguments: &ResolvedArguments| -> ProvideResult<Option<Value>> {
                let receiver = receiver.ok_or_else(|| {
                    Error::InvalidResolver(format!("{} requires an instance", std::any::type_name::<P>()))
                })?;
                let this = receiver.downcast_ref::<P>().ok_or_else(|| Error::TypeMismatch {
                    expected: std::any::type_name::<P>(),
                    found: receiver.type_key().name(),
                })?;
                f(this, arguments).map(|r| Some(Value::new(r)))
            },
        );
        Self::raw(name, false, invoker).returns(DeclaredType::of::<R>())
    }

    /// Method without a declared return type.
    pub fn raw(name: impl Into<String>, is_static: bool, invoker: Invoker) -> Self {
        MethodDefinition {
            name: name.into(),
            parameters: Vec::new(),
            is_static,
            is_public: true,
            returns: None,
            resolves: None,
            shared: false,
            invoker,
        }
    }

    pub fn parameters<I>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = Descriptor>,
    {
        self.parameters = positioned(parameters);
        self
    }

    pub fn returns(mut self, returns: DeclaredType) -> Self {
        self.returns = Some(returns);
        self
    }

    pub fn resolves<I>(mut self, provides: I) -> Self
    where
        I: IntoIterator<Item = TypeKey>,
    {
        self.resolves = Some(Resolves {
            provides: provides.into_iter().collect(),
        });
        self
    }

    pub fn resolves_inferred(self) -> Self {
        self.resolves(std::iter::empty())
    }

    pub fn shared(mut self) -> Self {
        self.shared = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.is_public = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_descriptors(&self) -> &[Descriptor] {
        &self.parameters
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn is_public(&self) -> bool {
        self.is_public
    }

    pub fn return_type(&self) -> Option<&DeclaredType> {
        self.returns.as_ref()
    }

    pub fn resolves_marker(&self) -> Option<&Resolves> {
        self.resolves.as_ref()
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn invoke(&self, receiver: Option<&Value>, arguments: &ResolvedArguments) -> Result<Option<Value>> {
        (self.invoker)(receiver, arguments).map_err(Error::from_provide)
    }
}

impl fmt::Debug for MethodDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDefinition")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("is_static", &self.is_static)
            .field("is_public", &self.is_public)
            .field("returns", &self.returns)
            .field("resolves", &self.resolves)
            .field("shared", &self.shared)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
struct Constructor {
    parameters: Vec<Descriptor>,
    inject: bool,
}

/// Everything the container knows about one concrete type.
///
/// Injected properties are handed to the factory together with the
/// constructor parameters, properties first.
#[derive(Clone)]
pub struct ClassDefinition {
    type_key: TypeKey,
    provided_by: Option<TypeKey>,
    constructor: Option<Constructor>,
    properties: Vec<Descriptor>,
    methods: Vec<MethodDefinition>,
    upcasts: Vec<(TypeKey, Upcast)>,
    factory: Factory,
}

impl ClassDefinition {
    pub fn new<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolvedArguments) -> ProvideResult<T> + 'static,
    {
        Self::with_factory(
            TypeKey::of::<T>(),
            Rc::new(move |arguments: &ResolvedArguments| factory(arguments).map(Value::new)),
        )
    }

    pub fn with_factory(type_key: TypeKey, factory: Factory) -> Self {
        ClassDefinition {
            type_key,
            provided_by: None,
            constructor: None,
            properties: Vec::new(),
            methods: Vec::new(),
            upcasts: Vec::new(),
            factory,
        }
    }

    /// Declares a constructor taking `parameters`.
    pub fn constructor<I>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = Descriptor>,
    {
        let inject = self.constructor.as_ref().map_or(false, |c| c.inject);
        self.constructor = Some(Constructor {
            parameters: positioned(parameters),
            inject,
        });
        self
    }

    pub fn inject_constructor(mut self) -> Self {
        self.constructor.get_or_insert_with(Constructor::default).inject = true;
        self
    }

    pub fn inject(mut self, property: Descriptor) -> Self {
        let mut property = property;
        property.position = None;
        self.properties.push(property);
        self
    }

    pub fn provided_by<P: ?Sized + 'static>(self) -> Self {
        self.provided_by_key(TypeKey::of::<P>())
    }

    pub fn provided_by_key(mut self, provider: TypeKey) -> Self {
        self.provided_by = Some(provider);
        self
    }

    pub fn method(mut self, method: MethodDefinition) -> Self {
        self.methods.retain(|m| m.name != method.name);
        self.methods.push(method);
        self
    }

    /// Lets instances be bound under the abstract type `A`, typically a
    /// trait object handle:
    ///
    /// ```
    /// # use ioc_container::ClassDefinition;
    /// # use std::sync::Arc;
    /// trait Clock: Send + Sync {}
    /// struct SystemClock;
    /// impl Clock for SystemClock {}
    ///
    /// ClassDefinition::new(|_| Ok(SystemClock))
    ///     .implements(|clock: Arc<SystemClock>| clock as Arc<dyn Clock>);
    /// ```
    pub fn implements<T, A, F>(mut self, convert: F) -> Self
    where
        T: Send + Sync + 'static,
        A: Send + Sync + 'static,
        F: Fn(Arc<T>) -> A + 'static,
    {
        let target = TypeKey::of::<A>();
        let upcast: Upcast = Rc::new(move |value: &Value| {
            value.downcast::<T>().map(|instance| Value::new(convert(instance)))
        });
        self.upcasts.retain(|(key, _)| *key != target);
        self.upcasts.push((target, upcast));
        self
    }

    pub fn type_key(&self) -> TypeKey {
        self.type_key
    }

    /// Abstract types registered with [`ClassDefinition::implements`].
    pub fn implemented(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.upcasts.iter().map(|(key, _)| *key)
    }

    /// Presents `value` as `target`. Values already of that type, and targets
    /// without a registered upcast, pass through unchanged.
    pub fn upcast(&self, target: TypeKey, value: Value) -> Result<Value> {
        if value.type_key() == target {
            return Ok(value);
        }
        match self.upcasts.iter().find(|(key, _)| *key == target) {
            Some((_, upcast)) => upcast(&value).ok_or(Error::TypeMismatch {
                expected: self.type_key.name(),
                found: value.type_key().name(),
            }),
            None => Ok(value),
        }
    }

    pub fn provider(&self) -> Option<TypeKey> {
        self.provided_by
    }

    pub fn declares_constructor(&self) -> bool {
        self.constructor.is_some()
    }

    pub fn constructor_parameters(&self) -> &[Descriptor] {
        self.constructor.as_ref().map_or(&[], |c| &c.parameters)
    }

    pub fn properties(&self) -> &[Descriptor] {
        &self.properties
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodDefinition> {
        self.methods.iter()
    }

    pub fn find_method(&self, name: &str) -> Option<&MethodDefinition> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn instantiate(&self, arguments: &ResolvedArguments) -> Result<Value> {
        (self.factory)(arguments).map_err(Error::from_provide)
    }
}

impl fmt::Debug for ClassDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDefinition")
            .field("type", &self.type_key)
            .field("provided_by", &self.provided_by)
            .field("constructor", &self.constructor)
            .field("properties", &self.properties)
            .field("methods", &self.methods)
            .field("implements", &self.implemented().collect::<Vec<_>>())
            .finish()
    }
}

/// A public method carrying a [`Resolves`] marker.
#[derive(Debug, Clone)]
pub struct ResolvesMarker {
    pub method: String,
    pub provides: Vec<TypeKey>,
    pub returns: Option<DeclaredType>,
    pub is_static: bool,
    pub is_shared: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InjectTargets {
    pub constructor_marked: bool,
    pub properties: Vec<Descriptor>,
}

pub trait MetadataReader {
    fn class(&self, type_key: TypeKey) -> Option<Rc<ClassDefinition>>;

    fn exists(&self, type_key: TypeKey) -> bool {
        self.class(type_key).is_some()
    }

    fn provided_by(&self, type_key: TypeKey) -> Option<TypeKey> {
        self.class(type_key)?.provider()
    }

    fn resolves_markers(&self, type_key: TypeKey) -> Vec<ResolvesMarker> {
        let Some(class) = self.class(type_key) else {
            return Vec::new();
        };
        class
            .methods()
            .filter(|method| method.is_public())
            .filter_map(|method| {
                method.resolves_marker().map(|resolves| ResolvesMarker {
                    method: method.name().to_owned(),
                    provides: resolves.provides.clone(),
                    returns: method.return_type().cloned(),
                    is_static: method.is_static(),
                    is_shared: method.is_shared(),
                })
            })
            .collect()
    }

    fn inject_targets(&self, type_key: TypeKey) -> InjectTargets {
        self.class(type_key)
            .map(|class| InjectTargets {
                constructor_marked: class.constructor.as_ref().map_or(false, |c| c.inject),
                properties: class.properties().to_vec(),
            })
            .unwrap_or_default()
    }
}

/// Default [`MetadataReader`] populated at the composition root.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: BTreeMap<TypeKey, Rc<ClassDefinition>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class: ClassDefinition) -> &mut Self {
        tracing::trace!("registering class metadata for {}", class.type_key());
        self.classes.insert(class.type_key(), Rc::new(class));
        self
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl MetadataReader for ClassRegistry {
    fn class(&self, type_key: TypeKey) -> Option<Rc<ClassDefinition>> {
        self.classes.get(&type_key).cloned()
    }
}
