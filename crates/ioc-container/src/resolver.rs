use crate::arguments::Arguments;
use crate::engine::{check_arity, resolve_arguments};
use crate::error::{Error, Result};
use crate::helpers::{TypeKey, Value};
use crate::metadata::MetadataReader;
use crate::provider::ProvideResult;
use crate::Container;
use std::any::Any;
use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

/// Produces instances for a bound abstract type.
pub trait Resolver: Any {
    fn is_shared(&self) -> bool;

    /// With `fresh` set a shared resolver builds a new instance and leaves
    /// its cached one untouched.
    fn resolve(&self, container: &mut Container, arguments: Arguments, fresh: bool) -> Result<Option<Value>>;

    fn as_any(&self) -> &dyn Any;
}

impl fmt::Debug for dyn Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("shared", &self.is_shared())
            .finish()
    }
}

/// Cache slot of a resolver. Only shared resolvers keep an instance, and the
/// first non-null, non-fresh result is the one kept.
#[derive(Debug, Default)]
pub struct SharedInstance {
    shared: bool,
    instance: OnceCell<Value>,
}

impl SharedInstance {
    pub fn new(shared: bool) -> Self {
        Self {
            shared,
            instance: OnceCell::new(),
        }
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn get(&self) -> Option<&Value> {
        self.instance.get()
    }

    pub(crate) fn resolve_with<F>(&self, fresh: bool, build: F) -> Result<Option<Value>>
    where
        F: FnOnce() -> Result<Option<Value>>,
    {
        if self.shared && !fresh {
            if let Some(instance) = self.instance.get() {
                tracing::trace!("shared instance hit: {:?}", instance);
                return Ok(Some(instance.clone()));
            }
        }

        let resolved = build()?;

        if self.shared && !fresh {
            if let Some(instance) = &resolved {
                self.instance.set(instance.clone()).ok();
            }
        }

        Ok(resolved)
    }
}

/// Builds `class` and hands it out as `abstract_type`, converting through
/// the upcasts the class registered with `ClassDefinition::implements`.
#[derive(Debug)]
pub struct ClassResolver {
    abstract_type: TypeKey,
    class: TypeKey,
    slot: SharedInstance,
}

impl ClassResolver {
    pub fn new(class: TypeKey, shared: bool) -> Self {
        Self::bound(class, class, shared)
    }

    pub fn bound(abstract_type: TypeKey, class: TypeKey, shared: bool) -> Self {
        Self {
            abstract_type,
            class,
            slot: SharedInstance::new(shared),
        }
    }

    pub fn abstract_type(&self) -> TypeKey {
        self.abstract_type
    }

    pub fn class(&self) -> TypeKey {
        self.class
    }

    fn construct(&self, container: &mut Container, mut arguments: Arguments) -> Result<Option<Value>> {
        let metadata = container.metadata();
        let definition = metadata
            .class(self.class)
            .ok_or(Error::UnregisteredType(self.class.name()))?;
        let properties = metadata.inject_targets(self.class).properties;
        let parameters = definition.constructor_parameters();

        let resolved = if properties.is_empty() {
            if !parameters.is_empty() && !container.should_autowire() {
                check_arity(format_args!("{} constructor", self.class), parameters.len(), &arguments)?;
            }
            resolve_arguments(container, parameters, &mut arguments)?
        } else {
            if !container.should_autowire() {
                check_arity(self.class, parameters.len() + properties.len(), &arguments)?;
            }
            let mut resolved = resolve_arguments(container, &properties, &mut arguments)?;
            resolved.extend(resolve_arguments(container, parameters, &mut arguments)?);
            resolved
        };

        let instance = definition.instantiate(&resolved)?;
        definition.upcast(self.abstract_type, instance).map(Some)
    }
}

impl Resolver for ClassResolver {
    fn is_shared(&self) -> bool {
        self.slot.is_shared()
    }

    fn resolve(&self, container: &mut Container, arguments: Arguments, fresh: bool) -> Result<Option<Value>> {
        tracing::trace!("resolving class {}", self.class);
        self.slot
            .resolve_with(fresh, || self.construct(container, arguments))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Callable bound as a concrete. It receives the raw argument bag and owns
/// its own signature contract.
pub type Closure = Rc<dyn Fn(&mut Container, Arguments) -> ProvideResult<Option<Value>>>;

pub struct ClosureResolver {
    closure: Closure,
    slot: SharedInstance,
}

impl ClosureResolver {
    pub fn new(closure: Closure, shared: bool) -> Self {
        Self {
            closure,
            slot: SharedInstance::new(shared),
        }
    }
}

impl fmt::Debug for ClosureResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureResolver")
            .field("slot", &self.slot)
            .finish()
    }
}

impl Resolver for ClosureResolver {
    fn is_shared(&self) -> bool {
        self.slot.is_shared()
    }

    fn resolve(&self, container: &mut Container, arguments: Arguments, fresh: bool) -> Result<Option<Value>> {
        self.slot.resolve_with(fresh, || {
            (self.closure)(container, arguments).map_err(Error::from_provide)
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Invokes `class::method`. For an instance method the owner is made through
/// the container with an empty argument bag; the caller's arguments only
/// feed the method's own parameters.
#[derive(Debug)]
pub struct MethodResolver {
    class: TypeKey,
    method: String,
    slot: SharedInstance,
}

impl MethodResolver {
    /// Fails when `class` has no method called `method`.
    pub fn new<M>(metadata: &M, class: TypeKey, method: impl Into<String>, shared: bool) -> Result<Self>
    where
        M: MetadataReader + ?Sized,
    {
        let method = method.into();
        let exists = metadata
            .class(class)
            .map_or(false, |definition| definition.find_method(&method).is_some());

        if !exists {
            return Err(Error::InvalidResolver(format!(
                "cannot create a resolver for {class}::{method} as the method does not exist"
            )));
        }

        Ok(Self {
            class,
            method,
            slot: SharedInstance::new(shared),
        })
    }

    pub fn class(&self) -> TypeKey {
        self.class
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    fn invoke(&self, container: &mut Container, mut arguments: Arguments) -> Result<Option<Value>> {
        let definition = container
            .metadata()
            .class(self.class)
            .ok_or(Error::UnregisteredType(self.class.name()))?;
        let method = definition.find_method(&self.method).ok_or_else(|| {
            Error::InvalidResolver(format!("{}::{} does not exist", self.class, self.method))
        })?;

        let receiver = if method.is_static() {
            None
        } else {
            let instance = container.make(self.class, Arguments::new())?.ok_or_else(|| {
                Error::InvalidResolver(format!(
                    "no instance of {} available to call {}",
                    self.class, self.method
                ))
            })?;
            Some(instance)
        };

        let parameters = method.parameter_descriptors();
        if !parameters.is_empty() && !container.should_autowire() {
            check_arity(format_args!("{}::{}", self.class, self.method), parameters.len(), &arguments)?;
        }
        let resolved = resolve_arguments(container, parameters, &mut arguments)?;

        method.invoke(receiver.as_ref(), &resolved)
    }
}

impl Resolver for MethodResolver {
    fn is_shared(&self) -> bool {
        self.slot.is_shared()
    }

    fn resolve(&self, container: &mut Container, arguments: Arguments, fresh: bool) -> Result<Option<Value>> {
        tracing::trace!("resolving method {}::{}", self.class, self.method);
        self.slot
            .resolve_with(fresh, || self.invoke(container, arguments))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
