//! Autowiring inversion-of-control container.
//!
//! ```
//! use ioc_container::*;
//!
//! struct Clock;
//! struct Scheduler {
//!     clock: std::sync::Arc<Clock>,
//! }
//!
//! let mut container = Container::new(|registry| {
//!     registry
//!         .register(ClassDefinition::new(|_| Ok(Clock)))
//!         .register(
//!             ClassDefinition::new(|args| Ok(Scheduler { clock: args.instance("clock")? }))
//!                 .constructor([Descriptor::parameter::<Clock>("clock")]),
//!         );
//! });
//!
//! let scheduler: std::sync::Arc<Scheduler> = container.resolve().unwrap();
//! let _clock = &scheduler.clock;
//! ```

mod helpers;
pub use helpers::{TypeKey, Value};
mod error;
pub use error::{Error, Result};
mod arguments;
pub use arguments::{Argument, ArgumentKey, Arguments, ResolvedArguments};
mod metadata;
pub use metadata::{
    ClassDefinition, ClassRegistry, DeclaredType, Descriptor, Factory, InjectTargets, Invoker,
    MetadataReader, MethodDefinition, Resolves, ResolvesMarker, Upcast,
};
mod engine;
pub use engine::{check_arity, resolve_arguments, Dependencies};
mod resolver;
pub use resolver::{ClassResolver, Closure, ClosureResolver, MethodResolver, Resolver, SharedInstance};
mod provider;
pub use provider::{ProvideResult, Provider};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// What an abstract type is bound to.
pub enum Concrete {
    Class(TypeKey),
    Closure(Closure),
    Method(TypeKey, String),
    Resolver(Rc<dyn Resolver>),
}

impl Concrete {
    pub fn class<T: ?Sized + 'static>() -> Self {
        Concrete::Class(TypeKey::of::<T>())
    }

    pub fn method(class: TypeKey, method: impl Into<String>) -> Self {
        Concrete::Method(class, method.into())
    }

    pub fn closure<F>(f: F) -> Self
    where
        F: Fn(&mut Container, Arguments) -> ProvideResult<Option<Value>> + 'static,
    {
        Concrete::Closure(Rc::new(f))
    }

    /// Closure producing a `T` on every call.
    pub fn factory<T, F>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&mut Container, Arguments) -> ProvideResult<T> + 'static,
    {
        Concrete::Closure(Rc::new(
            move |container: &mut Container, arguments: Arguments| -> ProvideResult<Option<Value>> {
                f(container, arguments).map(|value| Some(Value::new(value)))
            },
        ))
    }

    pub fn resolver<R: Resolver>(resolver: R) -> Self {
        Concrete::Resolver(Rc::new(resolver))
    }
}

impl fmt::Debug for Concrete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Concrete::Class(class) => f.debug_tuple("Class").field(class).finish(),
            Concrete::Closure(_) => f.write_str("Closure(<closure>)"),
            Concrete::Method(class, method) => f.debug_tuple("Method").field(class).field(method).finish(),
            Concrete::Resolver(resolver) => f.debug_tuple("Resolver").field(resolver).finish(),
        }
    }
}

#[derive(Clone, Default)]
struct Bindings {
    resolvers: BTreeMap<TypeKey, Rc<dyn Resolver>>,
    aliases: BTreeMap<TypeKey, TypeKey>,
    providers: BTreeMap<TypeKey, Rc<Provider>>,
}

pub struct Container {
    metadata: Rc<dyn MetadataReader>,
    autowire: bool,
    bindings: Bindings,
    resolving: Vec<TypeKey>,
    in_transaction: bool,
}

impl Container {
    pub fn new<F>(config: F) -> Self
    where
        F: FnOnce(&mut ClassRegistry),
    {
        let mut registry = ClassRegistry::new();

        config(&mut registry);

        Self::with_metadata(Rc::new(registry))
    }

    pub fn build() -> ContainerBuilder {
        ContainerBuilder {
            registry: ClassRegistry::new(),
            autowire: true,
        }
    }

    pub fn with_metadata(metadata: Rc<dyn MetadataReader>) -> Self {
        Self {
            metadata,
            autowire: true,
            bindings: Bindings::default(),
            resolving: Vec::new(),
            in_transaction: false,
        }
    }

    pub fn metadata(&self) -> Rc<dyn MetadataReader> {
        self.metadata.clone()
    }

    pub fn should_autowire(&self) -> bool {
        self.autowire
    }

    pub fn enable_autowiring(&mut self) -> &mut Self {
        self.autowire = true;
        self
    }

    pub fn disable_autowiring(&mut self) -> &mut Self {
        self.autowire = false;
        self
    }

    /// Redirects each of `aliases` to `abstract_type`. Later aliases win.
    pub fn alias<I>(&mut self, abstract_type: TypeKey, aliases: I) -> &mut Self
    where
        I: IntoIterator<Item = TypeKey>,
    {
        for alias in aliases {
            tracing::debug!("alias {} -> {}", alias, abstract_type);
            self.bindings.aliases.insert(alias, abstract_type);
        }
        self
    }

    /// Binds `abstract_type` to `concrete`, or to itself when `concrete` is `None`.
    /// An existing binding for the type is replaced.
    pub fn bind(&mut self, abstract_type: TypeKey, concrete: Option<Concrete>, shared: bool) -> Result<&mut Self> {
        let concrete = concrete.unwrap_or(Concrete::Class(abstract_type));
        tracing::debug!("bind {} to {:?} (shared: {})", abstract_type, concrete, shared);

        self.rollback_on_error(|container| {
            let resolver = container.create_resolver(abstract_type, concrete, shared)?;
            container.insert_binding(abstract_type, resolver);
            Ok(())
        })?;

        Ok(self)
    }

    /// Binds an already built value as a shared instance.
    pub fn instance(&mut self, abstract_type: TypeKey, value: Value) -> &mut Self {
        let closure: Closure = Rc::new(
            move |_: &mut Container, _: Arguments| -> ProvideResult<Option<Value>> { Ok(Some(value.clone())) },
        );
        self.insert_binding(abstract_type, Rc::new(ClosureResolver::new(closure, true)));
        self
    }

    pub fn make(&mut self, abstract_type: TypeKey, arguments: Arguments) -> Result<Option<Value>> {
        self.make_with(abstract_type, arguments, false, false)
    }

    /// `shared` only applies when no binding exists yet and one is created here.
    pub fn make_with(
        &mut self,
        abstract_type: TypeKey,
        arguments: Arguments,
        fresh: bool,
        shared: bool,
    ) -> Result<Option<Value>> {
        self.rollback_on_error(|container| container.make_inner(abstract_type, arguments, fresh, shared))
    }

    pub fn resolve<T>(&mut self) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.resolve_with(Arguments::new())
    }

    pub fn resolve_with<T>(&mut self, arguments: Arguments) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let type_key = TypeKey::of::<T>();
        let value = self
            .make(type_key, arguments)?
            .ok_or_else(|| Error::InvalidResolver(format!("{type_key} resolved to nothing")))?;

        value.downcast::<T>().ok_or(Error::TypeMismatch {
            expected: type_key.name(),
            found: value.type_key().name(),
        })
    }

    pub fn call(&mut self, class: TypeKey, method: &str, arguments: Arguments) -> Result<Option<Value>> {
        self.call_with(class, method, arguments, false, false)
    }

    /// Invokes `class::method` through a one-off method resolver that is not kept.
    pub fn call_with(
        &mut self,
        class: TypeKey,
        method: &str,
        arguments: Arguments,
        fresh: bool,
        shared: bool,
    ) -> Result<Option<Value>> {
        self.rollback_on_error(|container| {
            let resolver = MethodResolver::new(&*container.metadata, class, method, shared)?;
            resolver.resolve(container, arguments, fresh)
        })
    }

    /// Registers every factory method of `provider_type`. Registering the same
    /// provider again re-binds all of its types.
    pub fn provider(&mut self, provider_type: TypeKey) -> Result<&mut Self> {
        let provider = Provider::inspect(&*self.metadata, provider_type)?;
        tracing::debug!("registering provider {}", provider_type);

        self.rollback_on_error(|container| provider.register(container))?;
        self.bindings.providers.insert(provider_type, Rc::new(provider));

        Ok(self)
    }

    pub fn has_binding(&self, abstract_type: TypeKey) -> bool {
        self.resolver(abstract_type).is_some()
    }

    pub fn has_provider(&self, provider_type: TypeKey) -> bool {
        self.bindings.providers.contains_key(&provider_type)
    }

    /// Resolver bound to `abstract_type`, following aliases.
    pub fn resolver(&self, abstract_type: TypeKey) -> Option<Rc<dyn Resolver>> {
        self.bindings.resolvers.get(&self.canonical(abstract_type)).cloned()
    }

    fn make_inner(
        &mut self,
        abstract_type: TypeKey,
        arguments: Arguments,
        fresh: bool,
        shared: bool,
    ) -> Result<Option<Value>> {
        let abstract_type = self.canonical(abstract_type);

        if self.resolving.contains(&abstract_type) {
            let mut path: Vec<&'static str> = self.resolving.iter().map(TypeKey::name).collect();
            path.push(abstract_type.name());
            return Err(Error::CircularDependency(path));
        }

        let resolver = match self.bindings.resolvers.get(&abstract_type) {
            Some(resolver) => resolver.clone(),
            None => {
                if !self.metadata.exists(abstract_type) {
                    return Err(Error::UnregisteredType(abstract_type.name()));
                }
                tracing::debug!("no binding for {}, creating one", abstract_type);
                let resolver = self.create_resolver(abstract_type, Concrete::Class(abstract_type), shared)?;
                self.bindings.resolvers.insert(abstract_type, resolver.clone());
                resolver
            }
        };

        self.resolving.push(abstract_type);
        let resolved = resolver.resolve(self, arguments, fresh);
        self.resolving.pop();

        resolved
    }

    fn create_resolver(
        &mut self,
        abstract_type: TypeKey,
        concrete: Concrete,
        shared: bool,
    ) -> Result<Rc<dyn Resolver>> {
        match concrete {
            Concrete::Resolver(resolver) => Ok(resolver),
            Concrete::Closure(closure) => Ok(Rc::new(ClosureResolver::new(closure, shared))),
            Concrete::Method(class, method) => {
                Ok(Rc::new(MethodResolver::new(&*self.metadata, class, method, shared)?))
            }
            Concrete::Class(class) => {
                if !self.metadata.exists(class) {
                    return Err(Error::InvalidResolver(format!("{class} is not a known class")));
                }
                match self.process_class_provider(class)? {
                    Some(resolver) if abstract_type == class => Ok(resolver),
                    Some(_) => Ok(Rc::new(ClosureResolver::new(provided_as(abstract_type, class), shared))),
                    None => Ok(Rc::new(ClassResolver::bound(abstract_type, class, shared))),
                }
            }
        }
    }

    /// Registers the provider named by `class`'s `ProvidedBy` marker and
    /// returns whatever it bound `class` to.
    fn process_class_provider(&mut self, class: TypeKey) -> Result<Option<Rc<dyn Resolver>>> {
        let Some(provider) = self.metadata.provided_by(class) else {
            return Ok(None);
        };
        if provider == class {
            return Ok(None);
        }

        if !self.has_provider(provider) {
            tracing::debug!("{} is provided by {}", class, provider);
            self.provider(provider)?;
        }

        Ok(self.resolver(class))
    }

    fn insert_binding(&mut self, abstract_type: TypeKey, resolver: Rc<dyn Resolver>) {
        if self.bindings.aliases.remove(&abstract_type).is_some() {
            tracing::debug!("{} is no longer an alias", abstract_type);
        }
        self.bindings.resolvers.insert(abstract_type, resolver);
    }

    fn canonical(&self, abstract_type: TypeKey) -> TypeKey {
        let mut current = abstract_type;
        let mut seen = BTreeSet::new();

        while let Some(target) = self.bindings.aliases.get(&current) {
            if !seen.insert(current) {
                tracing::warn!("alias cycle through {}", current);
                break;
            }
            current = *target;
        }

        current
    }

    /// Restores the binding tables when `f` fails. Only the outermost call
    /// takes a snapshot; nested ones fail through to it.
    fn rollback_on_error<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        if self.in_transaction {
            return f(self);
        }

        let snapshot = self.bindings.clone();
        self.in_transaction = true;
        let result = f(self);
        self.in_transaction = false;

        if let Err(err) = &result {
            tracing::debug!("restoring bindings after error: {}", err);
            self.bindings = snapshot;
        }

        result
    }
}

/// Resolves `class` through its provider binding and presents it as `abstract_type`.
fn provided_as(abstract_type: TypeKey, class: TypeKey) -> Closure {
    Rc::new(
        move |container: &mut Container, arguments: Arguments| -> ProvideResult<Option<Value>> {
            let Some(instance) = container.make(class, arguments)? else {
                return Ok(None);
            };
            let definition = container
                .metadata()
                .class(class)
                .ok_or(Error::UnregisteredType(class.name()))?;
            Ok(Some(definition.upcast(abstract_type, instance)?))
        },
    )
}

impl Dependencies for Container {
    fn should_autowire(&self) -> bool {
        self.autowire
    }

    fn is_constructible(&self, type_key: TypeKey) -> bool {
        let type_key = self.canonical(type_key);
        self.bindings.resolvers.contains_key(&type_key) || self.metadata.exists(type_key)
    }

    fn make_dependency(&mut self, type_key: TypeKey, arguments: Arguments) -> Result<Option<Value>> {
        self.make(type_key, arguments)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("autowire", &self.autowire)
            .field("bindings", &self.bindings.resolvers.keys().collect::<Vec<_>>())
            .field("aliases", &self.bindings.aliases)
            .field("providers", &self.bindings.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug)]
pub struct ContainerBuilder {
    registry: ClassRegistry,
    autowire: bool,
}

impl ContainerBuilder {
    pub fn register(&mut self, class: ClassDefinition) -> &mut Self {
        self.registry.register(class);
        self
    }

    pub fn autowiring(&mut self, enabled: bool) -> &mut Self {
        self.autowire = enabled;
        self
    }

    pub fn finalize(self) -> Container {
        let mut container = Container::with_metadata(Rc::new(self.registry));
        container.autowire = self.autowire;
        container
    }
}
