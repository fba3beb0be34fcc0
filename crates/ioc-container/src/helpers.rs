use std::any::{type_name, Any, TypeId};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// Identifier of an abstract or concrete type.
///
/// Only the `TypeId` takes part in comparisons, the name is carried along
/// for error messages and logs.
#[derive(Clone, Copy)]
pub struct TypeKey {
  id: TypeId,
  name: &'static str,
}

impl TypeKey {
  pub fn of<T: ?Sized + 'static>() -> Self {
    TypeKey {
      id: TypeId::of::<T>(),
      name: type_name::<T>(),
    }
  }

  pub fn id(&self) -> TypeId {
    self.id
  }

  pub fn name(&self) -> &'static str {
    self.name
  }
}

impl PartialEq for TypeKey {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id
  }
}

impl Eq for TypeKey {}

impl PartialOrd for TypeKey {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for TypeKey {
  fn cmp(&self, other: &Self) -> Ordering {
    self.id.cmp(&other.id)
  }
}

impl Hash for TypeKey {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.id.hash(state)
  }
}

impl fmt::Debug for TypeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("TypeKey")
      .field(&self.name)
      .finish()
  }
}

impl fmt::Display for TypeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name)
  }
}

/// A type-erased instance together with the key of the type it was built as.
///
/// Trait objects are stored boxed in an extra `Arc` (`Value::new::<Arc<dyn T>>`)
/// because `Arc<dyn Any>::downcast` cannot target an unsized type.
#[derive(Clone)]
pub struct Value {
  type_key: TypeKey,
  inner: AnyArc,
}

impl Value {
  pub fn new<T>(value: T) -> Self
    where T: Send + Sync + 'static
  {
    Self::from_arc(Arc::new(value))
  }

  pub fn from_arc<T>(value: Arc<T>) -> Self
    where T: Send + Sync + 'static
  {
    Value {
      type_key: TypeKey::of::<T>(),
      inner: value,
    }
  }

  pub fn type_key(&self) -> TypeKey {
    self.type_key
  }

  pub fn is<T: 'static>(&self) -> bool {
    self.inner.is::<T>()
  }

  pub fn downcast<T>(&self) -> Option<Arc<T>>
    where T: Send + Sync + 'static
  {
    self.inner.clone().downcast::<T>().ok()
  }

  pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
    self.inner.downcast_ref::<T>()
  }

  /// Whether both values point at the same allocation.
  pub fn ptr_eq(&self, other: &Value) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }
}

impl fmt::Debug for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Value")
      .field("type", &self.type_key.name)
      .finish()
  }
}
