use std::collections::BTreeSet;
use crate::error::{Error, Result};
use crate::helpers::TypeKey;
use crate::metadata::MetadataReader;
use crate::{Concrete, Container};

/// Result type of user supplied factories, closures and provider methods.
pub type ProvideResult<T> = anyhow::Result<T>;

/// Factory methods discovered on a provider type.
#[derive(Debug, Clone)]
pub struct Provider {
  provider: TypeKey,
  requires_instance: bool,
  /// Method name and the types it provides, the first being canonical.
  provides: Vec<(String, Vec<TypeKey>)>,
  shared_methods: BTreeSet<String>,
}

impl Provider {
  /// Reads the provider's `Resolves` markers without touching any container.
  pub fn inspect<M>(metadata: &M, provider: TypeKey) -> Result<Self>
    where M: MetadataReader + ?Sized
  {
    let definition = metadata.class(provider).ok_or_else(|| {
      Error::InvalidProvider(format!("invalid provider class {provider}"))
    })?;

    let mut requires_instance = definition.declares_constructor();
    let markers = metadata.resolves_markers(provider);

    if markers.is_empty() {
      return Err(Error::InvalidProvider(format!("provider {provider} provides nothing")));
    }

    let mut provides = Vec::with_capacity(markers.len());
    let mut shared_methods = BTreeSet::new();

    for marker in markers {
      let types = if marker.provides.is_empty() {
        marker.returns
          .map(|returns| returns.members().to_vec())
          .unwrap_or_default()
      } else {
        marker.provides
      };

      if types.is_empty() {
        return Err(Error::InvalidProvider(format!(
          "provider {provider}::{} does not specify what it provides",
          marker.method
        )));
      }

      if !marker.is_static {
        requires_instance = true;
      }

      if marker.is_shared {
        shared_methods.insert(marker.method.clone());
      }

      provides.push((marker.method, types));
    }

    Ok(Provider {
      provider,
      requires_instance,
      provides,
      shared_methods,
    })
  }

  /// Binds every provided type into `container`.
  pub fn register(&self, container: &mut Container) -> Result<()> {
    if self.requires_instance {
      container.bind(self.provider, None, true)?;
    }

    for (method, types) in &self.provides {
      let Some((canonical, aliases)) = types.split_first() else {
        continue;
      };
      let shared = self.shared_methods.contains(method);

      tracing::debug!("{} resolves {} via {}::{}", self.provider, canonical, self.provider, method);

      container
        .bind(*canonical, Some(Concrete::method(self.provider, method.as_str())), shared)?
        .alias(*canonical, aliases.iter().copied());
    }

    Ok(())
  }

  pub fn provider(&self) -> TypeKey {
    self.provider
  }

  pub fn requires_instance(&self) -> bool {
    self.requires_instance
  }

  pub fn provides(&self) -> impl Iterator<Item = (&str, &[TypeKey])> {
    self.provides.iter().map(|(method, types)| (method.as_str(), types.as_slice()))
  }

  pub fn is_shared(&self, method: &str) -> bool {
    self.shared_methods.contains(method)
  }
}
