use thiserror::Error;
use std::sync::Arc;

#[derive(Error, Debug, Clone)]
pub enum Error {
  #[error("invalid resolver: {0}")]
  InvalidResolver(String),
  #[error("invalid provider: {0}")]
  InvalidProvider(String),
  #[error("invalid argument: {0}")]
  InvalidArgument(String),
  #[error("unregistered type: {0}")]
  UnregisteredType(&'static str),
  #[error("circular dependency: {}", .0.join(" -> "))]
  CircularDependency(Vec<&'static str>),
  #[error("resolved instance of {found} cannot be used as {expected}")]
  TypeMismatch {
    expected: &'static str,
    found: &'static str,
  },
  #[error("service: {0}")]
  Service(Arc<anyhow::Error>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  pub(crate) fn from_provide(err: anyhow::Error) -> Self {
    match err.downcast::<Error>() {
      Ok(err) => err,
      Err(err) => Error::Service(Arc::new(err)),
    }
  }
}
