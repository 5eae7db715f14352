//! Error types shared by every SSAP crate.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  /// Malformed or out-of-vocabulary wire content. Fatal for the message
  /// being decoded.
  #[error("parse error: {0}")]
  Parse(String),

  /// A logic error inside this library, never caused by peer input alone.
  #[error("internal error: {0}")]
  Internal(String),

  #[error("not enough resources")]
  NotEnoughResources,

  /// The caller passed a structurally illegal triple or query, e.g. a
  /// wildcard predicate or a select variable that is not a variable.
  #[error("invalid parameter: {0}")]
  InvalidParameter(String),

  #[error("invalid triple specification: {0}")]
  InvalidTripleSpecification(String),

  /// Non-fatal: an indication arrived out of order. Results carried by the
  /// indication are still decoded and delivered.
  #[error("indication sequence error: expected {expected}, received {received}")]
  IndicationSequence { expected: i32, received: i32 },
}

impl From<std::collections::TryReserveError> for Error {
  fn from(_: std::collections::TryReserveError) -> Self {
    Error::NotEnoughResources
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
