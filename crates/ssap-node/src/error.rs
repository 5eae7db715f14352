//! Error types for the ssap-node session layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] ssap_core::Error),
  #[error(transparent)]
  Graph(#[from] ssap_m3::Error),
  #[error("transport error: {0}")]
  Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("no operation registered under access id {0}")]
  UnknownAccessId(i32),
  #[error("access id {0} is already in use")]
  DuplicateAccessId(i32),
  #[error("unknown subscription {0:?}")]
  UnknownSubscription(String),
  #[error("subscription {0:?} is not active")]
  NotSubscribed(String),
  #[error("config error: {0}")]
  Config(#[from] config::ConfigError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
