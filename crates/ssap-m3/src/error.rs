//! Error types for the ssap-m3 graph codec.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] ssap_core::Error),

  #[error("xml error: {0}")]
  Xml(String),

  #[error("payload is not UTF-8: {0}")]
  Utf8(#[from] std::str::Utf8Error),

  #[error("unexpected element <{0}>")]
  UnexpectedElement(String),

  #[error("incomplete {0}")]
  Incomplete(&'static str),
}

impl From<quick_xml::Error> for Error {
  fn from(e: quick_xml::Error) -> Self { Error::Xml(e.to_string()) }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
  fn from(e: quick_xml::events::attributes::AttrError) -> Self {
    Error::Xml(e.to_string())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
