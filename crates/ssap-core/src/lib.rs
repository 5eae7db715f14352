//! Core types for the SSAP client protocol engine.
//!
//! This crate is deliberately free of I/O and codec logic. It defines the
//! shared data model (messages, triples, path nodes) and the error taxonomy;
//! the wire codec, the graph codec and the session layer all depend on it.

pub mod error;
pub mod message;
pub mod triple;

pub use error::{Error, Result};
pub use message::{
  GraphStyle, MessageName, MessageType, ParseStatus, QueryStyle, SsapMessage,
  Status,
};
pub use triple::{ANY, ANY_SHORT, NodeType, PathNode, Triple};
