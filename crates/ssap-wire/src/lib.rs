//! SSAP wire codec.
//!
//! Three layers, leaves first:
//!
//! - [`buffer`]: a growable writer with element/attribute/CDATA primitives.
//! - [`generate`]: one builder per SSAP request, confirmation and indication.
//! - [`parse`]: a resumable, segment-fed decoder built on the byte-level tag
//!   scanner in [`scan`].
//!
//! # Quick start
//!
//! ```no_run
//! use ssap_core::{MessageName, MessageType};
//! use ssap_wire::{Envelope, build_join_request, parse_message};
//!
//! let env = Envelope::new("urn:node:7", "urn:space:1", 1);
//! let bytes = build_join_request(&env, None).unwrap();
//! let msg = parse_message(&bytes).unwrap();
//! assert_eq!(msg.msg_type, Some(MessageType::Request));
//! assert_eq!(msg.msg_name, Some(MessageName::Join));
//! ```

pub mod buffer;
pub mod generate;
pub mod parse;
pub mod scan;

pub use buffer::Buffer;
pub use generate::*;
pub use parse::{Parser, parse_message};
pub use ssap_core::{Error, Result};
