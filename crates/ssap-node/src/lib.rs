//! SSAP node: subscription bookkeeping, session glue and configuration.
//!
//! A [`Session`] turns operations into SSAP requests on a [`Transport`] and
//! feeds inbound bytes through the streaming parser. Query and subscription
//! results reach the [`Callback`] registered with the
//! [`SubscriptionManager`].

pub mod config;
pub mod error;
pub mod session;
pub mod subscription;
pub mod transport;


pub use config::NodeConfig;
pub use error::{Error, Result};
pub use session::{Incoming, Query, Scope, Session};
pub use subscription::{
  AccessId, Callback, Delivery, Delta, Dispatch, Event, Operation,
  SubscriptionManager,
};
pub use transport::{ChannelTransport, Transport};
