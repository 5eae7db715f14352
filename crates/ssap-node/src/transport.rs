//! The byte-level seam between a [`Session`](crate::Session) and a connection.

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};

/// One connection to a SIB. Inbound bytes are handed to
/// [`Session::on_receive`](crate::Session::on_receive) by whoever owns the
/// read side.
pub trait Transport {
  fn send(&self, bytes: Bytes) -> Result<()>;
}

/// In-memory transport: every sent message is pushed onto an unbounded
/// channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
  tx: mpsc::UnboundedSender<Bytes>,
}

impl ChannelTransport {
  pub fn new() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, rx)
  }
}

impl Transport for ChannelTransport {
  fn send(&self, bytes: Bytes) -> Result<()> {
    trace!(len = bytes.len(), "sending message");
    self.tx.send(bytes).map_err(|e| Error::Transport(Box::new(e)))
  }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
  fn send(&self, bytes: Bytes) -> Result<()> { (**self).send(bytes) }
}
