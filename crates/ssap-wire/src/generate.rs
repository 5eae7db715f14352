//! SSAP message builders.
//!
//! Every message shares one skeleton:
//!
//! ```text
//! <SSAP_message>
//!   <message_type/> <message_name/> <transaction_id/> <node_id/> <space_id/>
//!   <parameter name="…">…</parameter>*
//!   <ind_sequence/>            (indications only)
//! </SSAP_message>
//! ```
//!
//! Graph, query and result payloads are already encoded by the caller (see
//! the `ssap-m3` crate); builders only frame them, inside CDATA.

use bytes::Bytes;
use ssap_core::{GraphStyle, MessageName, MessageType, QueryStyle, Result, Status};
use tracing::warn;

use crate::{buffer::Buffer, parse::ENVELOPE};

/// Addressing shared by every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope<'a> {
  pub node_id:    &'a str,
  pub space_id:   &'a str,
  pub msg_number: i32,
}

impl<'a> Envelope<'a> {
  pub fn new(node_id: &'a str, space_id: &'a str, msg_number: i32) -> Self {
    Self { node_id, space_id, msg_number }
  }
}

// ─── Response status ─────────────────────────────────────────────────────────

/// Outcome of a request as classified by the responding side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
  Ok,
  SibError,
  AccessDenied,
  NotImplemented,
  KpError,
  KpRequestError,
  MessageIncomplete,
  MessageSyntax,
  OutOfResources,
  NotFound,
  ProtectionFault,
  Reset,
  Closing,
  /// Anything the table below has no token for.
  Unclassified,
}

impl ResponseStatus {
  /// The wire token for this status.
  ///
  /// `Unclassified` falls back to the generic `m3:SIB.Error`. That may hide
  /// the real category from the peer, so each fallback is logged.
  pub fn wire_status(self) -> Status {
    match self {
      ResponseStatus::Ok => Status::Success,
      ResponseStatus::SibError => Status::SibError,
      ResponseStatus::AccessDenied => Status::AccessDenied,
      ResponseStatus::NotImplemented => Status::NotImplemented,
      ResponseStatus::KpError => Status::KpError,
      ResponseStatus::KpRequestError => Status::KpErrorRequest,
      ResponseStatus::MessageIncomplete => Status::KpErrorMessageIncomplete,
      ResponseStatus::MessageSyntax => Status::KpErrorMessageSyntax,
      ResponseStatus::OutOfResources => Status::OutOfResources,
      ResponseStatus::NotFound => Status::NotFound,
      ResponseStatus::ProtectionFault => Status::ProtectionFault,
      ResponseStatus::Reset => Status::Reset,
      ResponseStatus::Closing => Status::Closing,
      ResponseStatus::Unclassified => {
        warn!("unclassified response status sent as m3:SIB.Error");
        Status::SibError
      }
    }
  }
}

// ─── Skeleton helpers ────────────────────────────────────────────────────────

fn begin(
  msg_type: MessageType,
  msg_name: MessageName,
  env: &Envelope<'_>,
) -> Result<Buffer> {
  let mut buf = Buffer::new();
  buf.append_open(ENVELOPE, None, Some(""), false)?;
  buf.append_open("message_type", None, Some(msg_type.as_ref()), true)?;
  buf.append_open("message_name", None, Some(msg_name.as_ref()), true)?;
  buf.append_open(
    "transaction_id",
    None,
    Some(&env.msg_number.to_string()),
    true,
  )?;
  buf.append_open("node_id", None, Some(env.node_id), true)?;
  buf.append_open("space_id", None, Some(env.space_id), true)?;
  Ok(buf)
}

fn finish(mut buf: Buffer) -> Result<Bytes> {
  buf.append_close(ENVELOPE)?;
  buf.finish()
}

fn param_text(buf: &mut Buffer, name: &str, value: &str) -> Result<()> {
  buf.append_open("parameter", Some(("name", name)), Some(value), true)
}

fn param_payload(
  buf: &mut Buffer,
  name: &str,
  encoding: Option<&str>,
  payload: &str,
) -> Result<()> {
  buf.append_open("parameter", Some(("name", name)), None, false)?;
  if let Some(enc) = encoding {
    buf.append_attribute("encoding", enc)?;
  }
  buf.append_cdata(payload)?;
  buf.append_close("parameter")
}

fn param_status(buf: &mut Buffer, status: ResponseStatus) -> Result<()> {
  param_text(buf, "status", status.wire_status().as_ref())
}

fn param_confirm(buf: &mut Buffer, confirm: bool) -> Result<()> {
  param_text(buf, "confirm", if confirm { "TRUE" } else { "FALSE" })
}

// ─── Join / leave ────────────────────────────────────────────────────────────

pub fn build_join_request(
  env: &Envelope<'_>,
  credentials: Option<&str>,
) -> Result<Bytes> {
  let mut buf = begin(MessageType::Request, MessageName::Join, env)?;
  if let Some(credentials) = credentials {
    param_text(&mut buf, "credentials", credentials)?;
  }
  finish(buf)
}

pub fn build_join_confirm(
  env: &Envelope<'_>,
  status: ResponseStatus,
) -> Result<Bytes> {
  let mut buf = begin(MessageType::Confirm, MessageName::Join, env)?;
  param_status(&mut buf, status)?;
  finish(buf)
}

pub fn build_leave_request(env: &Envelope<'_>) -> Result<Bytes> {
  finish(begin(MessageType::Request, MessageName::Leave, env)?)
}

pub fn build_leave_confirm(
  env: &Envelope<'_>,
  status: ResponseStatus,
) -> Result<Bytes> {
  let mut buf = begin(MessageType::Confirm, MessageName::Leave, env)?;
  param_status(&mut buf, status)?;
  finish(buf)
}

// ─── Insert / remove / update ────────────────────────────────────────────────

pub fn build_insert_request(
  env: &Envelope<'_>,
  encoding: GraphStyle,
  graph: &str,
  confirm: bool,
) -> Result<Bytes> {
  let mut buf = begin(MessageType::Request, MessageName::Insert, env)?;
  param_confirm(&mut buf, confirm)?;
  param_payload(&mut buf, "insert_graph", Some(encoding.as_ref()), graph)?;
  finish(buf)
}

/// `bnodes` is the encoded label map for blank nodes in the inserted graph.
pub fn build_insert_confirm(
  env: &Envelope<'_>,
  status: ResponseStatus,
  bnodes: Option<&str>,
) -> Result<Bytes> {
  let mut buf = begin(MessageType::Confirm, MessageName::Insert, env)?;
  param_status(&mut buf, status)?;
  if let Some(bnodes) = bnodes {
    param_payload(&mut buf, "bnodes", None, bnodes)?;
  }
  finish(buf)
}

pub fn build_remove_request(
  env: &Envelope<'_>,
  encoding: GraphStyle,
  graph: &str,
  confirm: bool,
) -> Result<Bytes> {
  let mut buf = begin(MessageType::Request, MessageName::Remove, env)?;
  param_confirm(&mut buf, confirm)?;
  param_payload(&mut buf, "remove_graph", Some(encoding.as_ref()), graph)?;
  finish(buf)
}

pub fn build_remove_confirm(
  env: &Envelope<'_>,
  status: ResponseStatus,
) -> Result<Bytes> {
  let mut buf = begin(MessageType::Confirm, MessageName::Remove, env)?;
  param_status(&mut buf, status)?;
  finish(buf)
}

pub fn build_update_request(
  env: &Envelope<'_>,
  encoding: GraphStyle,
  insert_graph: &str,
  remove_graph: &str,
  confirm: bool,
) -> Result<Bytes> {
  let mut buf = begin(MessageType::Request, MessageName::Update, env)?;
  param_confirm(&mut buf, confirm)?;
  param_payload(&mut buf, "insert_graph", Some(encoding.as_ref()), insert_graph)?;
  param_payload(&mut buf, "remove_graph", Some(encoding.as_ref()), remove_graph)?;
  finish(buf)
}

pub fn build_update_confirm(
  env: &Envelope<'_>,
  status: ResponseStatus,
  bnodes: Option<&str>,
) -> Result<Bytes> {
  let mut buf = begin(MessageType::Confirm, MessageName::Update, env)?;
  param_status(&mut buf, status)?;
  if let Some(bnodes) = bnodes {
    param_payload(&mut buf, "bnodes", None, bnodes)?;
  }
  finish(buf)
}

// ─── Query ───────────────────────────────────────────────────────────────────

pub fn build_query_request(
  env: &Envelope<'_>,
  style: QueryStyle,
  query: &str,
) -> Result<Bytes> {
  let mut buf = begin(MessageType::Request, MessageName::Query, env)?;
  param_text(&mut buf, "type", style.as_ref())?;
  param_payload(&mut buf, "query", None, query)?;
  finish(buf)
}

pub fn build_query_confirm(
  env: &Envelope<'_>,
  status: ResponseStatus,
  results: &str,
) -> Result<Bytes> {
  let mut buf = begin(MessageType::Confirm, MessageName::Query, env)?;
  param_status(&mut buf, status)?;
  param_payload(&mut buf, "results", None, results)?;
  finish(buf)
}

// ─── Subscribe / unsubscribe ─────────────────────────────────────────────────

pub fn build_subscribe_request(
  env: &Envelope<'_>,
  style: QueryStyle,
  query: &str,
) -> Result<Bytes> {
  let mut buf = begin(MessageType::Request, MessageName::Subscribe, env)?;
  param_text(&mut buf, "type", style.as_ref())?;
  param_payload(&mut buf, "query", None, query)?;
  finish(buf)
}

pub fn build_subscribe_confirm(
  env: &Envelope<'_>,
  status: ResponseStatus,
  subscription_id: &str,
  results: &str,
) -> Result<Bytes> {
  let mut buf = begin(MessageType::Confirm, MessageName::Subscribe, env)?;
  param_status(&mut buf, status)?;
  param_text(&mut buf, "subscription_id", subscription_id)?;
  param_payload(&mut buf, "results", None, results)?;
  finish(buf)
}

/// Deliver `added` / `removed` results to a live subscription.
pub fn build_subscription_indication(
  env: &Envelope<'_>,
  seq_number: i32,
  subscription_id: &str,
  added: &str,
  removed: &str,
) -> Result<Bytes> {
  let mut buf = begin(MessageType::Indication, MessageName::Subscribe, env)?;
  param_text(&mut buf, "subscription_id", subscription_id)?;
  param_payload(&mut buf, "new_results", None, added)?;
  param_payload(&mut buf, "obsolete_results", None, removed)?;
  buf.append_open("ind_sequence", None, Some(&seq_number.to_string()), true)?;
  finish(buf)
}

pub fn build_unsubscribe_request(
  env: &Envelope<'_>,
  subscription_id: &str,
) -> Result<Bytes> {
  let mut buf = begin(MessageType::Request, MessageName::Unsubscribe, env)?;
  param_text(&mut buf, "subscription_id", subscription_id)?;
  finish(buf)
}

pub fn build_unsubscribe_confirm(
  env: &Envelope<'_>,
  status: ResponseStatus,
  subscription_id: &str,
) -> Result<Bytes> {
  let mut buf = begin(MessageType::Confirm, MessageName::Unsubscribe, env)?;
  param_status(&mut buf, status)?;
  param_text(&mut buf, "subscription_id", subscription_id)?;
  finish(buf)
}

/// SIB-initiated end of a subscription.
pub fn build_unsubscribe_indication(
  env: &Envelope<'_>,
  status: ResponseStatus,
  subscription_id: &str,
) -> Result<Bytes> {
  let mut buf = begin(MessageType::Indication, MessageName::Unsubscribe, env)?;
  param_status(&mut buf, status)?;
  param_text(&mut buf, "subscription_id", subscription_id)?;
  finish(buf)
}
