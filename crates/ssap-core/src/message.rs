//! The SSAP message — the unit decoded from, and encoded onto, the wire.
//!
//! Every vocabulary enum here carries its wire token through `strum`, so the
//! parser resolves tokens with `FromStr` and the generator emits them with
//! `AsRef<str>`. There is no other token table.

use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};

// ─── Vocabulary ──────────────────────────────────────────────────────────────

/// Content of the `message_type` element.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, EnumString, AsRefStr, Display,
)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
  #[strum(serialize = "REQUEST")]
  Request,
  #[strum(serialize = "CONFIRM")]
  Confirm,
  #[strum(serialize = "INDICATION")]
  Indication,
}

/// Content of the `message_name` element.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  EnumString,
  AsRefStr,
  Display,
)]
#[serde(rename_all = "lowercase")]
pub enum MessageName {
  #[strum(serialize = "JOIN")]
  Join,
  #[strum(serialize = "LEAVE")]
  Leave,
  #[strum(serialize = "INSERT")]
  Insert,
  #[strum(serialize = "UPDATE")]
  Update,
  #[strum(serialize = "REMOVE")]
  Remove,
  #[strum(serialize = "QUERY")]
  Query,
  #[strum(serialize = "SUBSCRIBE")]
  Subscribe,
  #[strum(serialize = "UNSUBSCRIBE")]
  Unsubscribe,
}

/// The `encoding` attribute of `insert_graph` / `remove_graph` parameters.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, EnumString, AsRefStr, Display,
)]
#[serde(rename_all = "lowercase")]
pub enum GraphStyle {
  /// RDF-M3 triple list; wildcards allowed in removals.
  #[strum(serialize = "RDF-M3")]
  Template,
  #[strum(serialize = "N3")]
  N3,
  #[strum(serialize = "RDF-XML")]
  Rdf,
}

/// The `type` parameter of query and subscribe requests.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  EnumString,
  AsRefStr,
  Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum QueryStyle {
  #[strum(serialize = "RDF-M3")]
  Template,
  #[strum(serialize = "N3")]
  N3,
  #[strum(serialize = "sparql")]
  Sparql,
  #[strum(serialize = "WQL-VALUES")]
  WqlValues,
  #[strum(serialize = "WQL-NODETYPES")]
  WqlNodeTypes,
  #[strum(serialize = "WQL-RELATED")]
  WqlRelated,
  #[strum(serialize = "WQL-ISTYPE")]
  WqlIsType,
  #[strum(serialize = "WQL-ISSUBTYPE")]
  WqlIsSubType,
}

/// Wire status tokens carried by the `status` parameter of confirmations.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, EnumString, AsRefStr, Display,
)]
pub enum Status {
  #[strum(serialize = "m3:Success")]
  Success,
  #[strum(serialize = "m3:KP.Error")]
  KpError,
  #[strum(serialize = "m3:KP.Error.Request")]
  KpErrorRequest,
  #[strum(serialize = "m3:KP.Error.Message.Incomplete")]
  KpErrorMessageIncomplete,
  #[strum(serialize = "m3:KP.Error.Message.Syntax")]
  KpErrorMessageSyntax,
  #[strum(serialize = "m3:SIB.Error")]
  SibError,
  #[strum(serialize = "m3:SIB.Error.AccessDenied")]
  SibErrorAccessDenied,
  #[strum(serialize = "m3:SIB.Failure.AccessDenied")]
  AccessDenied,
  #[strum(serialize = "m3:SIB.Failure.NotImplemented")]
  NotImplemented,
  #[strum(serialize = "m3:SIB.Failure.OutOfResources")]
  OutOfResources,
  #[strum(serialize = "m3:SIB.Failure.NotFound")]
  NotFound,
  #[strum(serialize = "m3:SIB.Failure.ProtectionFault")]
  ProtectionFault,
  #[strum(serialize = "m3:SIB.Notification.Reset")]
  Reset,
  #[strum(serialize = "m3:SIB.Notification.Closing")]
  Closing,
}

impl Status {
  pub fn is_success(self) -> bool { self == Status::Success }
}

/// Progress of decoding one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
  #[default]
  NotStarted,
  InProgress,
  Ok,
  ParseError,
  InternalError,
}

impl ParseStatus {
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      ParseStatus::Ok | ParseStatus::ParseError | ParseStatus::InternalError
    )
  }
}

// ─── Message ─────────────────────────────────────────────────────────────────

/// A decoded SSAP message.
///
/// Populated incrementally by the parser; once `parse_status` is terminal the
/// parser never touches it again. `None` stands for "unset" throughout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SsapMessage {
  pub parse_status:        ParseStatus,
  pub msg_type:            Option<MessageType>,
  pub msg_name:            Option<MessageName>,
  pub confirm_required:    bool,
  pub graph_style:         Option<GraphStyle>,
  pub query_style:         Option<QueryStyle>,
  pub status:              Option<Status>,
  /// `transaction_id` on the wire.
  pub msg_number:          i32,
  pub indication_sequence: Option<i32>,
  pub space_id:            Option<String>,
  pub node_id:             Option<String>,
  /// Main payload: insert graph, query text, results or new results.
  pub results:             Option<String>,
  /// Second payload: remove graph or obsolete results.
  pub removed_results:     Option<String>,
  /// Subscription id, or query id on query confirmations.
  pub subscription_id:     Option<String>,
  pub credentials:         Option<String>,
  pub expire_time:         Option<String>,
  pub icv:                 Option<String>,
  /// Blank-node label map returned by insert/update confirmations.
  pub bnodes:              Option<String>,
}

impl SsapMessage {
  pub fn new() -> Self { Self::default() }

  pub fn is(&self, msg_type: MessageType, msg_name: MessageName) -> bool {
    self.msg_type == Some(msg_type) && self.msg_name == Some(msg_name)
  }
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use super::*;

  #[test]
  fn tokens_round_trip_through_strum() {
    assert_eq!(MessageType::from_str("CONFIRM").unwrap(), MessageType::Confirm);
    assert_eq!(MessageName::Unsubscribe.as_ref(), "UNSUBSCRIBE");
    assert_eq!(QueryStyle::from_str("WQL-ISSUBTYPE").unwrap(), QueryStyle::WqlIsSubType);
    assert_eq!(Status::AccessDenied.as_ref(), "m3:SIB.Failure.AccessDenied");
    assert!(Status::from_str("m3:Whatever").is_err());
  }

  #[test]
  fn tokens_are_case_sensitive() {
    assert!(MessageType::from_str("request").is_err());
  }
}
