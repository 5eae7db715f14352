//! Resumable SSAP message decoder.
//!
//! Pipeline:
//!   segments (&[u8], any size)
//!     └─ Scanner           → start / end / text events
//!          └─ Decoder      → element stack, field capture
//!               └─ apply() → validated SsapMessage fields
//!
//! The decoder accepts at most three levels of nesting: the envelope, its
//! field elements, and one level of markup inside a `parameter`, which is
//! re-serialized into the captured text.

use std::str::FromStr;

use ssap_core::{
  Error, GraphStyle, MessageName, MessageType, ParseStatus, QueryStyle, Result,
  SsapMessage, Status,
};
use strum::EnumString;
use tracing::{debug, trace, warn};

use crate::{
  buffer::escape_attribute,
  scan::{Flow, Scanner, Sink, Tag},
};

pub const ENVELOPE: &str = "SSAP_message";
const MAX_DEPTH: usize = 3;

// ─── Field vocabulary ────────────────────────────────────────────────────────

/// Values of the `name` attribute on `parameter` elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
enum Param {
  Confirm,
  InsertGraph,
  RemoveGraph,
  Credentials,
  Type,
  Query,
  Status,
  QueryId,
  SubscriptionId,
  Results,
  NewResults,
  ObsoleteResults,
  Bnodes,
  IndSequence,
  ExpireTime,
}

/// Element (or parameter) whose text is being captured.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
  MessageType,
  MessageName,
  TransactionId,
  NodeId,
  SpaceId,
  Icv,
  IndSequence,
  Parameter { param: Param, encoding: Option<String> },
}

impl Field {
  fn from_tag(tag: &Tag) -> Result<Self> {
    let field = match tag.name.as_str() {
      "message_type" => Field::MessageType,
      "message_name" | "transaction_type" => Field::MessageName,
      "transaction_id" | "message_number" => Field::TransactionId,
      "node_id" => Field::NodeId,
      "space_id" => Field::SpaceId,
      "icv" => Field::Icv,
      "ind_sequence" => Field::IndSequence,
      "parameter" => {
        let name = tag.attribute("name").ok_or_else(|| {
          Error::Parse("parameter without a name attribute".into())
        })?;
        let param = Param::from_str(name).map_err(|_| {
          Error::Parse(format!("unknown parameter name {name:?}"))
        })?;
        Field::Parameter {
          param,
          encoding: tag.attribute("encoding").map(str::to_string),
        }
      }
      other => {
        return Err(Error::Parse(format!("unknown element <{other}>")));
      }
    };
    Ok(field)
  }
}

// ─── Decoder ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Decoder {
  msg:   SsapMessage,
  stack: Vec<String>,
  field: Option<Field>,
  text:  Vec<u8>,
  done:  bool,
}

impl Sink for Decoder {
  fn start(&mut self, tag: &Tag) -> Result<Flow> {
    match self.stack.len() {
      0 => {
        if tag.name != ENVELOPE {
          return Err(Error::Parse(format!(
            "expected <{ENVELOPE}>, found <{}>",
            tag.name
          )));
        }
        if !tag.attributes.is_empty() {
          return Err(Error::Parse("attributes on the envelope".into()));
        }
        if tag.empty {
          return Err(Error::Parse("empty envelope".into()));
        }
      }
      1 => {
        let field = Field::from_tag(tag)?;
        if tag.empty {
          trace!(element = %tag.name, "skipping self-closing field");
          return Ok(Flow::Continue);
        }
        self.field = Some(field);
        self.text.clear();
      }
      2 => {
        if !matches!(self.field, Some(Field::Parameter { .. })) {
          return Err(Error::Parse(format!(
            "unexpected element <{}> inside <{}>",
            tag.name, self.stack[1]
          )));
        }
        self.reserialize_start(tag);
      }
      _ => {
        return Err(Error::Parse(format!(
          "element <{}> nested deeper than {MAX_DEPTH} levels",
          tag.name
        )));
      }
    }
    if !tag.empty {
      self.stack.push(tag.name.clone());
    }
    Ok(Flow::Continue)
  }

  fn end(&mut self, name: &str) -> Result<Flow> {
    match self.stack.pop() {
      Some(open) if open == name => {}
      Some(open) => {
        return Err(Error::Parse(format!(
          "</{name}> closes <{open}>"
        )));
      }
      None => return Err(Error::Parse(format!("stray </{name}>"))),
    }
    match self.stack.len() {
      2 => {
        self.text.extend_from_slice(b"</");
        self.text.extend_from_slice(name.as_bytes());
        self.text.push(b'>');
      }
      1 => {
        let field = self.field.take().ok_or_else(|| {
          Error::Internal(format!("closing <{name}> with no field captured"))
        })?;
        let text = std::mem::take(&mut self.text);
        self.apply(field, text)?;
      }
      0 => {
        if self.msg.msg_type.is_none() {
          return Err(Error::Parse("message has no message_type".into()));
        }
        self.done = true;
        return Ok(Flow::Stop);
      }
      _ => {}
    }
    Ok(Flow::Continue)
  }

  fn text(&mut self, bytes: &[u8], cdata: bool) -> Result<()> {
    if self.stack.len() >= 3 {
      // Inside re-serialized markup the text has to stay well-formed.
      escape_into(&mut self.text, bytes);
      return Ok(());
    }
    if self.stack.len() == 2 {
      self.text.extend_from_slice(bytes);
      return Ok(());
    }
    if cdata || !bytes.iter().all(u8::is_ascii_whitespace) {
      let place = if self.stack.is_empty() {
        "outside the envelope"
      } else {
        "between fields"
      };
      return Err(Error::Parse(format!("character data {place}")));
    }
    Ok(())
  }
}

impl Decoder {
  fn reserialize_start(&mut self, tag: &Tag) {
    let mut markup = format!("<{}", tag.name);
    for (k, v) in &tag.attributes {
      markup.push_str(&format!(" {k}=\"{}\"", escape_attribute(v)));
    }
    markup.push_str(if tag.empty { "/>" } else { ">" });
    self.text.extend_from_slice(markup.as_bytes());
  }

  fn apply(&mut self, field: Field, raw: Vec<u8>) -> Result<()> {
    let text = String::from_utf8(raw)
      .map_err(|_| Error::Parse("field content is not valid UTF-8".into()))?;
    let token = text.trim();
    let msg = &mut self.msg;

    match field {
      Field::MessageType => {
        if msg.msg_type.is_some() {
          return Err(Error::Parse("message_type set twice".into()));
        }
        msg.msg_type = Some(parse_token(token, "message_type")?);
      }
      Field::MessageName => {
        if msg.msg_name.is_some() {
          return Err(Error::Parse("message_name set twice".into()));
        }
        msg.msg_name = Some(parse_token::<MessageName>(token, "message_name")?);
      }
      Field::NodeId => {
        if msg.node_id.is_some() {
          return Err(Error::Parse("node_id set twice".into()));
        }
        msg.node_id = Some(token.to_string());
      }
      Field::SpaceId => {
        if msg.space_id.is_some() {
          return Err(Error::Parse("space_id set twice".into()));
        }
        msg.space_id = Some(token.to_string());
      }
      Field::TransactionId => msg.msg_number = parse_int(token, "transaction_id")?,
      Field::Icv => set_once(&mut msg.icv, token, "icv"),
      Field::IndSequence => {
        let seq = parse_int(token, "ind_sequence")?;
        msg.indication_sequence.get_or_insert(seq);
      }
      Field::Parameter { param, encoding } => {
        apply_parameter(msg, param, encoding, text)?;
      }
    }
    Ok(())
  }
}

fn apply_parameter(
  msg: &mut SsapMessage,
  param: Param,
  encoding: Option<String>,
  text: String,
) -> Result<()> {
  let token = text.trim();
  match param {
    Param::Confirm => {
      msg.confirm_required = match token.to_ascii_uppercase().as_str() {
        "TRUE" | "YES" => true,
        "FALSE" | "NO" => false,
        _ => {
          return Err(Error::Parse(format!("bad confirm flag {token:?}")));
        }
      };
    }
    Param::Status => {
      let status: Status = parse_token(token, "status")?;
      msg.status.get_or_insert(status);
    }
    Param::Type => {
      let style: QueryStyle = parse_token(token, "query type")?;
      msg.query_style.get_or_insert(style);
    }
    Param::IndSequence => {
      let seq = parse_int(token, "ind_sequence")?;
      msg.indication_sequence.get_or_insert(seq);
    }
    Param::Credentials => set_once(&mut msg.credentials, token, "credentials"),
    Param::ExpireTime => set_once(&mut msg.expire_time, token, "expire_time"),
    Param::QueryId | Param::SubscriptionId => {
      set_once(&mut msg.subscription_id, token, "subscription_id")
    }
    Param::Bnodes => set_once(&mut msg.bnodes, &text, "bnodes"),
    Param::InsertGraph | Param::RemoveGraph => {
      if let Some(enc) = encoding {
        let style: GraphStyle = parse_token(enc.trim(), "graph encoding")?;
        msg.graph_style.get_or_insert(style);
      }
      if param == Param::InsertGraph {
        store_main(msg, text);
      } else {
        set_once(&mut msg.removed_results, &text, "remove_graph");
      }
    }
    Param::Query | Param::Results | Param::NewResults => store_main(msg, text),
    Param::ObsoleteResults => {
      set_once(&mut msg.removed_results, &text, "obsolete_results")
    }
  }
  Ok(())
}

/// Main payload slot. A second main payload is decoded into the removed slot
/// when that is still free.
fn store_main(msg: &mut SsapMessage, text: String) {
  if msg.results.is_none() {
    msg.results = Some(text);
  } else if msg.removed_results.is_none() {
    debug!("second main payload stored as removed results");
    msg.removed_results = Some(text);
  } else {
    debug!("third main payload ignored");
  }
}

fn set_once(slot: &mut Option<String>, value: &str, field: &str) {
  if slot.is_some() {
    debug!(field, "duplicate parameter ignored");
    return;
  }
  *slot = Some(value.to_string());
}

fn escape_into(out: &mut Vec<u8>, bytes: &[u8]) {
  for &b in bytes {
    match b {
      b'&' => out.extend_from_slice(b"&amp;"),
      b'<' => out.extend_from_slice(b"&lt;"),
      b'>' => out.extend_from_slice(b"&gt;"),
      _ => out.push(b),
    }
  }
}

fn parse_token<T: FromStr>(token: &str, field: &str) -> Result<T> {
  T::from_str(token)
    .map_err(|_| Error::Parse(format!("unrecognized {field} {token:?}")))
}

fn parse_int(token: &str, field: &str) -> Result<i32> {
  token
    .parse()
    .map_err(|_| Error::Parse(format!("{field} is not an integer: {token:?}")))
}

// ─── Parser ──────────────────────────────────────────────────────────────────

/// Segment-fed SSAP decoder.
///
/// Feed bytes as they arrive; the parser keeps every partial token between
/// calls. Once the envelope closes it stops consuming, so bytes following
/// the message in the same segment can be handed to a fresh parser.
///
/// ```no_run
/// use ssap_core::ParseStatus;
/// use ssap_wire::Parser;
///
/// let mut parser = Parser::new();
/// parser.feed(b"<SSAP_message><message_type>CONF", false).unwrap();
/// let status = parser
///   .feed(b"IRM</message_type></SSAP_message>", true)
///   .unwrap();
/// assert_eq!(status, ParseStatus::Ok);
/// ```
#[derive(Debug, Default)]
pub struct Parser {
  scanner:       Scanner,
  decoder:       Decoder,
  status:        ParseStatus,
  error:         Option<Error>,
  consumed:      usize,
  last_consumed: usize,
}

impl Parser {
  pub fn new() -> Self { Self::default() }

  /// Consume `segment`. `is_last` declares that no more input will follow;
  /// an unfinished message then becomes a parse error.
  ///
  /// Terminal states are sticky: after `Ok` further calls consume nothing,
  /// after an error they return the same error.
  pub fn feed(&mut self, segment: &[u8], is_last: bool) -> Result<ParseStatus> {
    self.last_consumed = 0;
    if let Some(err) = &self.error {
      return Err(err.clone());
    }
    if self.status == ParseStatus::Ok {
      return Ok(ParseStatus::Ok);
    }
    self.status = ParseStatus::InProgress;
    self.decoder.msg.parse_status = ParseStatus::InProgress;

    match self.scanner.feed(segment, &mut self.decoder) {
      Ok(n) => {
        self.last_consumed = n;
        self.consumed += n;
      }
      Err(e) => return Err(self.fail(e)),
    }

    if self.decoder.done {
      self.status = ParseStatus::Ok;
      self.decoder.msg.parse_status = ParseStatus::Ok;
      trace!(consumed = self.consumed, "message decoded");
      return Ok(ParseStatus::Ok);
    }
    if is_last {
      return Err(self.fail(Error::Parse("input ended inside the message".into())));
    }
    Ok(ParseStatus::InProgress)
  }

  fn fail(&mut self, err: Error) -> Error {
    self.status = match err {
      Error::Parse(_) => ParseStatus::ParseError,
      _ => ParseStatus::InternalError,
    };
    self.decoder.msg.parse_status = self.status;
    warn!(error = %err, consumed = self.consumed, "SSAP decode failed");
    self.error = Some(err.clone());
    err
  }

  pub fn status(&self) -> ParseStatus { self.status }

  /// Total input bytes consumed across all calls.
  pub fn consumed(&self) -> usize { self.consumed }

  /// Bytes of the most recent segment that belonged to this message.
  pub fn last_consumed(&self) -> usize { self.last_consumed }

  /// The message as decoded so far.
  pub fn message(&self) -> &SsapMessage { &self.decoder.msg }

  /// Take the decoded message. Fails unless the parse completed.
  pub fn finish(self) -> Result<SsapMessage> {
    if let Some(err) = self.error {
      return Err(err);
    }
    if self.status != ParseStatus::Ok {
      return Err(Error::Parse("message incomplete".into()));
    }
    Ok(self.decoder.msg)
  }
}

/// Decode one complete message held in memory.
pub fn parse_message(bytes: &[u8]) -> Result<SsapMessage> {
  let mut parser = Parser::new();
  parser.feed(bytes, true)?;
  parser.finish()
}

#[cfg(test)]
mod tests {
  use proptest::prelude::*;

  use super::*;
  use crate::generate::*;

  fn env() -> Envelope<'static> { Envelope::new("urn:node:7", "urn:space:1", 1) }

  fn feed_in_chunks(bytes: &[u8], size: usize) -> Result<SsapMessage> {
    let mut parser = Parser::new();
    let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
    for (i, chunk) in chunks.iter().enumerate() {
      parser.feed(chunk, i + 1 == chunks.len())?;
    }
    parser.finish()
  }

  #[test]
  fn join_request_round_trip() {
    let bytes = build_join_request(&env(), None).unwrap();
    let msg = parse_message(&bytes).unwrap();
    assert_eq!(msg.parse_status, ParseStatus::Ok);
    assert_eq!(msg.msg_type, Some(MessageType::Request));
    assert_eq!(msg.msg_name, Some(MessageName::Join));
    assert_eq!(msg.space_id.as_deref(), Some("urn:space:1"));
    assert_eq!(msg.node_id.as_deref(), Some("urn:node:7"));
    assert_eq!(msg.msg_number, 1);
  }

  #[test]
  fn byte_at_a_time_equals_whole() {
    let bytes = build_update_request(
      &env(),
      GraphStyle::Template,
      "<triple_list>a]]>b</triple_list>",
      "<triple_list/>",
      true,
    )
    .unwrap();
    let whole = parse_message(&bytes).unwrap();
    let split = feed_in_chunks(&bytes, 1).unwrap();
    assert_eq!(whole, split);
    assert_eq!(whole.results.as_deref(), Some("<triple_list>a]]>b</triple_list>"));
    assert_eq!(whole.removed_results.as_deref(), Some("<triple_list/>"));
    assert_eq!(whole.graph_style, Some(GraphStyle::Template));
    assert!(whole.confirm_required);
  }

  #[test]
  fn indication_fields() {
    let bytes =
      build_subscription_indication(&env(), 3, "sub-1", "<added/>", "").unwrap();
    let msg = parse_message(&bytes).unwrap();
    assert!(msg.is(MessageType::Indication, MessageName::Subscribe));
    assert_eq!(msg.indication_sequence, Some(3));
    assert_eq!(msg.subscription_id.as_deref(), Some("sub-1"));
    assert_eq!(msg.results.as_deref(), Some("<added/>"));
    assert_eq!(msg.removed_results.as_deref(), Some(""));
  }

  #[test]
  fn status_tokens_are_validated() {
    let doc = b"<SSAP_message><message_type>CONFIRM</message_type>\
      <parameter name=\"status\">m3:Bogus</parameter></SSAP_message>";
    let mut parser = Parser::new();
    assert!(matches!(parser.feed(doc, true), Err(Error::Parse(_))));
    assert_eq!(parser.status(), ParseStatus::ParseError);
  }

  #[test]
  fn fourth_level_is_rejected() {
    let doc = b"<SSAP_message><message_type>CONFIRM</message_type>\
      <parameter name=\"results\"><a><b/></a></parameter></SSAP_message>";
    let err = parse_message(doc).unwrap_err();
    assert!(matches!(err, Error::Parse(ref m) if m.contains("deeper")), "{err}");
  }

  #[test]
  fn third_level_markup_is_reserialized() {
    let doc = b"<SSAP_message><message_type>CONFIRM</message_type>\
      <parameter name=\"results\"><node_list k=\"&amp;\">x</node_list><e/></parameter>\
      </SSAP_message>";
    let msg = parse_message(doc).unwrap();
    assert_eq!(
      msg.results.as_deref(),
      Some("<node_list k=\"&amp;\">x</node_list><e/>")
    );
  }

  #[test]
  fn reserialized_markup_keeps_text_escaped() {
    let doc = b"<SSAP_message><message_type>CONFIRM</message_type>\
      <parameter name=\"results\"><node name=\"literal\">a &lt;b&gt; &amp; c</node>\
      <node><![CDATA[x<y]]></node></parameter></SSAP_message>";
    let msg = parse_message(doc).unwrap();
    assert_eq!(
      msg.results.as_deref(),
      Some("<node name=\"literal\">a &lt;b&gt; &amp; c</node><node>x&lt;y</node>")
    );
  }

  #[test]
  fn envelope_with_attributes_is_rejected() {
    let doc = b"<SSAP_message v=\"1\"><message_type>REQUEST</message_type></SSAP_message>";
    assert!(parse_message(doc).is_err());
  }

  #[test]
  fn unknown_element_is_rejected() {
    let doc = b"<SSAP_message><colour>red</colour></SSAP_message>";
    assert!(parse_message(doc).is_err());
  }

  #[test]
  fn duplicate_message_type_is_rejected() {
    let doc = b"<SSAP_message><message_type>REQUEST</message_type>\
      <message_type>CONFIRM</message_type></SSAP_message>";
    assert!(parse_message(doc).is_err());
  }

  #[test]
  fn duplicate_plain_parameter_keeps_first() {
    let doc = b"<SSAP_message><message_type>CONFIRM</message_type>\
      <parameter name=\"subscription_id\">one</parameter>\
      <parameter name=\"subscription_id\">two</parameter></SSAP_message>";
    let msg = parse_message(doc).unwrap();
    assert_eq!(msg.subscription_id.as_deref(), Some("one"));
  }

  #[test]
  fn duplicate_results_fill_removed_slot() {
    let doc = b"<SSAP_message><message_type>CONFIRM</message_type>\
      <parameter name=\"results\">first</parameter>\
      <parameter name=\"results\">second</parameter></SSAP_message>";
    let msg = parse_message(doc).unwrap();
    assert_eq!(msg.results.as_deref(), Some("first"));
    assert_eq!(msg.removed_results.as_deref(), Some("second"));
  }

  #[test]
  fn self_closing_field_is_skipped() {
    let doc = b"<SSAP_message><message_type>CONFIRM</message_type><node_id/>\
      <space_id>s</space_id></SSAP_message>";
    let msg = parse_message(doc).unwrap();
    assert_eq!(msg.node_id, None);
    assert_eq!(msg.space_id.as_deref(), Some("s"));
  }

  #[test]
  fn missing_message_type_is_rejected() {
    let doc = b"<SSAP_message><node_id>n</node_id></SSAP_message>";
    assert!(parse_message(doc).is_err());
  }

  #[test]
  fn partial_input_stays_in_progress() {
    let bytes = build_leave_request(&env()).unwrap();
    let (head, tail) = bytes.split_at(bytes.len() / 2);
    let mut parser = Parser::new();
    assert_eq!(parser.status(), ParseStatus::NotStarted);
    assert_eq!(parser.feed(head, false).unwrap(), ParseStatus::InProgress);
    assert_eq!(parser.feed(tail, true).unwrap(), ParseStatus::Ok);
    assert_eq!(parser.consumed(), bytes.len());
  }

  #[test]
  fn truncated_last_segment_is_an_error() {
    let bytes = build_leave_request(&env()).unwrap();
    let mut parser = Parser::new();
    assert!(parser.feed(&bytes[..bytes.len() - 3], true).is_err());
  }

  #[test]
  fn errors_are_sticky() {
    let mut parser = Parser::new();
    let first = parser.feed(b"<nope>", false).unwrap_err();
    let second = parser.feed(b"<SSAP_message>", false).unwrap_err();
    assert_eq!(first, second);
    assert_eq!(parser.last_consumed(), 0);
  }

  #[test]
  fn trailing_bytes_are_left_for_the_next_message() {
    let first = build_leave_request(&env()).unwrap();
    let second = build_join_request(&env(), Some("secret")).unwrap();
    let mut stream = first.to_vec();
    stream.extend_from_slice(&second);

    let mut parser = Parser::new();
    assert_eq!(parser.feed(&stream, false).unwrap(), ParseStatus::Ok);
    assert_eq!(parser.last_consumed(), first.len());
    assert_eq!(parser.feed(b"more", false).unwrap(), ParseStatus::Ok);
    assert_eq!(parser.last_consumed(), 0);

    let msg = parse_message(&stream[first.len()..]).unwrap();
    assert_eq!(msg.msg_name, Some(MessageName::Join));
    assert_eq!(msg.credentials.as_deref(), Some("secret"));
  }

  #[test]
  fn legacy_element_names_are_accepted() {
    let doc = b"<?xml version=\"1.0\"?>\n<SSAP_message>\n  \
      <transaction_type>QUERY</transaction_type>\n  \
      <message_type>REQUEST</message_type>\n  \
      <message_number>42</message_number>\n</SSAP_message>";
    let msg = parse_message(doc).unwrap();
    assert_eq!(msg.msg_name, Some(MessageName::Query));
    assert_eq!(msg.msg_number, 42);
  }

  proptest! {
    #[test]
    fn any_segmentation_decodes_identically(
      mut cuts in proptest::collection::vec(0usize..1000, 0..12),
      literal in "[ -~]{0,40}",
    ) {
      let graph = format!("<triple_list><object>{literal}]]>{literal}</object></triple_list>");
      let bytes = build_subscribe_confirm(
        &env(),
        ResponseStatus::Ok,
        "sub-9",
        &graph,
      ).unwrap();
      let whole = parse_message(&bytes).unwrap();

      cuts.iter_mut().for_each(|c| *c %= bytes.len() + 1);
      cuts.sort_unstable();
      let mut parser = Parser::new();
      let mut start = 0;
      for cut in cuts {
        parser.feed(&bytes[start..cut], false).unwrap();
        start = cut;
      }
      parser.feed(&bytes[start..], true).unwrap();
      prop_assert_eq!(parser.finish().unwrap(), whole);
    }
  }
}
