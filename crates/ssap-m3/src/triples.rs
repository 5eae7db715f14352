//! RDF-M3 triple lists.
//!
//! ```text
//! <triple_list xmlns:ex="http://example.org/">
//!   <triple>
//!     <subject type="uri">ex:alice</subject>
//!     <predicate>ex:knows</predicate>
//!     <object type="literal"><![CDATA[Bob]]></object>
//!   </triple>
//! </triple_list>
//! ```
//!
//! URIs are collapsed to prefixed form on output and expanded on input.
//! Literals are always written as CDATA. `type="bnode"` values are blank-node
//! labels: a client keeps them as-is, a server replaces each distinct label
//! with a fresh `urn:uuid:` URI and reports the table.

use std::{borrow::Cow, collections::BTreeMap};

use quick_xml::{
  Reader,
  events::{BytesStart, Event},
};
use ssap_core::{ANY, ANY_SHORT, NodeType, Triple};
use ssap_wire::Buffer;
use tracing::debug;
use uuid::Uuid;

use crate::{
  error::{Error, Result},
  local_name,
  namespace::NamespaceMap,
};

/// Which side of the protocol is decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
  /// Blank-node labels are opaque.
  #[default]
  Client,
  /// Blank-node labels are resolved to generated URIs.
  Server,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedGraph {
  pub triples: Vec<Triple>,
  /// Label → generated URI. Always empty in the client role.
  pub bnodes:  BTreeMap<String, String>,
}

// ─── Generation ──────────────────────────────────────────────────────────────

fn type_token(t: NodeType) -> &'static str {
  match t {
    NodeType::Uri => "uri",
    NodeType::Literal => "literal",
    NodeType::BlankNode => "bnode",
  }
}

fn write_node(
  buf: &mut Buffer,
  element: &str,
  value: &str,
  node_type: Option<NodeType>,
  ns: &NamespaceMap,
) -> Result<()> {
  let attr = node_type.map(|t| ("type", type_token(t)));
  match node_type {
    Some(NodeType::Literal) => {
      buf.append_open(element, attr, None, false)?;
      buf.append_cdata(value)?;
      buf.append_close(element)?;
    }
    Some(NodeType::BlankNode) => {
      buf.append_open(element, attr, Some(value), true)?;
    }
    Some(NodeType::Uri) | None => {
      let written = if value == ANY {
        Cow::Borrowed(ANY_SHORT)
      } else {
        Cow::Owned(ns.collapse(value))
      };
      buf.append_open(element, attr, Some(written.as_ref()), true)?;
    }
  }
  Ok(())
}

fn write_triple(buf: &mut Buffer, triple: &Triple, ns: &NamespaceMap) -> Result<()> {
  if triple.predicate.is_empty() {
    return Err(Error::Core(ssap_core::Error::InvalidParameter(
      "empty predicate".into(),
    )));
  }
  buf.append_open("triple", None, Some(""), false)?;
  write_node(buf, "subject", &triple.subject, Some(triple.subject_type), ns)?;
  write_node(buf, "predicate", &triple.predicate, None, ns)?;
  write_node(buf, "object", &triple.object, Some(triple.object_type), ns)?;
  buf.append_close("triple")?;
  Ok(())
}

/// Encode one `<triple>` element.
pub fn generate_triple_xml(triple: &Triple, ns: &NamespaceMap) -> Result<String> {
  let mut buf = Buffer::new();
  write_triple(&mut buf, triple, ns)?;
  Ok(buf.finish_string()?)
}

/// Encode a complete `<triple_list>`.
pub fn generate_triple_list(triples: &[Triple], ns: &NamespaceMap) -> Result<String> {
  let mut buf = Buffer::new();
  buf.append_open("triple_list", None, Some(""), false)?;
  for triple in triples {
    write_triple(&mut buf, triple, ns)?;
  }
  buf.append_close("triple_list")?;
  Ok(buf.finish_string()?)
}

// ─── Parsing ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
  Subject,
  Predicate,
  Object,
}

#[derive(Default)]
struct PartialTriple {
  subject:   Option<(String, NodeType)>,
  predicate: Option<String>,
  object:    Option<(String, NodeType)>,
}

impl PartialTriple {
  fn complete(self) -> Result<Triple> {
    let (subject, subject_type) =
      self.subject.ok_or(Error::Incomplete("triple: no subject"))?;
    let predicate = self.predicate.ok_or(Error::Incomplete("triple: no predicate"))?;
    let (object, object_type) =
      self.object.ok_or(Error::Incomplete("triple: no object"))?;
    Ok(Triple { subject, predicate, object, subject_type, object_type })
  }
}

fn parse_type(raw: Option<String>) -> Result<NodeType> {
  match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
    None | Some("uri") => Ok(NodeType::Uri),
    Some("literal") => Ok(NodeType::Literal),
    Some("bnode") => Ok(NodeType::BlankNode),
    Some(other) => Err(Error::Core(ssap_core::Error::Parse(format!(
      "unknown node type {other:?}"
    )))),
  }
}

struct GraphReader<'n> {
  ns:      Cow<'n, NamespaceMap>,
  role:    Role,
  bnodes:  BTreeMap<String, String>,
  triples: Vec<Triple>,
  current: Option<PartialTriple>,
  slot:    Option<(Slot, NodeType)>,
  text:    String,
}

impl GraphReader<'_> {
  fn resolve(&mut self, raw: &str, node_type: NodeType) -> (String, NodeType) {
    match node_type {
      NodeType::Literal => (raw.to_string(), NodeType::Literal),
      NodeType::Uri => match raw.trim() {
        ANY_SHORT => (ANY.to_string(), NodeType::Uri),
        uri => (self.ns.expand(uri), NodeType::Uri),
      },
      NodeType::BlankNode => {
        let label = raw.trim();
        match self.role {
          Role::Client => (label.to_string(), NodeType::BlankNode),
          Role::Server => {
            let uri = self
              .bnodes
              .entry(label.to_string())
              .or_insert_with(|| format!("urn:uuid:{}", Uuid::new_v4()))
              .clone();
            (uri, NodeType::Uri)
          }
        }
      }
    }
  }

  fn close_slot(&mut self) -> Result<()> {
    let Some((slot, node_type)) = self.slot.take() else {
      return Ok(());
    };
    let text = std::mem::take(&mut self.text);
    let resolved = self.resolve(&text, node_type);
    let current = self
      .current
      .as_mut()
      .ok_or_else(|| Error::UnexpectedElement("value outside <triple>".into()))?;
    match slot {
      Slot::Subject => current.subject = Some(resolved),
      Slot::Predicate => {
        if node_type != NodeType::Uri {
          return Err(Error::Core(ssap_core::Error::InvalidParameter(
            "predicate must be a URI".into(),
          )));
        }
        current.predicate = Some(resolved.0);
      }
      Slot::Object => current.object = Some(resolved),
    }
    Ok(())
  }

  fn open(&mut self, name: &[u8], type_attr: Option<String>) -> Result<()> {
    match name {
      b"triple_list" => {}
      b"triple" => self.current = Some(PartialTriple::default()),
      b"subject" => self.slot = Some((Slot::Subject, parse_type(type_attr)?)),
      b"predicate" => self.slot = Some((Slot::Predicate, parse_type(type_attr)?)),
      b"object" => self.slot = Some((Slot::Object, parse_type(type_attr)?)),
      other => {
        return Err(Error::UnexpectedElement(
          String::from_utf8_lossy(other).into_owned(),
        ));
      }
    }
    self.text.clear();
    Ok(())
  }

  fn start(&mut self, e: &BytesStart<'_>, is_empty: bool) -> Result<()> {
    let name = e.name();
    let local = local_name(name.as_ref());
    let mut type_attr = None;
    let mut declarations = Vec::new();
    for attr in e.attributes() {
      let attr = attr?;
      let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
      let value = attr.unescape_value()?.into_owned();
      if key == "type" {
        type_attr = Some(value);
      } else if key == "xmlns" || key.starts_with("xmlns:") {
        declarations.push((key, value));
      }
    }
    if local == b"triple_list" && !declarations.is_empty() {
      self.ns.to_mut().extend_from_attributes(
        declarations.iter().map(|(k, v)| (k.as_str(), v.as_str())),
      );
    }
    self.open(local, type_attr)?;
    if is_empty {
      self.close(local)?;
    }
    Ok(())
  }

  fn close(&mut self, name: &[u8]) -> Result<()> {
    match name {
      b"subject" | b"predicate" | b"object" => self.close_slot(),
      b"triple" => {
        let partial = self
          .current
          .take()
          .ok_or_else(|| Error::UnexpectedElement("triple".into()))?;
        self.triples.push(partial.complete()?);
        Ok(())
      }
      _ => Ok(()),
    }
  }
}

/// Decode a triple list in the client role.
pub fn parse_triples(xml: &str, ns: &NamespaceMap) -> Result<Vec<Triple>> {
  Ok(parse_graph(xml, ns, Role::Client)?.triples)
}

/// Decode a triple list. `xmlns` declarations on `<triple_list>` extend `ns`
/// for this document only.
pub fn parse_graph(xml: &str, ns: &NamespaceMap, role: Role) -> Result<ParsedGraph> {
  let mut reader = Reader::from_reader(xml.as_bytes());
  let mut graph = GraphReader {
    ns: Cow::Borrowed(ns),
    role,
    bnodes: BTreeMap::new(),
    triples: Vec::new(),
    current: None,
    slot: None,
    text: String::new(),
  };
  let mut buf = Vec::new();

  loop {
    match reader.read_event_into(&mut buf)? {
      Event::Start(ref e) => graph.start(e, false)?,
      Event::Empty(ref e) => graph.start(e, true)?,
      Event::Text(ref e) => {
        if graph.slot.is_some() {
          graph.text.push_str(&e.unescape()?);
        }
      }
      Event::CData(ref e) => {
        if graph.slot.is_some() {
          graph.text.push_str(std::str::from_utf8(e)?);
        }
      }
      Event::End(ref e) => {
        let name_buf = e.name();
        graph.close(local_name(name_buf.as_ref()))?;
      }
      Event::Eof => break,
      _ => {}
    }
    buf.clear();
  }

  if graph.current.is_some() {
    return Err(Error::Incomplete("triple list"));
  }
  debug!(
    triples = graph.triples.len(),
    bnodes = graph.bnodes.len(),
    "decoded triple list"
  );
  Ok(ParsedGraph { triples: graph.triples, bnodes: graph.bnodes })
}

// ─── Blank-node maps ─────────────────────────────────────────────────────────

/// Encode a label → URI table as `<urllist><uri tag="label">…</uri></urllist>`.
pub fn generate_bnode_map(bnodes: &BTreeMap<String, String>) -> Result<String> {
  let mut buf = Buffer::new();
  buf.append_open("urllist", None, Some(""), false)?;
  for (label, uri) in bnodes {
    buf.append_open("uri", Some(("tag", label)), Some(uri), true)?;
  }
  buf.append_close("urllist")?;
  Ok(buf.finish_string()?)
}

pub fn parse_bnode_map(xml: &str) -> Result<BTreeMap<String, String>> {
  let mut reader = Reader::from_reader(xml.as_bytes());
  let mut map = BTreeMap::new();
  let mut tag: Option<String> = None;
  let mut text = String::new();
  let mut buf = Vec::new();

  loop {
    match reader.read_event_into(&mut buf)? {
      Event::Start(ref e) if local_name(e.name().as_ref()) == b"uri" => {
        let mut label = None;
        for attr in e.attributes() {
          let attr = attr?;
          if attr.key.as_ref() == b"tag" {
            label = Some(attr.unescape_value()?.into_owned());
          }
        }
        tag = Some(label.ok_or(Error::Incomplete("uri without tag"))?);
        text.clear();
      }
      Event::Text(ref e) if tag.is_some() => text.push_str(&e.unescape()?),
      Event::End(ref e) if local_name(e.name().as_ref()) == b"uri" => {
        if let Some(label) = tag.take() {
          map.insert(label, text.trim().to_string());
        }
      }
      Event::Eof => break,
      _ => {}
    }
    buf.clear();
  }
  Ok(map)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::namespace::build_namespace_map;

  fn ns() -> NamespaceMap {
    build_namespace_map(r#"xmlns:ex="http://example.org/""#).unwrap()
  }

  #[test]
  fn triple_list_round_trips() {
    let ns = ns();
    let triples = vec![
      Triple::uris("http://example.org/alice", "http://example.org/knows", "http://example.org/bob"),
      Triple::literal("http://example.org/alice", "http://example.org/name", "Alice <A&B>"),
    ];
    let xml = generate_triple_list(&triples, &ns).unwrap();
    assert!(xml.contains("<subject type=\"uri\">ex:alice</subject>"));
    assert!(xml.contains("<![CDATA[Alice <A&B>]]>"));
    assert_eq!(parse_triples(&xml, &ns).unwrap(), triples);
  }

  #[test]
  fn literal_with_cdata_terminator_survives() {
    let ns = NamespaceMap::new();
    let triple = Triple::literal("urn:s", "urn:p", "x]]>y");
    let xml = generate_triple_xml(&triple, &ns).unwrap();
    let parsed = parse_triples(&format!("<triple_list>{xml}</triple_list>"), &ns).unwrap();
    assert_eq!(parsed, vec![triple]);
  }

  #[test]
  fn wildcard_is_written_short() {
    let triple = Triple::uris("urn:s", "urn:p", ANY);
    let xml = generate_triple_xml(&triple, &NamespaceMap::new()).unwrap();
    assert!(xml.contains("<object type=\"uri\">sib:any</object>"), "{xml}");
    let list = generate_triple_list(&[triple.clone()], &NamespaceMap::new()).unwrap();
    assert_eq!(parse_triples(&list, &NamespaceMap::new()).unwrap(), vec![triple]);
  }

  #[test]
  fn local_declarations_extend_the_map() {
    let xml = r#"<triple_list xmlns:foaf="http://xmlns.com/foaf/0.1/">
      <triple>
        <subject>ex:a</subject>
        <predicate>foaf:name</predicate>
        <object type="LITERAL">A</object>
      </triple>
    </triple_list>"#;
    let parsed = parse_triples(xml, &ns()).unwrap();
    assert_eq!(parsed, vec![Triple::literal(
      "http://example.org/a",
      "http://xmlns.com/foaf/0.1/name",
      "A"
    )]);
  }

  #[test]
  fn server_role_resolves_bnodes_consistently() {
    let xml = r#"<triple_list>
      <triple><subject type="bnode">b1</subject><predicate>urn:p</predicate><object type="bnode">b2</object></triple>
      <triple><subject type="bnode">b1</subject><predicate>urn:q</predicate><object type="literal">v</object></triple>
    </triple_list>"#;
    let graph = parse_graph(xml, &NamespaceMap::new(), Role::Server).unwrap();
    assert_eq!(graph.bnodes.len(), 2);
    let b1 = &graph.bnodes["b1"];
    assert!(b1.starts_with("urn:uuid:"));
    assert_eq!(&graph.triples[0].subject, b1);
    assert_eq!(&graph.triples[1].subject, b1);
    assert_eq!(graph.triples[0].subject_type, NodeType::Uri);
    assert_eq!(&graph.triples[0].object, &graph.bnodes["b2"]);
  }

  #[test]
  fn client_role_keeps_bnode_labels() {
    let xml = r#"<triple_list><triple><subject type="bnode">b1</subject><predicate>urn:p</predicate><object>urn:o</object></triple></triple_list>"#;
    let graph = parse_graph(xml, &NamespaceMap::new(), Role::Client).unwrap();
    assert!(graph.bnodes.is_empty());
    assert_eq!(graph.triples[0].subject, "b1");
    assert_eq!(graph.triples[0].subject_type, NodeType::BlankNode);
  }

  #[test]
  fn missing_object_is_incomplete() {
    let xml = "<triple_list><triple><subject>urn:s</subject><predicate>urn:p</predicate></triple></triple_list>";
    assert!(matches!(
      parse_triples(xml, &NamespaceMap::new()),
      Err(Error::Incomplete(_))
    ));
  }

  #[test]
  fn unknown_element_is_rejected() {
    let xml = "<triple_list><quad/></triple_list>";
    assert!(matches!(
      parse_triples(xml, &NamespaceMap::new()),
      Err(Error::UnexpectedElement(_))
    ));
  }

  #[test]
  fn bnode_map_round_trips() {
    let mut map = BTreeMap::new();
    map.insert("b1".to_string(), "urn:uuid:1".to_string());
    map.insert("b&2".to_string(), "urn:uuid:2".to_string());
    let xml = generate_bnode_map(&map).unwrap();
    assert!(xml.starts_with("<urllist><uri tag=\"b&amp;2\">"));
    assert_eq!(parse_bnode_map(&xml).unwrap(), map);
  }
}
