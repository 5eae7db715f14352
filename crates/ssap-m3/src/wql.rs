//! WQL path-query descriptors and their answers.
//!
//! Each query shape is a fixed skeleton around one to three `<node>` elements:
//!
//! ```text
//! <wql_values><start><node>…</node></start><path_expression>…</path_expression></wql_values>
//! <wql_nodetypes><node>…</node></wql_nodetypes>
//! <wql_related><start>…</start><end>…</end><path_expression>…</path_expression></wql_related>
//! <wql_istype><node>…</node><type><node>…</node></type></wql_istype>
//! <wql_issubtype><subtype>…</subtype><supertype>…</supertype></wql_issubtype>
//! ```
//!
//! A literal node is written `<node name="literal">`. Values and node-type
//! queries are answered with a `<node_list>`, the others with `TRUE`/`FALSE`.

use quick_xml::{Reader, events::Event};
use ssap_core::{NodeType, PathNode, QueryStyle};
use ssap_wire::Buffer;

use crate::{
  error::{Error, Result},
  local_name,
  namespace::NamespaceMap,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WqlQuery {
  Values { start: PathNode, path: String },
  NodeTypes { node: PathNode },
  Related { start: PathNode, end: PathNode, path: String },
  IsType { node: PathNode, type_node: PathNode },
  IsSubType { subtype: PathNode, supertype: PathNode },
}

impl WqlQuery {
  /// The `type` parameter value announcing this query.
  pub fn style(&self) -> QueryStyle {
    match self {
      WqlQuery::Values { .. } => QueryStyle::WqlValues,
      WqlQuery::NodeTypes { .. } => QueryStyle::WqlNodeTypes,
      WqlQuery::Related { .. } => QueryStyle::WqlRelated,
      WqlQuery::IsType { .. } => QueryStyle::WqlIsType,
      WqlQuery::IsSubType { .. } => QueryStyle::WqlIsSubType,
    }
  }

  fn root(&self) -> &'static str {
    match self {
      WqlQuery::Values { .. } => "wql_values",
      WqlQuery::NodeTypes { .. } => "wql_nodetypes",
      WqlQuery::Related { .. } => "wql_related",
      WqlQuery::IsType { .. } => "wql_istype",
      WqlQuery::IsSubType { .. } => "wql_issubtype",
    }
  }
}

// ─── Generation ──────────────────────────────────────────────────────────────

fn write_node(buf: &mut Buffer, node: &PathNode, ns: &NamespaceMap) -> Result<()> {
  match node.node_type {
    NodeType::Uri if !node.value.is_empty() => {
      buf.append_open("node", None, Some(ns.collapse(&node.value).as_str()), true)?
    }
    NodeType::Literal => {
      buf.append_open("node", Some(("name", "literal")), None, false)?;
      buf.append_cdata(&node.value)?;
      buf.append_close("node")?;
    }
    _ => {
      return Err(Error::Core(ssap_core::Error::InvalidParameter(format!(
        "{:?} is not a URI or literal node",
        node.value
      ))));
    }
  }
  Ok(())
}

fn write_wrapped(
  buf: &mut Buffer,
  element: &str,
  node: &PathNode,
  ns: &NamespaceMap,
) -> Result<()> {
  buf.append_open(element, None, Some(""), false)?;
  write_node(buf, node, ns)?;
  buf.append_close(element)?;
  Ok(())
}

fn write_path(buf: &mut Buffer, path: &str) -> Result<()> {
  buf.append_open("path_expression", None, None, false)?;
  buf.append_cdata(path)?;
  buf.append_close("path_expression")?;
  Ok(())
}

/// Encode a WQL query descriptor, collapsing node URIs through `ns`.
pub fn generate_wql(query: &WqlQuery, ns: &NamespaceMap) -> Result<String> {
  let mut buf = Buffer::new();
  let root = query.root();
  buf.append_open(root, None, Some(""), false)?;
  match query {
    WqlQuery::Values { start, path } => {
      write_wrapped(&mut buf, "start", start, ns)?;
      write_path(&mut buf, path)?;
    }
    WqlQuery::NodeTypes { node } => write_node(&mut buf, node, ns)?,
    WqlQuery::Related { start, end, path } => {
      write_wrapped(&mut buf, "start", start, ns)?;
      write_wrapped(&mut buf, "end", end, ns)?;
      write_path(&mut buf, path)?;
    }
    WqlQuery::IsType { node, type_node } => {
      write_node(&mut buf, node, ns)?;
      write_wrapped(&mut buf, "type", type_node, ns)?;
    }
    WqlQuery::IsSubType { subtype, supertype } => {
      write_wrapped(&mut buf, "subtype", subtype, ns)?;
      write_wrapped(&mut buf, "supertype", supertype, ns)?;
    }
  }
  buf.append_close(root)?;
  Ok(buf.finish_string()?)
}

pub fn generate_node_list(nodes: &[PathNode], ns: &NamespaceMap) -> Result<String> {
  let mut buf = Buffer::new();
  buf.append_open("node_list", None, Some(""), false)?;
  for node in nodes {
    write_node(&mut buf, node, ns)?;
  }
  buf.append_close("node_list")?;
  Ok(buf.finish_string()?)
}

pub fn generate_boolean(value: bool) -> &'static str {
  if value { "TRUE" } else { "FALSE" }
}

// ─── Parsing ─────────────────────────────────────────────────────────────────

/// Flat view of a node document: the root element, every `<node>` tagged with
/// the wrapper it sits in, and the path expression if any.
#[derive(Debug, Default)]
struct NodeDocument {
  root:  String,
  nodes: Vec<(Option<String>, PathNode)>,
  path:  Option<String>,
}

impl NodeDocument {
  fn take(&mut self, wrapper: Option<&str>) -> Result<PathNode> {
    let idx = self
      .nodes
      .iter()
      .position(|(w, _)| w.as_deref() == wrapper)
      .ok_or(Error::Incomplete("WQL node"))?;
    Ok(self.nodes.remove(idx).1)
  }

  fn path(&mut self) -> Result<String> {
    self.path.take().ok_or(Error::Incomplete("WQL path expression"))
  }
}

enum Capture {
  None,
  Node(NodeType),
  Path,
}

fn read_document(xml: &str, ns: &NamespaceMap) -> Result<NodeDocument> {
  let mut reader = Reader::from_reader(xml.as_bytes());
  let mut doc = NodeDocument::default();
  let mut wrapper: Option<String> = None;
  let mut capture = Capture::None;
  let mut text = String::new();
  let mut depth = 0usize;
  let mut buf = Vec::new();

  loop {
    match reader.read_event_into(&mut buf)? {
      Event::Start(ref e) => {
        let name = String::from_utf8_lossy(local_name(e.name().as_ref())).into_owned();
        depth += 1;
        text.clear();
        if depth == 1 {
          doc.root = name;
        } else if name == "node" {
          let mut node_type = NodeType::Uri;
          for attr in e.attributes() {
            let attr = attr?;
            if attr.key.as_ref() == b"name"
              && attr.unescape_value()?.eq_ignore_ascii_case("literal")
            {
              node_type = NodeType::Literal;
            }
          }
          capture = Capture::Node(node_type);
        } else if name == "path_expression" {
          capture = Capture::Path;
        } else if depth == 2 {
          wrapper = Some(name);
        } else {
          return Err(Error::UnexpectedElement(name));
        }
      }
      Event::Empty(ref e) => {
        let name = String::from_utf8_lossy(local_name(e.name().as_ref())).into_owned();
        if depth == 0 {
          doc.root = name;
        }
      }
      Event::Text(ref e) => {
        if !matches!(capture, Capture::None) {
          text.push_str(&e.unescape()?);
        }
      }
      Event::CData(ref e) => {
        if !matches!(capture, Capture::None) {
          text.push_str(std::str::from_utf8(e)?);
        }
      }
      Event::End(_) => {
        depth = depth.saturating_sub(1);
        match std::mem::replace(&mut capture, Capture::None) {
          Capture::Node(NodeType::Literal) => {
            doc.nodes.push((wrapper.clone(), PathNode::literal(std::mem::take(&mut text))));
          }
          Capture::Node(_) => {
            let uri = ns.expand(text.trim());
            text.clear();
            doc.nodes.push((wrapper.clone(), PathNode::uri(uri)));
          }
          Capture::Path => doc.path = Some(std::mem::take(&mut text)),
          Capture::None if depth == 1 => wrapper = None,
          Capture::None => {}
        }
      }
      Event::Eof => break,
      _ => {}
    }
    buf.clear();
  }
  Ok(doc)
}

/// Decode a WQL query descriptor, expanding prefixed node URIs through `ns`.
pub fn parse_wql(xml: &str, ns: &NamespaceMap) -> Result<WqlQuery> {
  let mut doc = read_document(xml, ns)?;
  let query = match doc.root.as_str() {
    "wql_values" => WqlQuery::Values { start: doc.take(Some("start"))?, path: doc.path()? },
    "wql_nodetypes" => WqlQuery::NodeTypes { node: doc.take(None)? },
    "wql_related" => WqlQuery::Related {
      start: doc.take(Some("start"))?,
      end:   doc.take(Some("end"))?,
      path:  doc.path()?,
    },
    "wql_istype" => WqlQuery::IsType {
      node:      doc.take(None)?,
      type_node: doc.take(Some("type"))?,
    },
    "wql_issubtype" => WqlQuery::IsSubType {
      subtype:   doc.take(Some("subtype"))?,
      supertype: doc.take(Some("supertype"))?,
    },
    other => return Err(Error::UnexpectedElement(other.to_string())),
  };
  Ok(query)
}

pub fn parse_node_list(xml: &str, ns: &NamespaceMap) -> Result<Vec<PathNode>> {
  let doc = read_document(xml, ns)?;
  if doc.root != "node_list" {
    return Err(Error::UnexpectedElement(doc.root));
  }
  Ok(doc.nodes.into_iter().map(|(_, node)| node).collect())
}

pub fn parse_boolean(text: &str) -> Result<bool> {
  let text = text.trim();
  if text.eq_ignore_ascii_case("TRUE") {
    Ok(true)
  } else if text.eq_ignore_ascii_case("FALSE") {
    Ok(false)
  } else {
    Err(Error::Core(ssap_core::Error::Parse(format!(
      "{text:?} is not a boolean result"
    ))))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn all_shapes() -> Vec<WqlQuery> {
    let a = PathNode::uri("http://example.org/a");
    let b = PathNode::uri("http://example.org/b");
    vec![
      WqlQuery::Values { start: a.clone(), path: "['seq', ex:p, ['rep*', ex:q]]".into() },
      WqlQuery::NodeTypes { node: PathNode::literal("x < y") },
      WqlQuery::Related { start: a.clone(), end: b.clone(), path: "ex:p".into() },
      WqlQuery::IsType { node: a.clone(), type_node: b.clone() },
      WqlQuery::IsSubType { subtype: a, supertype: b },
    ]
  }

  #[test]
  fn every_shape_decodes_back() {
    for query in all_shapes() {
      let xml = generate_wql(&query, &NamespaceMap::new()).unwrap();
      assert_eq!(parse_wql(&xml, &NamespaceMap::new()).unwrap(), query, "{xml}");
    }
  }

  #[test]
  fn skeleton_is_fixed() {
    let query = WqlQuery::IsType {
      node:      PathNode::uri("urn:a"),
      type_node: PathNode::uri("urn:T"),
    };
    assert_eq!(
      generate_wql(&query, &NamespaceMap::new()).unwrap(),
      "<wql_istype><node>urn:a</node><type><node>urn:T</node></type></wql_istype>"
    );
    assert_eq!(query.style(), QueryStyle::WqlIsType);
  }

  #[test]
  fn variables_are_not_wql_nodes() {
    let query = WqlQuery::NodeTypes { node: PathNode::variable("x") };
    assert!(matches!(
      generate_wql(&query, &NamespaceMap::new()),
      Err(Error::Core(ssap_core::Error::InvalidParameter(_)))
    ));
  }

  #[test]
  fn prefixed_nodes_are_expanded() {
    let mut ns = NamespaceMap::new();
    ns.insert("ex", "http://example.org/");
    let xml = "<wql_nodetypes><node>ex:a</node></wql_nodetypes>";
    assert_eq!(
      parse_wql(xml, &ns).unwrap(),
      WqlQuery::NodeTypes { node: PathNode::uri("http://example.org/a") }
    );
  }

  #[test]
  fn node_uris_are_collapsed_on_the_way_out() {
    let mut ns = NamespaceMap::new();
    ns.insert("ex", "http://example.org/");
    let query = WqlQuery::IsType {
      node:      PathNode::uri("http://example.org/a"),
      type_node: PathNode::uri("urn:other:T"),
    };
    let xml = generate_wql(&query, &ns).unwrap();
    assert!(xml.contains("<node>ex:a</node>"), "{xml}");
    assert!(xml.contains("<node>urn:other:T</node>"), "{xml}");
    assert_eq!(parse_wql(&xml, &ns).unwrap(), query);
  }

  #[test]
  fn missing_wrapper_is_incomplete() {
    let xml = "<wql_related><start><node>urn:a</node></start></wql_related>";
    assert!(matches!(
      parse_wql(xml, &NamespaceMap::new()),
      Err(Error::Incomplete(_))
    ));
  }

  #[test]
  fn node_list_mixes_uris_and_literals() {
    let nodes = vec![PathNode::uri("urn:a"), PathNode::literal("hello")];
    let xml = generate_node_list(&nodes, &NamespaceMap::new()).unwrap();
    assert_eq!(
      xml,
      r#"<node_list><node>urn:a</node><node name="literal"><![CDATA[hello]]></node></node_list>"#
    );
    assert_eq!(parse_node_list(&xml, &NamespaceMap::new()).unwrap(), nodes);
    assert!(parse_node_list("<node_list/>", &NamespaceMap::new()).unwrap().is_empty());
  }

  #[test]
  fn booleans() {
    assert!(parse_boolean(" TRUE ").unwrap());
    assert!(!parse_boolean("false").unwrap());
    assert!(parse_boolean("maybe").is_err());
    assert_eq!(generate_boolean(true), "TRUE");
  }
}
