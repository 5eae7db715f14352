//! SPARQL SELECT text and SPARQL Query Results XML.
//!
//! Patterns are built from [`PathNode`]s: URIs are written prefixed where the
//! namespace map allows it and bracketed otherwise, literals are quoted, and
//! variable-typed nodes become `?name`.

use std::fmt::Write as _;

use quick_xml::{Reader, events::Event};
use serde::Serialize;
use ssap_core::{ANY, ANY_SHORT, NodeType, PathNode};
use ssap_wire::Buffer;

use crate::{
  error::{Error, Result},
  local_name,
  namespace::NamespaceMap,
};

pub const RESULTS_NAMESPACE: &str = "http://www.w3.org/2005/sparql-results#";

/// One `subject predicate object` pattern of a WHERE or OPTIONAL block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriplePattern {
  pub subject:   PathNode,
  pub predicate: PathNode,
  pub object:    PathNode,
}

impl TriplePattern {
  pub fn new(subject: PathNode, predicate: PathNode, object: PathNode) -> Self {
    Self { subject, predicate, object }
  }
}

// ─── Query text ──────────────────────────────────────────────────────────────

fn invalid_term(msg: String) -> Error {
  Error::Core(ssap_core::Error::InvalidTripleSpecification(msg))
}

fn is_safe_local(local: &str) -> bool {
  !local.is_empty()
    && !local.ends_with('.')
    && local.chars().all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
    && !local.starts_with(['-', '.'])
}

fn write_uri(out: &mut String, uri: &str, ns: &NamespaceMap) -> Result<()> {
  if uri.is_empty() || uri == ANY || uri == ANY_SHORT {
    return Err(invalid_term(format!("{uri:?} cannot appear in a pattern")));
  }
  let forbidden = |c: char| {
    c.is_whitespace() || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\')
  };
  if uri.chars().any(forbidden) {
    return Err(invalid_term(format!("{uri:?} is not a valid IRI")));
  }
  match ns.split(uri) {
    Some((prefix, local)) if is_safe_local(local) => {
      let _ = write!(out, "{prefix}:{local}");
    }
    _ => {
      let _ = write!(out, "<{uri}>");
    }
  }
  Ok(())
}

fn write_literal(out: &mut String, value: &str) {
  out.push('"');
  for c in value.chars() {
    match c {
      '"' => out.push_str("\\\""),
      '\\' => out.push_str("\\\\"),
      '\n' => out.push_str("\\n"),
      '\r' => out.push_str("\\r"),
      '\t' => out.push_str("\\t"),
      c => out.push(c),
    }
  }
  out.push('"');
}

fn write_variable(out: &mut String, name: &str) -> Result<()> {
  if name.is_empty() {
    return Err(invalid_term("empty variable name".into()));
  }
  out.push('?');
  out.push_str(name);
  Ok(())
}

fn write_term(
  out: &mut String,
  node: &PathNode,
  literal_allowed: bool,
  ns: &NamespaceMap,
) -> Result<()> {
  match node.node_type {
    NodeType::Uri => write_uri(out, &node.value, ns),
    NodeType::BlankNode => write_variable(out, &node.value),
    NodeType::Literal if literal_allowed => {
      write_literal(out, &node.value);
      Ok(())
    }
    NodeType::Literal => {
      Err(invalid_term(format!("literal {:?} in subject or predicate", node.value)))
    }
  }
}

fn write_pattern(
  out: &mut String,
  indent: &str,
  pattern: &TriplePattern,
  ns: &NamespaceMap,
) -> Result<()> {
  out.push_str(indent);
  write_term(out, &pattern.subject, false, ns)?;
  out.push(' ');
  write_term(out, &pattern.predicate, false, ns)?;
  out.push(' ');
  write_term(out, &pattern.object, true, ns)?;
  out.push_str(" .\n");
  Ok(())
}

/// Build a SPARQL SELECT query.
///
/// Every namespace entry becomes a `PREFIX` line. An empty `select_vars`
/// selects `*`; otherwise each entry must be a named variable node.
pub fn generate_sparql_select(
  select_vars: &[PathNode],
  where_patterns: &[TriplePattern],
  optional_groups: &[Vec<TriplePattern>],
  ns: &NamespaceMap,
) -> Result<String> {
  let mut out = String::new();
  for (prefix, uri) in ns.iter() {
    let _ = writeln!(out, "PREFIX {prefix}: <{uri}>");
  }

  out.push_str("SELECT");
  if select_vars.is_empty() {
    out.push_str(" *");
  }
  for var in select_vars {
    if !var.is_variable() || var.value.is_empty() {
      return Err(Error::Core(ssap_core::Error::InvalidParameter(format!(
        "{:?} is not a query variable",
        var.value
      ))));
    }
    out.push(' ');
    write_variable(&mut out, &var.value)?;
  }

  out.push_str("\nWHERE {\n");
  for pattern in where_patterns {
    write_pattern(&mut out, "  ", pattern, ns)?;
  }
  for group in optional_groups {
    out.push_str("  OPTIONAL {\n");
    for pattern in group {
      write_pattern(&mut out, "    ", pattern, ns)?;
    }
    out.push_str("  }\n");
  }
  out.push('}');
  Ok(out)
}

// ─── Results XML ─────────────────────────────────────────────────────────────

/// A decoded SELECT answer. Rows follow the `variables` order; unbound cells
/// are `None`. Blank-node bindings use [`NodeType::BlankNode`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectResults {
  pub variables: Vec<String>,
  pub rows:      Vec<Vec<Option<PathNode>>>,
}

impl SelectResults {
  pub fn get(&self, row: usize, variable: &str) -> Option<&PathNode> {
    let column = self.variables.iter().position(|v| v == variable)?;
    self.rows.get(row)?.get(column)?.as_ref()
  }
}

pub fn generate_sparql_results(results: &SelectResults) -> Result<String> {
  let mut buf = Buffer::new();
  buf.append_open("sparql", Some(("xmlns", RESULTS_NAMESPACE)), Some(""), false)?;
  buf.append_open("head", None, Some(""), false)?;
  for var in &results.variables {
    buf.append_open("variable", Some(("name", var)), None, false)?;
    buf.append_close("variable")?;
  }
  buf.append_close("head")?;
  buf.append_open("results", None, Some(""), false)?;
  for row in &results.rows {
    buf.append_open("result", None, Some(""), false)?;
    for (var, cell) in results.variables.iter().zip(row) {
      let Some(node) = cell else { continue };
      let element = match node.node_type {
        NodeType::Uri => "uri",
        NodeType::Literal => "literal",
        NodeType::BlankNode => "bnode",
      };
      buf.append_open("binding", Some(("name", var)), Some(""), false)?;
      buf.append_open(element, None, Some(&node.value), true)?;
      buf.append_close("binding")?;
    }
    buf.append_close("result")?;
  }
  buf.append_close("results")?;
  buf.append_close("sparql")?;
  Ok(buf.finish_string()?)
}

fn name_attribute(e: &quick_xml::events::BytesStart<'_>) -> Result<Option<String>> {
  for attr in e.attributes() {
    let attr = attr?;
    if attr.key.as_ref() == b"name" {
      return Ok(Some(attr.unescape_value()?.into_owned()));
    }
  }
  Ok(None)
}

fn term_type(name: &[u8]) -> Option<NodeType> {
  match name {
    b"uri" => Some(NodeType::Uri),
    b"literal" => Some(NodeType::Literal),
    b"bnode" => Some(NodeType::BlankNode),
    _ => None,
  }
}

pub fn parse_sparql_results(xml: &str) -> Result<SelectResults> {
  let mut reader = Reader::from_reader(xml.as_bytes());
  let mut results = SelectResults::default();
  let mut row: Option<Vec<Option<PathNode>>> = None;
  let mut binding: Option<usize> = None;
  let mut term: Option<NodeType> = None;
  let mut text = String::new();
  let mut buf = Vec::new();

  loop {
    match reader.read_event_into(&mut buf)? {
      Event::Empty(ref e) => {
        let name = e.name();
        let local = local_name(name.as_ref());
        if local == b"variable" {
          if let Some(var) = name_attribute(e)? {
            results.variables.push(var);
          }
        } else if local == b"result" {
          results.rows.push(vec![None; results.variables.len()]);
        } else if let (Some(node_type), Some(column), Some(cells)) =
          (term_type(local), binding, row.as_mut())
        {
          cells[column] = Some(PathNode { value: String::new(), node_type });
        }
      }
      Event::Start(ref e) => {
        let name = e.name();
        let local = local_name(name.as_ref());
        match local {
          b"variable" => {
            if let Some(var) = name_attribute(e)? {
              results.variables.push(var);
            }
          }
          b"result" => row = Some(vec![None; results.variables.len()]),
          b"binding" => {
            let var = name_attribute(e)?.ok_or(Error::Incomplete("binding name"))?;
            let column = results
              .variables
              .iter()
              .position(|v| *v == var)
              .ok_or_else(|| {
                Error::Core(ssap_core::Error::Parse(format!("unknown variable {var}")))
              })?;
            binding = Some(column);
          }
          other => {
            if let Some(node_type) = term_type(other) {
              term = Some(node_type);
              text.clear();
            }
          }
        }
      }
      Event::Text(ref e) if term.is_some() => text.push_str(&e.unescape()?),
      Event::CData(ref e) if term.is_some() => text.push_str(std::str::from_utf8(e)?),
      Event::End(ref e) => {
        let name = e.name();
        match local_name(name.as_ref()) {
          b"result" => {
            if let Some(cells) = row.take() {
              results.rows.push(cells);
            }
          }
          b"binding" => binding = None,
          other if term_type(other).is_some() => {
            if let (Some(node_type), Some(column), Some(cells)) =
              (term.take(), binding, row.as_mut())
            {
              let value = std::mem::take(&mut text);
              let value = if node_type == NodeType::Literal {
                value
              } else {
                value.trim().to_string()
              };
              cells[column] = Some(PathNode { value, node_type });
            }
          }
          _ => {}
        }
      }
      Event::Eof => break,
      _ => {}
    }
    buf.clear();
  }
  Ok(results)
}
