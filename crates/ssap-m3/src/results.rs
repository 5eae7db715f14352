//! Query and subscription results, decoded by query style.

use serde::Serialize;
use ssap_core::{PathNode, QueryStyle, Triple};

use crate::{
  error::Result,
  namespace::NamespaceMap,
  sparql::{SelectResults, parse_sparql_results},
  triples::parse_triples,
  wql::{parse_boolean, parse_node_list},
};

/// The shape of results a query style produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
  Triples,
  Nodes,
  Boolean,
  Select,
  Text,
}

impl From<QueryStyle> for ResultKind {
  fn from(style: QueryStyle) -> Self {
    match style {
      QueryStyle::Template => ResultKind::Triples,
      QueryStyle::WqlValues | QueryStyle::WqlNodeTypes => ResultKind::Nodes,
      QueryStyle::WqlRelated | QueryStyle::WqlIsType | QueryStyle::WqlIsSubType => {
        ResultKind::Boolean
      }
      QueryStyle::Sparql => ResultKind::Select,
      QueryStyle::N3 => ResultKind::Text,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum QueryResults {
  Triples(Vec<Triple>),
  Nodes(Vec<PathNode>),
  Boolean(bool),
  Select(SelectResults),
  Text(String),
}

impl QueryResults {
  pub fn kind(&self) -> ResultKind {
    match self {
      QueryResults::Triples(_) => ResultKind::Triples,
      QueryResults::Nodes(_) => ResultKind::Nodes,
      QueryResults::Boolean(_) => ResultKind::Boolean,
      QueryResults::Select(_) => ResultKind::Select,
      QueryResults::Text(_) => ResultKind::Text,
    }
  }

  /// The empty answer of `kind`, used when a result parameter is absent.
  pub fn empty(kind: ResultKind) -> Self {
    match kind {
      ResultKind::Triples => QueryResults::Triples(Vec::new()),
      ResultKind::Nodes => QueryResults::Nodes(Vec::new()),
      ResultKind::Boolean => QueryResults::Boolean(false),
      ResultKind::Select => QueryResults::Select(SelectResults::default()),
      ResultKind::Text => QueryResults::Text(String::new()),
    }
  }
}

/// Decode a `results`, `new_results` or `obsolete_results` payload. Blank
/// text decodes to the empty answer.
pub fn decode_results(kind: ResultKind, text: &str, ns: &NamespaceMap) -> Result<QueryResults> {
  if text.trim().is_empty() {
    return Ok(QueryResults::empty(kind));
  }
  Ok(match kind {
    ResultKind::Triples => QueryResults::Triples(parse_triples(text, ns)?),
    ResultKind::Nodes => QueryResults::Nodes(parse_node_list(text, ns)?),
    ResultKind::Boolean => QueryResults::Boolean(parse_boolean(text)?),
    ResultKind::Select => QueryResults::Select(parse_sparql_results(text)?),
    ResultKind::Text => QueryResults::Text(text.to_string()),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::triples::generate_triple_list;

  #[test]
  fn style_selects_kind() {
    assert_eq!(ResultKind::from(QueryStyle::Template), ResultKind::Triples);
    assert_eq!(ResultKind::from(QueryStyle::WqlValues), ResultKind::Nodes);
    assert_eq!(ResultKind::from(QueryStyle::WqlIsSubType), ResultKind::Boolean);
    assert_eq!(ResultKind::from(QueryStyle::Sparql), ResultKind::Select);
    assert_eq!(ResultKind::from(QueryStyle::N3), ResultKind::Text);
  }

  #[test]
  fn triples_decode() {
    let ns = NamespaceMap::new();
    let triples = vec![Triple::uris("urn:s", "urn:p", "urn:o")];
    let xml = generate_triple_list(&triples, &ns).unwrap();
    let decoded = decode_results(ResultKind::Triples, &xml, &ns).unwrap();
    assert_eq!(decoded, QueryResults::Triples(triples));
  }

  #[test]
  fn blank_payload_is_empty_answer() {
    let decoded = decode_results(ResultKind::Nodes, "  ", &NamespaceMap::new()).unwrap();
    assert_eq!(decoded, QueryResults::Nodes(Vec::new()));
    assert_eq!(decoded.kind(), ResultKind::Nodes);
  }

  #[test]
  fn boolean_and_text() {
    let ns = NamespaceMap::new();
    assert_eq!(
      decode_results(ResultKind::Boolean, "TRUE", &ns).unwrap(),
      QueryResults::Boolean(true)
    );
    assert_eq!(
      decode_results(ResultKind::Text, "<a> <b> <c> .", &ns).unwrap(),
      QueryResults::Text("<a> <b> <c> .".into())
    );
  }

  #[test]
  fn malformed_payload_is_an_error() {
    assert!(decode_results(ResultKind::Triples, "<triple_list><triple>", &NamespaceMap::new()).is_err());
  }
}
