//! RDF triples and path nodes as exchanged with the SIB.
//!
//! Values are kept as opaque strings; namespace expansion and blank-node
//! bookkeeping belong to the graph codec.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Full URI of the "match anything" sentinel.
pub const ANY: &str = "http://www.nokia.com/NRC/M3/sib#any";

/// Prefixed spelling of [`ANY`] used on the wire.
pub const ANY_SHORT: &str = "sib:any";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
  Uri,
  Literal,
  /// A blank node in graphs; a query variable in SPARQL patterns.
  #[serde(rename = "bnode")]
  BlankNode,
}

// ─── Triple ──────────────────────────────────────────────────────────────────

/// An RDF statement. The predicate is always a URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
  pub subject:      String,
  pub predicate:    String,
  pub object:       String,
  pub subject_type: NodeType,
  pub object_type:  NodeType,
}

impl Triple {
  pub fn new(
    subject: impl Into<String>,
    subject_type: NodeType,
    predicate: impl Into<String>,
    object: impl Into<String>,
    object_type: NodeType,
  ) -> Self {
    Self {
      subject: subject.into(),
      predicate: predicate.into(),
      object: object.into(),
      subject_type,
      object_type,
    }
  }

  /// A triple whose subject and object are both URIs.
  pub fn uris(
    subject: impl Into<String>,
    predicate: impl Into<String>,
    object: impl Into<String>,
  ) -> Self {
    Self::new(subject, NodeType::Uri, predicate, object, NodeType::Uri)
  }

  /// A triple with a URI subject and a literal object.
  pub fn literal(
    subject: impl Into<String>,
    predicate: impl Into<String>,
    object: impl Into<String>,
  ) -> Self {
    Self::new(subject, NodeType::Uri, predicate, object, NodeType::Literal)
  }

  pub fn has_wildcard(&self) -> bool {
    is_wildcard(&self.subject, self.subject_type)
      || is_wildcard(&self.predicate, NodeType::Uri)
      || is_wildcard(&self.object, self.object_type)
  }

  /// Check a triple that is about to be asserted (insert, or the insert half
  /// of an update). Wildcards are rejected everywhere.
  pub fn validate_asserted(&self) -> Result<()> {
    self.validate_common()?;
    if self.has_wildcard() {
      return Err(Error::InvalidParameter(
        "wildcard in an asserted triple".into(),
      ));
    }
    Ok(())
  }

  /// Check a triple used as a query or removal template. Wildcards are
  /// allowed in subject and object position.
  pub fn validate_template(&self) -> Result<()> { self.validate_common() }

  fn validate_common(&self) -> Result<()> {
    if self.predicate.is_empty() {
      return Err(Error::InvalidParameter("empty predicate".into()));
    }
    if is_wildcard(&self.predicate, NodeType::Uri) {
      return Err(Error::InvalidParameter("wildcard predicate".into()));
    }
    if self.subject_type == NodeType::Literal {
      return Err(Error::InvalidParameter("literal subject".into()));
    }
    if self.subject.is_empty() {
      return Err(Error::InvalidParameter("empty subject".into()));
    }
    Ok(())
  }
}

/// True when `value` is the wildcard sentinel in either spelling. Literals
/// are never wildcards.
pub fn is_wildcard(value: &str, node_type: NodeType) -> bool {
  node_type != NodeType::Literal && (value == ANY || value == ANY_SHORT)
}

// ─── PathNode ────────────────────────────────────────────────────────────────

/// A node in a WQL path query or a SPARQL pattern.
///
/// `BlankNode` marks a query variable; its value is the variable name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathNode {
  pub value:     String,
  pub node_type: NodeType,
}

impl PathNode {
  pub fn uri(value: impl Into<String>) -> Self {
    Self { value: value.into(), node_type: NodeType::Uri }
  }

  pub fn literal(value: impl Into<String>) -> Self {
    Self { value: value.into(), node_type: NodeType::Literal }
  }

  pub fn variable(name: impl Into<String>) -> Self {
    Self { value: value_of(name), node_type: NodeType::BlankNode }
  }

  pub fn is_variable(&self) -> bool { self.node_type == NodeType::BlankNode }
}

fn value_of(name: impl Into<String>) -> String {
  let name = name.into();
  match name.strip_prefix('?') {
    Some(stripped) => stripped.to_string(),
    None => name,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn asserted_triple_rejects_wildcards() {
    let t = Triple::uris("urn:a", "urn:p", ANY_SHORT);
    assert!(t.validate_template().is_ok());
    assert!(matches!(t.validate_asserted(), Err(Error::InvalidParameter(_))));
  }

  #[test]
  fn wildcard_predicate_is_never_valid() {
    let t = Triple::uris("urn:a", ANY, "urn:b");
    assert!(t.validate_template().is_err());
  }

  #[test]
  fn literal_wildcard_spelling_is_just_text() {
    let t = Triple::literal("urn:a", "urn:p", "sib:any");
    assert!(!t.has_wildcard());
    assert!(t.validate_asserted().is_ok());
  }

  #[test]
  fn variable_strips_question_mark() {
    assert_eq!(PathNode::variable("?x").value, "x");
    assert!(PathNode::variable("x").is_variable());
  }
}
