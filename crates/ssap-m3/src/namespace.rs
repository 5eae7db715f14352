//! Namespace prefix tables.
//!
//! A map is built once per operation from an `xmlns` declaration string such
//! as `xmlns="http://a#" xmlns:foaf="http://xmlns.com/foaf/0.1/"` and is only
//! read afterwards. The empty prefix is the default namespace.

use std::collections::BTreeMap;

use ssap_wire::scan::{Flow, Scanner, Sink, Tag};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceMap {
  entries: BTreeMap<String, String>,
}

impl NamespaceMap {
  pub fn new() -> Self { Self::default() }

  pub fn insert(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
    self.entries.insert(prefix.into(), uri.into());
  }

  pub fn get(&self, prefix: &str) -> Option<&str> {
    self.entries.get(prefix).map(String::as_str)
  }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  pub fn len(&self) -> usize { self.entries.len() }

  /// `(prefix, uri)` pairs in prefix order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.entries.iter().map(|(p, u)| (p.as_str(), u.as_str()))
  }

  /// Record every `xmlns` / `xmlns:p` attribute of `attributes`. Other
  /// attributes are ignored.
  pub fn extend_from_attributes<'a>(
    &mut self,
    attributes: impl IntoIterator<Item = (&'a str, &'a str)>,
  ) {
    for (name, value) in attributes {
      if name == "xmlns" {
        self.insert("", value);
      } else if let Some(prefix) = name.strip_prefix("xmlns:") {
        self.insert(prefix, value);
      }
    }
  }

  /// Expand `prefix:local` (or a bare name, against the default namespace)
  /// into a full URI. Values with no matching prefix are returned unchanged.
  pub fn expand(&self, value: &str) -> String {
    match value.split_once(':') {
      Some((prefix, local)) if !prefix.is_empty() => match self.get(prefix) {
        Some(uri) => format!("{uri}{local}"),
        None => value.to_string(),
      },
      Some(_) => value.to_string(),
      None => match self.get("") {
        Some(uri) if !value.is_empty() => format!("{uri}{value}"),
        _ => value.to_string(),
      },
    }
  }

  /// Split `uri` into `(prefix, local)` against the longest matching
  /// namespace. The local part is never empty.
  pub fn split<'a, 'u>(&'a self, uri: &'u str) -> Option<(&'a str, &'u str)> {
    self
      .iter()
      .filter(|(_, ns)| !ns.is_empty() && uri.len() > ns.len())
      .filter_map(|(prefix, ns)| {
        uri.strip_prefix(ns).map(|local| (prefix, ns.len(), local))
      })
      .max_by_key(|(_, len, _)| *len)
      .map(|(prefix, _, local)| (prefix, local))
  }

  /// The shortest form of `uri` that [`expand`](Self::expand) maps back to
  /// it: `prefix:local`, a bare local name in the default namespace, or the
  /// URI itself.
  pub fn collapse(&self, uri: &str) -> String {
    match self.split(uri) {
      Some(("", local)) if !local.contains(':') => local.to_string(),
      Some((prefix, local)) if !prefix.is_empty() => format!("{prefix}:{local}"),
      _ => uri.to_string(),
    }
  }
}

// ─── Declaration parsing ─────────────────────────────────────────────────────

/// Captures the synthetic element wrapped around a declaration string.
#[derive(Default)]
struct DeclarationSink {
  tag: Option<Tag>,
}

impl Sink for DeclarationSink {
  fn start(&mut self, tag: &Tag) -> ssap_core::Result<Flow> {
    self.tag = Some(tag.clone());
    Ok(Flow::Stop)
  }

  fn end(&mut self, _name: &str) -> ssap_core::Result<Flow> { Ok(Flow::Stop) }

  fn text(&mut self, _bytes: &[u8], _cdata: bool) -> ssap_core::Result<()> {
    Ok(())
  }
}

/// Build a [`NamespaceMap`] from a string of `xmlns` attribute declarations.
///
/// The string is scanned with the same tag scanner that decodes SSAP
/// messages, so quoting and entity rules are identical. Attributes other
/// than `xmlns` / `xmlns:p` are rejected.
pub fn build_namespace_map(decl: &str) -> Result<NamespaceMap> {
  let mut map = NamespaceMap::new();
  if decl.trim().is_empty() {
    return Ok(map);
  }

  let wrapped = format!("<namespaces {decl}/>");
  let mut sink = DeclarationSink::default();
  let consumed = Scanner::new().feed(wrapped.as_bytes(), &mut sink)?;
  let attributes = match sink.tag {
    Some(tag) if tag.empty && consumed == wrapped.len() => tag.attributes,
    _ => {
      return Err(Error::Core(ssap_core::Error::InvalidParameter(format!(
        "{decl:?} is not a list of namespace declarations"
      ))));
    }
  };

  for (name, _) in &attributes {
    if name != "xmlns" && !name.starts_with("xmlns:") {
      return Err(Error::Core(ssap_core::Error::InvalidParameter(format!(
        "{name} is not a namespace declaration"
      ))));
    }
  }
  map.extend_from_attributes(
    attributes.iter().map(|(k, v)| (k.as_str(), v.as_str())),
  );
  Ok(map)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> NamespaceMap {
    build_namespace_map(
      r#"xmlns="http://default#" xmlns:foaf="http://xmlns.com/foaf/0.1/"
         xmlns:ex='http://example.org/'"#,
    )
    .unwrap()
  }

  #[test]
  fn declarations_become_prefixes() {
    let ns = sample();
    assert_eq!(ns.len(), 3);
    assert_eq!(ns.get(""), Some("http://default#"));
    assert_eq!(ns.get("foaf"), Some("http://xmlns.com/foaf/0.1/"));
    assert_eq!(ns.get("ex"), Some("http://example.org/"));
  }

  #[test]
  fn empty_declaration_is_empty_map() {
    assert!(build_namespace_map("  ").unwrap().is_empty());
  }

  #[test]
  fn foreign_attribute_is_rejected() {
    assert!(build_namespace_map(r#"xmlns:a="x" version="2""#).is_err());
  }

  #[test]
  fn malformed_declaration_is_rejected() {
    assert!(build_namespace_map(r#"xmlns:a=unquoted"#).is_err());
  }

  #[test]
  fn trailing_text_after_the_declarations_is_rejected() {
    assert!(build_namespace_map(r#"xmlns:a="x"> junk"#).is_err());
    assert!(build_namespace_map(r#"xmlns:a="x"#).is_err());
    assert!(build_namespace_map(r#"xmlns:a="x"/><more/"#).is_err());
  }

  #[test]
  fn expand_and_collapse_are_inverse() {
    let ns = sample();
    for uri in [
      "http://xmlns.com/foaf/0.1/name",
      "http://default#thing",
      "http://example.org/a/b",
      "urn:unrelated:1",
    ] {
      assert_eq!(ns.expand(&ns.collapse(uri)), uri, "{uri}");
    }
    assert_eq!(ns.collapse("http://xmlns.com/foaf/0.1/name"), "foaf:name");
    assert_eq!(ns.collapse("http://default#thing"), "thing");
  }

  #[test]
  fn unknown_prefix_is_left_alone() {
    assert_eq!(sample().expand("nope:x"), "nope:x");
  }
}
