//! Growable byte buffer with XML append primitives.
//!
//! Storage grows in [`GROWTH_INCREMENT`]-sized steps, only when a write would
//! not fit, and never shrinks. Element and attribute names are trusted
//! constants; text content and attribute values are escaped here.

use bytes::Bytes;
use ssap_core::{Error, Result};

pub const GROWTH_INCREMENT: usize = 1024;

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";
/// Replacement for an embedded `]]>`: end the section after `]]`, then start a
/// new one holding `>`.
const CDATA_SPLIT: &str = "]]]]><![CDATA[>";

#[derive(Debug, Default)]
pub struct Buffer {
  bytes:    Vec<u8>,
  /// A start tag has been written without its closing `>`.
  tag_open: bool,
}

impl Buffer {
  pub fn new() -> Self { Self::default() }

  pub fn len(&self) -> usize { self.bytes.len() }

  pub fn is_empty(&self) -> bool { self.bytes.is_empty() }

  pub fn capacity(&self) -> usize { self.bytes.capacity() }

  /// The bytes written so far. A pending start tag is shown unterminated.
  pub fn as_bytes(&self) -> &[u8] { &self.bytes }

  /// Seal any pending start tag and hand the contents over.
  pub fn finish(mut self) -> Result<Bytes> {
    self.seal()?;
    Ok(Bytes::from(self.bytes))
  }

  /// Like [`finish`](Self::finish), for payloads that travel as text.
  pub fn finish_string(mut self) -> Result<String> {
    self.seal()?;
    String::from_utf8(self.bytes)
      .map_err(|_| Error::Internal("buffer holds invalid UTF-8".into()))
  }

  /// Write `<element attr="value">content</element>`.
  ///
  /// With no content and `complete == false` the start tag is left open so
  /// [`append_attribute`](Self::append_attribute) can add to it. Otherwise
  /// the tag is terminated, `content` (escaped) follows, and `complete`
  /// controls whether the matching end tag is written too.
  pub fn append_open(
    &mut self,
    element: &str,
    attribute: Option<(&str, &str)>,
    content: Option<&str>,
    complete: bool,
  ) -> Result<()> {
    self.seal()?;
    self.push("<")?;
    self.push(element)?;
    if let Some((name, value)) = attribute {
      self.tag_open = true;
      self.append_attribute(name, value)?;
    }
    if content.is_none() && !complete {
      self.tag_open = true;
      return Ok(());
    }
    self.tag_open = false;
    self.push(">")?;
    if let Some(text) = content {
      self.push(&escape_text(text))?;
    }
    if complete {
      self.append_close(element)?;
    }
    Ok(())
  }

  /// Add ` name="value"` to the start tag opened by the last
  /// [`append_open`](Self::append_open).
  pub fn append_attribute(&mut self, name: &str, value: &str) -> Result<()> {
    if !self.tag_open {
      return Err(Error::Internal(format!(
        "attribute {name} written outside a start tag"
      )));
    }
    self.push(" ")?;
    self.push(name)?;
    self.push("=\"")?;
    self.push(&escape_attribute(value))?;
    self.push("\"")
  }

  pub fn append_close(&mut self, element: &str) -> Result<()> {
    self.seal()?;
    self.push("</")?;
    self.push(element)?;
    self.push(">")
  }

  /// Append pre-formed markup or text verbatim.
  pub fn append_raw(&mut self, text: &str) -> Result<()> {
    self.seal()?;
    self.push(text)
  }

  /// Append `text` as CDATA. Embedded `]]>` sequences are split across
  /// sections so the output never terminates a section early.
  pub fn append_cdata(&mut self, text: &str) -> Result<()> {
    self.seal()?;
    self.push(CDATA_OPEN)?;
    if text.contains(CDATA_CLOSE) {
      self.push(&text.replace(CDATA_CLOSE, CDATA_SPLIT))?;
    } else {
      self.push(text)?;
    }
    self.push(CDATA_CLOSE)
  }

  fn seal(&mut self) -> Result<()> {
    if self.tag_open {
      self.tag_open = false;
      self.push(">")?;
    }
    Ok(())
  }

  fn push(&mut self, s: &str) -> Result<()> {
    self.reserve(s.len())?;
    self.bytes.extend_from_slice(s.as_bytes());
    Ok(())
  }

  fn reserve(&mut self, additional: usize) -> Result<()> {
    let needed = self.bytes.len() + additional;
    let capacity = self.bytes.capacity();
    if needed > capacity {
      let shortfall = needed - capacity;
      let steps = shortfall.div_ceil(GROWTH_INCREMENT);
      // try_reserve_exact counts from len, not capacity.
      let grow = capacity - self.bytes.len() + steps * GROWTH_INCREMENT;
      self.bytes.try_reserve_exact(grow)?;
    }
    Ok(())
  }
}

// ─── Escaping ────────────────────────────────────────────────────────────────

pub fn escape_text(s: &str) -> String {
  if !s.contains(['&', '<', '>']) {
    return s.to_string();
  }
  s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub fn escape_attribute(s: &str) -> String {
  escape_text(s).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
  use super::*;

  fn text(buf: &Buffer) -> &str { std::str::from_utf8(buf.as_bytes()).unwrap() }

  #[test]
  fn open_with_content_and_close() {
    let mut buf = Buffer::new();
    buf.append_open("node_id", None, Some("urn:a&b"), true).unwrap();
    assert_eq!(text(&buf), "<node_id>urn:a&amp;b</node_id>");
  }

  #[test]
  fn attributes_extend_an_open_tag() {
    let mut buf = Buffer::new();
    buf.append_open("parameter", Some(("name", "insert_graph")), None, false).unwrap();
    buf.append_attribute("encoding", "RDF-M3").unwrap();
    buf.append_raw("x").unwrap();
    buf.append_close("parameter").unwrap();
    assert_eq!(
      text(&buf),
      r#"<parameter name="insert_graph" encoding="RDF-M3">x</parameter>"#
    );
  }

  #[test]
  fn attribute_without_open_tag_is_internal_error() {
    let mut buf = Buffer::new();
    buf.append_raw("text").unwrap();
    assert!(matches!(
      buf.append_attribute("a", "b"),
      Err(Error::Internal(_))
    ));
  }

  #[test]
  fn growth_is_stepwise_and_never_truncates() {
    let mut buf = Buffer::new();
    let mut expected = String::new();
    for i in 0..500 {
      let chunk = format!("chunk-{i};");
      buf.append_raw(&chunk).unwrap();
      expected.push_str(&chunk);
      assert!(buf.capacity() >= buf.len());
    }
    assert_eq!(text(&buf), expected);
    assert!(buf.capacity() >= GROWTH_INCREMENT);
  }

  #[test]
  fn cdata_splits_embedded_terminator() {
    let mut buf = Buffer::new();
    buf.append_cdata("a]]>b").unwrap();
    assert_eq!(text(&buf), "<![CDATA[a]]]]><![CDATA[>b]]>");
  }

  #[test]
  fn finish_seals_pending_tag() {
    let mut buf = Buffer::new();
    buf.append_open("x", Some(("k", "v\"")), None, false).unwrap();
    let bytes = buf.finish().unwrap();
    assert_eq!(&bytes[..], br#"<x k="v&quot;">"#);
  }
}
