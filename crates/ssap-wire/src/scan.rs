//! Byte-level, resumable XML tag scanner.
//!
//! The scanner turns a byte stream into start-tag, end-tag and text events
//! without ever needing the whole document: every state it can be in between
//! two bytes is stored in [`Scanner`], so input may be cut anywhere, including
//! inside a tag name, an attribute value, an entity or a CDATA terminator.
//!
//! It understands exactly what SSAP needs: elements, quoted attributes, the
//! predefined entities and character references, CDATA sections, comments and
//! processing instructions. `<!DOCTYPE` and other declarations are rejected.

use ssap_core::{Error, Result};

/// A start tag as seen by a [`Sink`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Tag {
  pub name:       String,
  pub attributes: Vec<(String, String)>,
  /// Written as `<name/>`; no end event follows.
  pub empty:      bool,
}

impl Tag {
  pub fn attribute(&self, name: &str) -> Option<&str> {
    self
      .attributes
      .iter()
      .find(|(k, _)| k == name)
      .map(|(_, v)| v.as_str())
  }
}

/// Whether the scanner should keep consuming after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
  Continue,
  Stop,
}

/// Receiver of scanner events.
pub trait Sink {
  fn start(&mut self, tag: &Tag) -> Result<Flow>;
  fn end(&mut self, name: &str) -> Result<Flow>;
  /// Character data. `cdata` is set for the contents of a CDATA section;
  /// ordinary text arrives with entities already decoded.
  fn text(&mut self, bytes: &[u8], cdata: bool) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
  #[default]
  Content,
  Entity,
  Lt,
  OpenName,
  InTag,
  AttrName,
  AfterAttrName,
  BeforeValue,
  AttrValue(u8),
  EmptyTagGt,
  CloseName,
  AfterCloseName,
  Bang,
  CData { brackets: usize },
  Comment { dashes: u8 },
  Pi { question: bool },
}

const MAX_ENTITY: usize = 12;

#[derive(Debug, Default)]
pub struct Scanner {
  state:      State,
  tag:        Tag,
  name:       Vec<u8>,
  attr_name:  Vec<u8>,
  attr_value: Vec<u8>,
  markup:     Vec<u8>,
  entity:     Vec<u8>,
  cdata:      Vec<u8>,
}

impl Scanner {
  pub fn new() -> Self { Self::default() }

  /// True when the scanner sits between markup, i.e. no token is split.
  pub fn at_boundary(&self) -> bool { self.state == State::Content }

  /// Scan `input`, reporting events to `sink`. Returns the number of bytes
  /// consumed, which is less than `input.len()` only when the sink asked to
  /// stop.
  pub fn feed<S: Sink>(&mut self, input: &[u8], sink: &mut S) -> Result<usize> {
    let mut i = 0;
    while i < input.len() {
      // Fast path: runs of plain text.
      if self.state == State::Content {
        let run = input[i..]
          .iter()
          .position(|&b| b == b'<' || b == b'&')
          .unwrap_or(input.len() - i);
        if run > 0 {
          sink.text(&input[i..i + run], false)?;
          i += run;
          continue;
        }
      }
      let byte = input[i];
      i += 1;
      if self.step(byte, sink)? == Flow::Stop {
        self.flush_cdata(sink)?;
        return Ok(i);
      }
    }
    self.flush_cdata(sink)?;
    Ok(i)
  }

  fn step<S: Sink>(&mut self, b: u8, sink: &mut S) -> Result<Flow> {
    match self.state {
      State::Content => match b {
        b'<' => self.state = State::Lt,
        b'&' => {
          self.entity.clear();
          self.state = State::Entity;
        }
        _ => sink.text(&[b], false)?,
      },

      State::Entity => {
        if b == b';' {
          let decoded = decode_entity(&self.entity)?;
          let mut utf8 = [0u8; 4];
          sink.text(decoded.encode_utf8(&mut utf8).as_bytes(), false)?;
          self.state = State::Content;
        } else if self.entity.len() >= MAX_ENTITY {
          return Err(Error::Parse("unterminated entity reference".into()));
        } else {
          self.entity.push(b);
        }
      }

      State::Lt => match b {
        b'/' => {
          self.name.clear();
          self.state = State::CloseName;
        }
        b'!' => {
          self.markup.clear();
          self.state = State::Bang;
        }
        b'?' => self.state = State::Pi { question: false },
        _ if is_name_byte(b) => {
          self.tag = Tag::default();
          self.name.clear();
          self.name.push(b);
          self.state = State::OpenName;
        }
        _ => return Err(unexpected(b, "after '<'")),
      },

      State::OpenName => match b {
        _ if b.is_ascii_whitespace() => {
          self.tag.name = take_string(&mut self.name)?;
          self.state = State::InTag;
        }
        b'/' => {
          self.tag.name = take_string(&mut self.name)?;
          self.state = State::EmptyTagGt;
        }
        b'>' => {
          self.tag.name = take_string(&mut self.name)?;
          return self.emit_start(sink);
        }
        _ if is_name_byte(b) => self.name.push(b),
        _ => return Err(unexpected(b, "in element name")),
      },

      State::InTag => match b {
        _ if b.is_ascii_whitespace() => {}
        b'/' => self.state = State::EmptyTagGt,
        b'>' => return self.emit_start(sink),
        _ if is_name_byte(b) => {
          self.attr_name.clear();
          self.attr_name.push(b);
          self.state = State::AttrName;
        }
        _ => return Err(unexpected(b, "in start tag")),
      },

      State::AttrName => match b {
        b'=' => self.state = State::BeforeValue,
        _ if b.is_ascii_whitespace() => self.state = State::AfterAttrName,
        _ if is_name_byte(b) => self.attr_name.push(b),
        _ => return Err(unexpected(b, "in attribute name")),
      },

      State::AfterAttrName => match b {
        b'=' => self.state = State::BeforeValue,
        _ if b.is_ascii_whitespace() => {}
        _ => return Err(unexpected(b, "where '=' was expected")),
      },

      State::BeforeValue => match b {
        b'"' | b'\'' => {
          self.attr_value.clear();
          self.state = State::AttrValue(b);
        }
        _ if b.is_ascii_whitespace() => {}
        _ => return Err(unexpected(b, "where a quoted value was expected")),
      },

      State::AttrValue(quote) => {
        if b == quote {
          let name = take_string(&mut self.attr_name)?;
          let value = unescape(&take_string(&mut self.attr_value)?)?;
          self.tag.attributes.push((name, value));
          self.state = State::InTag;
        } else if b == b'<' {
          return Err(unexpected(b, "in attribute value"));
        } else {
          self.attr_value.push(b);
        }
      }

      State::EmptyTagGt => {
        if b != b'>' {
          return Err(unexpected(b, "after '/' in start tag"));
        }
        self.tag.empty = true;
        return self.emit_start(sink);
      }

      State::CloseName => match b {
        b'>' => return self.emit_end(sink),
        _ if b.is_ascii_whitespace() => self.state = State::AfterCloseName,
        _ if is_name_byte(b) => self.name.push(b),
        _ => return Err(unexpected(b, "in end tag")),
      },

      State::AfterCloseName => match b {
        b'>' => return self.emit_end(sink),
        _ if b.is_ascii_whitespace() => {}
        _ => return Err(unexpected(b, "after end tag name")),
      },

      State::Bang => {
        self.markup.push(b);
        if self.markup == b"[CDATA[" {
          self.cdata.clear();
          self.state = State::CData { brackets: 0 };
        } else if self.markup == b"--" {
          self.state = State::Comment { dashes: 0 };
        } else if !b"[CDATA[".starts_with(&self.markup)
          && !b"--".starts_with(&self.markup)
        {
          return Err(Error::Parse(
            "unsupported markup declaration after '<!'".into(),
          ));
        }
      }

      State::CData { brackets } => match b {
        b']' => self.state = State::CData { brackets: brackets + 1 },
        b'>' if brackets >= 2 => {
          self.cdata.extend(std::iter::repeat_n(b']', brackets - 2));
          self.flush_cdata(sink)?;
          self.state = State::Content;
        }
        _ => {
          self.cdata.extend(std::iter::repeat_n(b']', brackets));
          self.cdata.push(b);
          self.state = State::CData { brackets: 0 };
        }
      },

      State::Comment { dashes } => {
        self.state = match b {
          b'-' => State::Comment { dashes: (dashes + 1).min(2) },
          b'>' if dashes >= 2 => State::Content,
          _ => State::Comment { dashes: 0 },
        };
      }

      State::Pi { question } => {
        self.state = match b {
          b'?' => State::Pi { question: true },
          b'>' if question => State::Content,
          _ => State::Pi { question: false },
        };
      }
    }
    Ok(Flow::Continue)
  }

  fn emit_start<S: Sink>(&mut self, sink: &mut S) -> Result<Flow> {
    self.state = State::Content;
    let tag = std::mem::take(&mut self.tag);
    sink.start(&tag)
  }

  fn emit_end<S: Sink>(&mut self, sink: &mut S) -> Result<Flow> {
    self.state = State::Content;
    let name = take_string(&mut self.name)?;
    if name.is_empty() {
      return Err(Error::Parse("empty end tag".into()));
    }
    sink.end(&name)
  }

  /// Hand buffered CDATA to the sink. Pending `]` bytes that may still turn
  /// out to be the terminator stay in the state.
  fn flush_cdata<S: Sink>(&mut self, sink: &mut S) -> Result<()> {
    if !self.cdata.is_empty() {
      sink.text(&self.cdata, true)?;
      self.cdata.clear();
    }
    Ok(())
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn is_name_byte(b: u8) -> bool {
  !(b.is_ascii_whitespace()
    || matches!(b, b'<' | b'>' | b'/' | b'=' | b'"' | b'\'' | b'&' | b'!' | b'?'))
}

fn unexpected(b: u8, context: &str) -> Error {
  Error::Parse(format!("unexpected byte {:?} {context}", b as char))
}

fn take_string(bytes: &mut Vec<u8>) -> Result<String> {
  String::from_utf8(std::mem::take(bytes))
    .map_err(|_| Error::Parse("markup is not valid UTF-8".into()))
}

fn decode_entity(name: &[u8]) -> Result<char> {
  let decoded = match name {
    b"lt" => Some('<'),
    b"gt" => Some('>'),
    b"amp" => Some('&'),
    b"quot" => Some('"'),
    b"apos" => Some('\''),
    [b'#', b'x' | b'X', hex @ ..] => std::str::from_utf8(hex)
      .ok()
      .and_then(|h| u32::from_str_radix(h, 16).ok())
      .and_then(char::from_u32),
    [b'#', dec @ ..] => std::str::from_utf8(dec)
      .ok()
      .and_then(|d| d.parse::<u32>().ok())
      .and_then(char::from_u32),
    _ => None,
  };
  decoded.ok_or_else(|| {
    Error::Parse(format!(
      "unknown entity &{};",
      String::from_utf8_lossy(name)
    ))
  })
}

/// Decode entity and character references in an attribute value.
pub fn unescape(raw: &str) -> Result<String> {
  if !raw.contains('&') {
    return Ok(raw.to_string());
  }
  let mut out = String::with_capacity(raw.len());
  let mut rest = raw;
  while let Some(amp) = rest.find('&') {
    out.push_str(&rest[..amp]);
    let after = &rest[amp + 1..];
    let semi = after
      .find(';')
      .ok_or_else(|| Error::Parse("unterminated entity reference".into()))?;
    out.push(decode_entity(after[..semi].as_bytes())?);
    rest = &after[semi + 1..];
  }
  out.push_str(rest);
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Default)]
  struct Recorder {
    events: Vec<String>,
    stop_on: Option<String>,
  }

  impl Sink for Recorder {
    fn start(&mut self, tag: &Tag) -> Result<Flow> {
      let attrs: Vec<String> =
        tag.attributes.iter().map(|(k, v)| format!("{k}={v}")).collect();
      self.events.push(format!(
        "start:{}[{}]{}",
        tag.name,
        attrs.join(","),
        if tag.empty { "/" } else { "" }
      ));
      Ok(Flow::Continue)
    }

    fn end(&mut self, name: &str) -> Result<Flow> {
      self.events.push(format!("end:{name}"));
      if self.stop_on.as_deref() == Some(name) {
        return Ok(Flow::Stop);
      }
      Ok(Flow::Continue)
    }

    fn text(&mut self, bytes: &[u8], cdata: bool) -> Result<()> {
      let kind = if cdata { "cdata" } else { "text" };
      let s = String::from_utf8_lossy(bytes);
      // Merge adjacent text of the same kind for readable assertions.
      if let Some(last) = self.events.last_mut()
        && last.starts_with(kind)
      {
        last.push_str(&s);
        return Ok(());
      }
      self.events.push(format!("{kind}:{s}"));
      Ok(())
    }
  }

  fn scan_in_pieces(input: &[u8], piece: usize) -> Vec<String> {
    let mut scanner = Scanner::new();
    let mut rec = Recorder::default();
    for chunk in input.chunks(piece) {
      scanner.feed(chunk, &mut rec).unwrap();
    }
    rec.events
  }

  #[test]
  fn elements_attributes_and_entities() {
    let events = scan_in_pieces(br#"<a k='1 &amp; 2'>x &lt; y<b/></a>"#, 64);
    assert_eq!(events, vec![
      "start:a[k=1 & 2]",
      "text:x < y",
      "start:b[]/",
      "end:a",
    ]);
  }

  #[test]
  fn byte_by_byte_matches_whole() {
    let doc = br#"<?xml version="1.0"?><!-- c --><a n="v"><![CDATA[p]]]>q]]></a>"#;
    assert_eq!(scan_in_pieces(doc, 1), scan_in_pieces(doc, doc.len()));
  }

  #[test]
  fn cdata_keeps_extra_brackets() {
    let events = scan_in_pieces(b"<a><![CDATA[x]]]]></a>", 3);
    assert_eq!(events, vec!["start:a[]", "cdata:x]]", "end:a"]);
  }

  #[test]
  fn stop_reports_consumed_bytes() {
    let mut scanner = Scanner::new();
    let mut rec = Recorder { stop_on: Some("a".into()), ..Default::default() };
    let consumed = scanner.feed(b"<a></a><b>", &mut rec).unwrap();
    assert_eq!(consumed, 7);
  }

  #[test]
  fn doctype_is_rejected() {
    let mut scanner = Scanner::new();
    let mut rec = Recorder::default();
    assert!(scanner.feed(b"<!DOCTYPE x>", &mut rec).is_err());
  }

  #[test]
  fn numeric_references() {
    assert_eq!(unescape("&#65;&#x42;c").unwrap(), "ABc");
    assert!(unescape("&bogus;").is_err());
  }
}
