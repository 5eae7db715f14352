//! Node configuration.

use std::path::Path;

use serde::Deserialize;
use uuid::Uuid;

use crate::error::Result;

/// Runtime node configuration, deserialised from `ssap.toml` and `SSAP_*`
/// environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
  #[serde(default = "default_node_id")]
  pub node_id:     String,
  #[serde(default = "default_space_id")]
  pub space_id:    String,
  #[serde(default)]
  pub credentials: Option<String>,
  /// `xmlns` declarations applied to graph and query payloads.
  #[serde(default)]
  pub namespaces:  Option<String>,
  /// Read size used when streaming input into the parser.
  #[serde(default = "default_chunk_size")]
  pub chunk_size:  usize,
}

fn default_node_id() -> String { format!("urn:uuid:{}", Uuid::new_v4()) }

fn default_space_id() -> String { "X".to_string() }

fn default_chunk_size() -> usize { 4096 }

impl Default for NodeConfig {
  fn default() -> Self {
    Self {
      node_id:     default_node_id(),
      space_id:    default_space_id(),
      credentials: None,
      namespaces:  None,
      chunk_size:  default_chunk_size(),
    }
  }
}

impl NodeConfig {
  /// Layer an optional TOML file under `SSAP_*` environment variables.
  pub fn load(path: &Path) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("SSAP"))
      .build()?;
    Ok(settings.try_deserialize()?)
  }

  pub fn from_toml(text: &str) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from_str(text, config::FileFormat::Toml))
      .build()?;
    Ok(settings.try_deserialize()?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_fill_missing_keys() {
    let cfg = NodeConfig::from_toml("space_id = \"urn:space:1\"").unwrap();
    assert_eq!(cfg.space_id, "urn:space:1");
    assert!(cfg.node_id.starts_with("urn:uuid:"));
    assert_eq!(cfg.chunk_size, 4096);
    assert!(cfg.credentials.is_none());
  }

  #[test]
  fn all_keys() {
    let cfg = NodeConfig::from_toml(
      r#"
        node_id     = "urn:node:7"
        space_id    = "X"
        credentials = "secret"
        namespaces  = 'xmlns:ex="http://example.org/"'
        chunk_size  = 16
      "#,
    )
    .unwrap();
    assert_eq!(cfg.node_id, "urn:node:7");
    assert_eq!(cfg.credentials.as_deref(), Some("secret"));
    assert_eq!(cfg.namespaces.as_deref(), Some(r#"xmlns:ex="http://example.org/""#));
    assert_eq!(cfg.chunk_size, 16);
  }

  #[test]
  fn missing_file_is_not_an_error() {
    let cfg = NodeConfig::load(Path::new("/nonexistent/ssap.toml")).unwrap();
    assert!(!cfg.space_id.is_empty());
  }
}
