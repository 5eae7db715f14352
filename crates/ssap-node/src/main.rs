//! `ssap` command-line tool.
//!
//! Decodes SSAP message streams and prints requests built from
//! `ssap.toml` (or the path specified with `--config`).
//!
//! ```text
//! ssap decode capture.xml
//! cat capture.xml | ssap decode
//! ssap join
//! ```

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Serialize;
use ssap_core::{GraphStyle, ParseStatus, QueryStyle, SsapMessage, Triple};
use ssap_m3::{NamespaceMap, build_namespace_map, parse_triples};
use ssap_node::NodeConfig;
use ssap_wire::{Envelope, build_join_request, build_leave_request};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "SSAP message tool")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "ssap.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Decode SSAP messages from FILE (or stdin) and print them as JSON.
  Decode {
    file: Option<PathBuf>,
  },
  /// Print a JOIN request for the configured node and space.
  Join,
  /// Print a LEAVE request for the configured node and space.
  Leave,
}

#[derive(Serialize)]
struct Decoded<'a> {
  message: &'a SsapMessage,
  #[serde(skip_serializing_if = "Option::is_none")]
  triples: Option<Vec<Triple>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  removed: Option<Vec<Triple>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = NodeConfig::load(&cli.config).context("failed to load configuration")?;

  match cli.command {
    Command::Decode { file } => {
      let ns = build_namespace_map(cfg.namespaces.as_deref().unwrap_or_default())
        .context("invalid namespace declarations")?;
      match file {
        Some(path) => {
          let input = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("failed to open {path:?}"))?;
          decode(input, cfg.chunk_size, &ns).await
        }
        None => decode(tokio::io::stdin(), cfg.chunk_size, &ns).await,
      }
    }
    Command::Join => {
      let env = Envelope::new(&cfg.node_id, &cfg.space_id, 1);
      let bytes = build_join_request(&env, cfg.credentials.as_deref())?;
      println!("{}", String::from_utf8_lossy(&bytes));
      Ok(())
    }
    Command::Leave => {
      let env = Envelope::new(&cfg.node_id, &cfg.space_id, 1);
      println!("{}", String::from_utf8_lossy(&build_leave_request(&env)?));
      Ok(())
    }
  }
}

/// Stream `input` through the parser in `chunk_size` reads, printing every
/// completed message.
async fn decode<R: AsyncRead + Unpin>(
  mut input: R,
  chunk_size: usize,
  ns: &NamespaceMap,
) -> anyhow::Result<()> {
  let mut parser = ssap_wire::Parser::new();
  let mut chunk = vec![0u8; chunk_size.max(1)];
  let mut count = 0usize;

  loop {
    let n = input.read(&mut chunk).await.context("read failed")?;
    if n == 0 {
      break;
    }
    let mut rest = &chunk[..n];
    loop {
      if parser.status() == ParseStatus::NotStarted {
        rest = rest.trim_ascii_start();
      }
      if rest.is_empty() {
        break;
      }
      if parser.feed(rest, false)? != ParseStatus::Ok {
        break;
      }
      rest = &rest[parser.last_consumed()..];
      let msg = std::mem::take(&mut parser).finish()?;
      print_message(&msg, ns)?;
      count += 1;
    }
  }

  if parser.status() == ParseStatus::InProgress {
    parser.feed(&[], true)?;
  }
  tracing::info!(messages = count, "decode finished");
  Ok(())
}

fn carries_triples(msg: &SsapMessage, payload: &str) -> bool {
  msg.graph_style == Some(GraphStyle::Template)
    || msg.query_style == Some(QueryStyle::Template)
    || payload.trim_start().starts_with("<triple_list")
}

fn print_message(msg: &SsapMessage, ns: &NamespaceMap) -> anyhow::Result<()> {
  let triples_of = |payload: Option<&str>| -> anyhow::Result<Option<Vec<Triple>>> {
    match payload {
      Some(p) if carries_triples(msg, p) && !p.trim().is_empty() => {
        Ok(Some(parse_triples(p, ns).context("undecodable triple payload")?))
      }
      _ => Ok(None),
    }
  };
  let decoded = Decoded {
    message: msg,
    triples: triples_of(msg.results.as_deref())?,
    removed: triples_of(msg.removed_results.as_deref())?,
  };
  println!("{}", serde_json::to_string_pretty(&decoded)?);
  Ok(())
}
