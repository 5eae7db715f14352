//! One node's conversation with one SIB.

use std::{
  borrow::Cow,
  sync::{
    Mutex, PoisonError,
    atomic::{AtomicI32, Ordering},
  },
};

use bytes::Bytes;
use ssap_core::{GraphStyle, ParseStatus, QueryStyle, SsapMessage, Triple};
use ssap_m3::{
  NamespaceMap, ResultKind, WqlQuery, build_namespace_map, generate_triple_list,
  generate_wql,
};
use ssap_wire::{
  Envelope, Parser, build_insert_request, build_join_request,
  build_leave_request, build_query_request, build_remove_request,
  build_subscribe_request, build_unsubscribe_request, build_update_request,
};
use tracing::{debug, warn};

use crate::{
  config::NodeConfig,
  error::Result,
  subscription::{AccessId, Callback, Dispatch, Operation, SubscriptionManager},
  transport::Transport,
};

/// A query in one of the supported languages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
  /// Triple templates; wildcards allowed in subject and object.
  Template(Vec<Triple>),
  Wql(WqlQuery),
  /// SPARQL text, e.g. from [`ssap_m3::generate_sparql_select`].
  Sparql(String),
  N3(String),
}

impl Query {
  pub fn style(&self) -> QueryStyle {
    match self {
      Query::Template(_) => QueryStyle::Template,
      Query::Wql(q) => q.style(),
      Query::Sparql(_) => QueryStyle::Sparql,
      Query::N3(_) => QueryStyle::N3,
    }
  }

  fn encode(&self, ns: &NamespaceMap) -> Result<String> {
    Ok(match self {
      Query::Template(templates) => {
        for t in templates {
          t.validate_template()?;
        }
        generate_triple_list(templates, ns)?
      }
      Query::Wql(q) => generate_wql(q, ns)?,
      Query::Sparql(text) | Query::N3(text) => text.clone(),
    })
  }
}

/// A message handed back by [`Session::on_receive`].
#[derive(Debug)]
pub enum Incoming {
  /// Delivered to the callback registered under this access id.
  Dispatched(AccessId),
  /// A message no registered operation claims, such as a join confirmation.
  Message(SsapMessage),
  /// Bytes that failed to decode or dispatch. The parser restarts at the
  /// next segment.
  Rejected(crate::Error),
}

pub struct Session<T> {
  transport:   T,
  node_id:     String,
  space_id:    String,
  credentials: Option<String>,
  ns:          NamespaceMap,
  next_number: AtomicI32,
  manager:     SubscriptionManager,
  parser:      Mutex<Parser>,
}

impl<T: Transport> Session<T> {
  pub fn new(config: &NodeConfig, transport: T) -> Result<Self> {
    let ns = build_namespace_map(config.namespaces.as_deref().unwrap_or_default())?;
    Ok(Self {
      transport,
      node_id: config.node_id.clone(),
      space_id: config.space_id.clone(),
      credentials: config.credentials.clone(),
      ns,
      next_number: AtomicI32::new(1),
      manager: SubscriptionManager::new(),
      parser: Mutex::new(Parser::new()),
    })
  }

  pub fn node_id(&self) -> &str { &self.node_id }

  pub fn space_id(&self) -> &str { &self.space_id }

  pub fn namespaces(&self) -> &NamespaceMap { &self.ns }

  pub fn manager(&self) -> &SubscriptionManager { &self.manager }

  fn envelope(&self) -> (Envelope<'_>, i32) {
    let number = self.next_number.fetch_add(1, Ordering::Relaxed);
    (Envelope::new(&self.node_id, &self.space_id, number), number)
  }

  fn send(&self, bytes: Bytes) -> Result<()> { self.transport.send(bytes) }

  // ─── Requests ──────────────────────────────────────────────────────────────

  /// Each request method returns the transaction id it was sent with.
  pub fn join(&self) -> Result<i32> {
    let (env, number) = self.envelope();
    self.send(build_join_request(&env, self.credentials.as_deref())?)?;
    Ok(number)
  }

  pub fn leave(&self) -> Result<i32> {
    let (env, number) = self.envelope();
    self.send(build_leave_request(&env)?)?;
    Ok(number)
  }

  pub fn insert(&self, triples: &[Triple], confirm: bool) -> Result<i32> {
    self.scope().insert(triples, confirm)
  }

  pub fn remove(&self, templates: &[Triple], confirm: bool) -> Result<i32> {
    self.scope().remove(templates, confirm)
  }

  /// Remove `remove` templates and insert `insert` in one request.
  pub fn update(&self, insert: &[Triple], remove: &[Triple], confirm: bool) -> Result<i32> {
    self.scope().update(insert, remove, confirm)
  }

  pub fn query(&self, query: &Query, callback: Callback) -> Result<AccessId> {
    self.scope().query(query, callback)
  }

  /// Start a subscription. `callback` receives the initial results and
  /// every indication until the subscription ends.
  pub fn subscribe(&self, query: &Query, callback: Callback) -> Result<AccessId> {
    self.scope().subscribe(query, callback)
  }

  fn scope(&self) -> Scope<'_, T> {
    Scope { session: self, ns: Cow::Borrowed(&self.ns) }
  }

  /// Requests encoded with the prefixes in `declarations` instead of the
  /// configured ones. Results of queries issued through the scope are
  /// decoded with the same map.
  pub fn with_namespaces(&self, declarations: &str) -> Result<Scope<'_, T>> {
    Ok(Scope { session: self, ns: Cow::Owned(build_namespace_map(declarations)?) })
  }

  pub fn unsubscribe(&self, subscription_id: &str) -> Result<i32> {
    self.manager.begin_unsubscribe(subscription_id)?;
    let (env, number) = self.envelope();
    let sent = build_unsubscribe_request(&env, subscription_id)
      .map_err(Into::into)
      .and_then(|bytes| self.send(bytes));
    if let Err(e) = sent {
      self.manager.abort_unsubscribe(subscription_id)?;
      return Err(e);
    }
    Ok(number)
  }

  // ─── Inbound ───────────────────────────────────────────────────────────────

  /// Feed bytes read from the connection. Messages may span calls and one
  /// call may complete several messages.
  pub fn on_receive(&self, bytes: &[u8]) -> Vec<Incoming> {
    let mut out = Vec::new();
    let mut parser = self.parser.lock().unwrap_or_else(PoisonError::into_inner);
    let mut rest = bytes;

    loop {
      if parser.status() == ParseStatus::NotStarted {
        rest = rest.trim_ascii_start();
      }
      if rest.is_empty() {
        break;
      }
      match parser.feed(rest, false) {
        Ok(ParseStatus::Ok) => {
          rest = &rest[parser.last_consumed()..];
          let done = std::mem::take(&mut *parser);
          match done.finish() {
            Ok(msg) => out.push(self.route(msg)),
            Err(e) => out.push(Incoming::Rejected(e.into())),
          }
        }
        Ok(_) => break,
        Err(e) => {
          warn!(error = %e, discarded = rest.len(), "dropping undecodable input");
          *parser = Parser::new();
          out.push(Incoming::Rejected(e.into()));
          break;
        }
      }
    }
    out
  }

  fn route(&self, msg: SsapMessage) -> Incoming {
    match self.manager.dispatch(&msg) {
      Ok(Dispatch::Delivered(access_id)) => Incoming::Dispatched(access_id),
      Ok(Dispatch::Untracked) => {
        debug!(msg_number = msg.msg_number, "untracked message");
        Incoming::Message(msg)
      }
      Err(e) => Incoming::Rejected(e),
    }
  }
}

// ─── Scoped requests ─────────────────────────────────────────────────────────

/// Graph and query requests bound to one namespace map.
pub struct Scope<'a, T> {
  session: &'a Session<T>,
  ns:      Cow<'a, NamespaceMap>,
}

impl<T: Transport> Scope<'_, T> {
  pub fn namespaces(&self) -> &NamespaceMap { &self.ns }

  pub fn insert(&self, triples: &[Triple], confirm: bool) -> Result<i32> {
    for t in triples {
      t.validate_asserted()?;
    }
    let graph = generate_triple_list(triples, &self.ns)?;
    let (env, number) = self.session.envelope();
    self
      .session
      .send(build_insert_request(&env, GraphStyle::Template, &graph, confirm)?)?;
    Ok(number)
  }

  pub fn remove(&self, templates: &[Triple], confirm: bool) -> Result<i32> {
    for t in templates {
      t.validate_template()?;
    }
    let graph = generate_triple_list(templates, &self.ns)?;
    let (env, number) = self.session.envelope();
    self
      .session
      .send(build_remove_request(&env, GraphStyle::Template, &graph, confirm)?)?;
    Ok(number)
  }

  pub fn update(&self, insert: &[Triple], remove: &[Triple], confirm: bool) -> Result<i32> {
    for t in insert {
      t.validate_asserted()?;
    }
    for t in remove {
      t.validate_template()?;
    }
    let insert_graph = generate_triple_list(insert, &self.ns)?;
    let remove_graph = generate_triple_list(remove, &self.ns)?;
    let (env, number) = self.session.envelope();
    self.session.send(build_update_request(
      &env,
      GraphStyle::Template,
      &insert_graph,
      &remove_graph,
      confirm,
    )?)?;
    Ok(number)
  }

  pub fn query(&self, query: &Query, callback: Callback) -> Result<AccessId> {
    self.issue(Operation::Query, query, callback)
  }

  pub fn subscribe(&self, query: &Query, callback: Callback) -> Result<AccessId> {
    self.issue(Operation::Subscribe, query, callback)
  }

  fn issue(&self, operation: Operation, query: &Query, callback: Callback) -> Result<AccessId> {
    let session = self.session;
    let style = query.style();
    let text = query.encode(&self.ns)?;
    let (env, number) = session.envelope();
    let bytes = match operation {
      Operation::Query => build_query_request(&env, style, &text)?,
      Operation::Subscribe => build_subscribe_request(&env, style, &text)?,
    };
    session.manager.register(
      number,
      operation,
      ResultKind::from(style),
      self.ns.clone().into_owned(),
      callback,
    )?;
    if let Err(e) = session.send(bytes) {
      session.manager.cancel(number)?;
      return Err(e);
    }
    Ok(number)
  }
}
