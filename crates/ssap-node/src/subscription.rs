//! Life cycle of outstanding queries and subscriptions.
//!
//! Every issued query or subscribe request is recorded under its access id
//! (the request's transaction id). Confirmations are matched by transaction
//! id, indications and unsubscribe confirmations by subscription id.
//!
//! ```text
//! query:      Issued ──confirm──▶ (callback once, removed)
//! subscribe:  Issued ──confirm ok──▶ Active ──indication──▶ Active …
//!                    └─confirm failed──▶ (callback once, removed)
//!             Active ──unsubscribe──▶ Unsubscribing ──confirm──▶ (removed)
//! ```
//!
//! The table sits behind one lock. Callbacks run after the lock is released,
//! so a callback may issue new operations.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::Serialize;
use ssap_core::{MessageName, MessageType, PathNode, SsapMessage, Status, Triple};
use ssap_m3::{NamespaceMap, QueryResults, ResultKind, SelectResults, decode_results};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

/// Transaction id of the request that opened an operation.
pub type AccessId = i32;

/// Indication sequence numbers wrap to 1 after `SEQUENCE_WRAP - 1`.
pub const SEQUENCE_WRAP: i32 = 10_000;

// ─── Deliveries ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
  QueryResponse,
  SubscribeConfirm,
  Indication,
  Unsubscribed,
}

/// Results carried by one message. `removed` is only present on indications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta<T> {
  pub added:   T,
  pub removed: Option<T>,
}

/// What a callback receives.
#[derive(Debug)]
pub struct Delivery<T> {
  pub access_id:       AccessId,
  pub event:           Event,
  pub status:          Option<Status>,
  /// Decoded results, or the reason decoding failed.
  pub outcome:         std::result::Result<Delta<T>, ssap_m3::Error>,
  /// Set when an indication arrived out of sequence. Results are still
  /// decoded.
  pub sequence_error:  Option<ssap_core::Error>,
}

type Handler<T> = Box<dyn FnMut(Delivery<T>) + Send>;

/// A result handler, one variant per result shape.
pub enum Callback {
  Triples(Handler<Vec<Triple>>),
  Nodes(Handler<Vec<PathNode>>),
  Boolean(Handler<bool>),
  Select(Handler<SelectResults>),
  Text(Handler<String>),
}

impl Callback {
  pub fn triples(f: impl FnMut(Delivery<Vec<Triple>>) + Send + 'static) -> Self {
    Callback::Triples(Box::new(f))
  }

  pub fn nodes(f: impl FnMut(Delivery<Vec<PathNode>>) + Send + 'static) -> Self {
    Callback::Nodes(Box::new(f))
  }

  pub fn boolean(f: impl FnMut(Delivery<bool>) + Send + 'static) -> Self {
    Callback::Boolean(Box::new(f))
  }

  pub fn select(f: impl FnMut(Delivery<SelectResults>) + Send + 'static) -> Self {
    Callback::Select(Box::new(f))
  }

  pub fn text(f: impl FnMut(Delivery<String>) + Send + 'static) -> Self {
    Callback::Text(Box::new(f))
  }

  pub fn kind(&self) -> ResultKind {
    match self {
      Callback::Triples(_) => ResultKind::Triples,
      Callback::Nodes(_) => ResultKind::Nodes,
      Callback::Boolean(_) => ResultKind::Boolean,
      Callback::Select(_) => ResultKind::Select,
      Callback::Text(_) => ResultKind::Text,
    }
  }

  fn invoke(&mut self, header: Header, outcome: Outcome) -> Result<()> {
    match self {
      Callback::Triples(f) => call(f, header, outcome),
      Callback::Nodes(f) => call(f, header, outcome),
      Callback::Boolean(f) => call(f, header, outcome),
      Callback::Select(f) => call(f, header, outcome),
      Callback::Text(f) => call(f, header, outcome),
    }
  }
}

impl std::fmt::Debug for Callback {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "Callback::{:?}", self.kind())
  }
}

trait FromResults: Sized {
  fn from_results(results: QueryResults) -> Option<Self>;
}

impl FromResults for Vec<Triple> {
  fn from_results(results: QueryResults) -> Option<Self> {
    match results {
      QueryResults::Triples(v) => Some(v),
      _ => None,
    }
  }
}

impl FromResults for Vec<PathNode> {
  fn from_results(results: QueryResults) -> Option<Self> {
    match results {
      QueryResults::Nodes(v) => Some(v),
      _ => None,
    }
  }
}

impl FromResults for bool {
  fn from_results(results: QueryResults) -> Option<Self> {
    match results {
      QueryResults::Boolean(v) => Some(v),
      _ => None,
    }
  }
}

impl FromResults for SelectResults {
  fn from_results(results: QueryResults) -> Option<Self> {
    match results {
      QueryResults::Select(v) => Some(v),
      _ => None,
    }
  }
}

impl FromResults for String {
  fn from_results(results: QueryResults) -> Option<Self> {
    match results {
      QueryResults::Text(v) => Some(v),
      _ => None,
    }
  }
}

#[derive(Debug)]
struct Header {
  access_id:      AccessId,
  event:          Event,
  status:         Option<Status>,
  sequence_error: Option<ssap_core::Error>,
}

type Outcome = std::result::Result<Delta<QueryResults>, ssap_m3::Error>;

fn call<T: FromResults>(
  f: &mut Handler<T>,
  header: Header,
  outcome: Outcome,
) -> Result<()> {
  let mismatch = || {
    ssap_core::Error::Internal(format!(
      "results for access id {} do not fit the registered callback",
      header.access_id
    ))
  };
  let outcome = match outcome {
    Ok(delta) => {
      let added = T::from_results(delta.added).ok_or_else(mismatch)?;
      let removed = match delta.removed {
        Some(r) => Some(T::from_results(r).ok_or_else(mismatch)?),
        None => None,
      };
      Ok(Delta { added, removed })
    }
    Err(e) => Err(e),
  };
  f(Delivery {
    access_id: header.access_id,
    event: header.event,
    status: header.status,
    outcome,
    sequence_error: header.sequence_error,
  });
  Ok(())
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
  Query,
  Subscribe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
  Issued,
  Active,
  Unsubscribing,
}

/// Indication ordering for one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SequenceState {
  /// No indication seen yet.
  Pending,
  /// The first indication carried 0.
  Disabled,
  Tracking(i32),
}

impl SequenceState {
  /// Record `received`, returning an error when it is not the successor of
  /// the previous number. Tracking resumes from `received` either way.
  fn observe(&mut self, received: i32) -> Option<ssap_core::Error> {
    match *self {
      SequenceState::Disabled => None,
      SequenceState::Pending => {
        *self = if received == 0 {
          SequenceState::Disabled
        } else {
          SequenceState::Tracking(received)
        };
        None
      }
      SequenceState::Tracking(previous) => {
        let expected = next_sequence(previous);
        *self = SequenceState::Tracking(received);
        (received != expected)
          .then_some(ssap_core::Error::IndicationSequence { expected, received })
      }
    }
  }
}

fn next_sequence(previous: i32) -> i32 {
  match (previous.rem_euclid(SEQUENCE_WRAP) + 1) % SEQUENCE_WRAP {
    0 => 1,
    n => n,
  }
}

#[derive(Debug)]
struct SubscriptionData {
  operation:       Operation,
  query_kind:      ResultKind,
  ns:              NamespaceMap,
  phase:           Phase,
  subscription_id: Option<String>,
  sequence:        SequenceState,
  callback:        Arc<Mutex<Callback>>,
}

#[derive(Debug, Default)]
struct Table {
  records:         HashMap<AccessId, SubscriptionData>,
  by_subscription: HashMap<String, AccessId>,
}

impl Table {
  fn remove(&mut self, access_id: AccessId) -> Option<SubscriptionData> {
    let record = self.records.remove(&access_id)?;
    if let Some(sub_id) = &record.subscription_id {
      self.by_subscription.remove(sub_id);
    }
    debug!(access_id, "operation removed");
    Some(record)
  }

  fn lookup_subscription(&self, sub_id: &str) -> Result<AccessId> {
    self
      .by_subscription
      .get(sub_id)
      .copied()
      .ok_or_else(|| Error::UnknownSubscription(sub_id.to_string()))
  }
}

/// Result of offering a message to the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
  /// A registered callback received the message.
  Delivered(AccessId),
  /// No registered operation matches; the caller handles the message.
  Untracked,
}

/// Work to run once the table lock is released.
struct Pending {
  callback: Arc<Mutex<Callback>>,
  header:   Header,
  outcome:  Outcome,
}

#[derive(Debug, Default)]
pub struct SubscriptionManager {
  table: Mutex<Table>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
  m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn decode(kind: ResultKind, text: Option<&str>, ns: &NamespaceMap) -> ssap_m3::Result<QueryResults> {
  decode_results(kind, text.unwrap_or_default(), ns)
}

impl SubscriptionManager {
  pub fn new() -> Self { Self::default() }

  pub fn len(&self) -> usize { lock(&self.table).records.len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// Server-assigned id of an active subscription.
  pub fn subscription_id(&self, access_id: AccessId) -> Option<String> {
    lock(&self.table).records.get(&access_id)?.subscription_id.clone()
  }

  /// Record an operation before its request is sent.
  ///
  /// `query_kind` is the result shape of the query style used; the callback
  /// must accept that shape.
  pub fn register(
    &self,
    access_id: AccessId,
    operation: Operation,
    query_kind: ResultKind,
    ns: NamespaceMap,
    callback: Callback,
  ) -> Result<()> {
    if callback.kind() != query_kind {
      return Err(Error::Core(ssap_core::Error::InvalidParameter(format!(
        "{:?} callback for {query_kind:?} results",
        callback.kind()
      ))));
    }
    let mut table = lock(&self.table);
    if table.records.contains_key(&access_id) {
      return Err(Error::DuplicateAccessId(access_id));
    }
    table.records.insert(access_id, SubscriptionData {
      operation,
      query_kind,
      ns,
      phase: Phase::Issued,
      subscription_id: None,
      sequence: SequenceState::Pending,
      callback: Arc::new(Mutex::new(callback)),
    });
    debug!(access_id, ?operation, ?query_kind, "operation registered");
    Ok(())
  }

  /// Drop a record whose request could not be sent.
  pub fn cancel(&self, access_id: AccessId) -> Result<()> {
    lock(&self.table)
      .remove(access_id)
      .map(|_| ())
      .ok_or(Error::UnknownAccessId(access_id))
  }

  /// Mark an active subscription as being torn down. Returns its access id.
  pub fn begin_unsubscribe(&self, subscription_id: &str) -> Result<AccessId> {
    let mut table = lock(&self.table);
    let access_id = table.lookup_subscription(subscription_id)?;
    let record = table
      .records
      .get_mut(&access_id)
      .ok_or(Error::UnknownAccessId(access_id))?;
    if record.phase != Phase::Active {
      return Err(Error::NotSubscribed(subscription_id.to_string()));
    }
    record.phase = Phase::Unsubscribing;
    debug!(access_id, subscription_id, "unsubscribing");
    Ok(access_id)
  }

  /// Return a subscription to `Active` after its unsubscribe request could
  /// not be sent.
  pub fn abort_unsubscribe(&self, subscription_id: &str) -> Result<()> {
    let mut table = lock(&self.table);
    let access_id = table.lookup_subscription(subscription_id)?;
    let record = table
      .records
      .get_mut(&access_id)
      .ok_or(Error::UnknownAccessId(access_id))?;
    if record.phase == Phase::Unsubscribing {
      record.phase = Phase::Active;
      debug!(access_id, subscription_id, "unsubscribe aborted");
    }
    Ok(())
  }

  /// Route a decoded message to its operation and run the callback.
  pub fn dispatch(&self, msg: &SsapMessage) -> Result<Dispatch> {
    let pending = {
      let mut table = lock(&self.table);
      match (msg.msg_type, msg.msg_name) {
        (Some(MessageType::Confirm), Some(MessageName::Query)) => {
          self.on_query_confirm(&mut table, msg)
        }
        (Some(MessageType::Confirm), Some(MessageName::Subscribe)) => {
          self.on_subscribe_confirm(&mut table, msg)
        }
        (Some(MessageType::Indication), Some(MessageName::Subscribe)) => {
          self.on_indication(&mut table, msg)?
        }
        (
          Some(MessageType::Confirm | MessageType::Indication),
          Some(MessageName::Unsubscribe),
        ) => self.on_unsubscribed(&mut table, msg)?,
        _ => None,
      }
    };

    let Some(Pending { callback, header, outcome }) = pending else {
      return Ok(Dispatch::Untracked);
    };
    let access_id = header.access_id;
    lock(&callback).invoke(header, outcome).inspect_err(|e| {
      error!(access_id, error = %e, "callback does not match query kind");
    })?;
    Ok(Dispatch::Delivered(access_id))
  }

  fn on_query_confirm(&self, table: &mut Table, msg: &SsapMessage) -> Option<Pending> {
    let access_id = msg.msg_number;
    match table.records.get(&access_id) {
      Some(r) if r.operation == Operation::Query => {}
      _ => return None,
    }
    let record = table.remove(access_id)?;
    let outcome = decode(record.query_kind, msg.results.as_deref(), &record.ns)
      .map(|added| Delta { added, removed: None });
    Some(Pending {
      callback: record.callback,
      header: Header {
        access_id,
        event: Event::QueryResponse,
        status: msg.status,
        sequence_error: None,
      },
      outcome,
    })
  }

  fn on_subscribe_confirm(
    &self,
    table: &mut Table,
    msg: &SsapMessage,
  ) -> Option<Pending> {
    let access_id = msg.msg_number;
    let record = table.records.get_mut(&access_id)?;
    if record.operation != Operation::Subscribe || record.phase != Phase::Issued {
      return None;
    }
    let accepted = msg.status.is_none_or(Status::is_success);
    let header = Header {
      access_id,
      event: Event::SubscribeConfirm,
      status: msg.status,
      sequence_error: None,
    };

    match (&msg.subscription_id, accepted) {
      (Some(sub_id), true) => {
        record.phase = Phase::Active;
        record.subscription_id = Some(sub_id.clone());
        let outcome = decode(record.query_kind, msg.results.as_deref(), &record.ns)
          .map(|added| Delta { added, removed: None });
        let callback = record.callback.clone();
        table.by_subscription.insert(sub_id.clone(), access_id);
        debug!(access_id, subscription_id = %sub_id, "subscription active");
        Some(Pending { callback, header, outcome })
      }
      _ => {
        if accepted {
          warn!(access_id, "subscribe confirmation without subscription id");
        }
        let record = table.remove(access_id)?;
        let outcome = Ok(Delta { added: QueryResults::empty(record.query_kind), removed: None });
        Some(Pending { callback: record.callback, header, outcome })
      }
    }
  }

  fn on_indication(
    &self,
    table: &mut Table,
    msg: &SsapMessage,
  ) -> Result<Option<Pending>> {
    let Some(sub_id) = msg.subscription_id.as_deref() else {
      return Ok(None);
    };
    let access_id = table.lookup_subscription(sub_id)?;
    let record = table
      .records
      .get_mut(&access_id)
      .ok_or(Error::UnknownAccessId(access_id))?;

    let sequence_error = match msg.indication_sequence {
      Some(seq) => record.sequence.observe(seq),
      None => {
        debug!(access_id, "indication without sequence number");
        None
      }
    };
    if let Some(err) = &sequence_error {
      warn!(access_id, subscription_id = sub_id, error = %err, "indication out of sequence");
    }

    let added = decode(record.query_kind, msg.results.as_deref(), &record.ns);
    let removed = decode(record.query_kind, msg.removed_results.as_deref(), &record.ns);
    let outcome = added.and_then(|added| Ok(Delta { added, removed: Some(removed?) }));
    Ok(Some(Pending {
      callback: record.callback.clone(),
      header: Header {
        access_id,
        event: Event::Indication,
        status: msg.status,
        sequence_error,
      },
      outcome,
    }))
  }

  fn on_unsubscribed(
    &self,
    table: &mut Table,
    msg: &SsapMessage,
  ) -> Result<Option<Pending>> {
    let Some(sub_id) = msg.subscription_id.as_deref() else {
      return Ok(None);
    };
    let access_id = table.lookup_subscription(sub_id)?;
    let initiated_here = table
      .records
      .get(&access_id)
      .is_some_and(|r| r.phase == Phase::Unsubscribing);
    if msg.msg_type == Some(MessageType::Confirm) && !initiated_here {
      warn!(access_id, subscription_id = sub_id, "unsolicited unsubscribe confirmation");
    }
    let Some(record) = table.remove(access_id) else {
      return Ok(None);
    };
    Ok(Some(Pending {
      callback: record.callback,
      header: Header {
        access_id,
        event: Event::Unsubscribed,
        status: msg.status,
        sequence_error: None,
      },
      outcome: Ok(Delta { added: QueryResults::empty(record.query_kind), removed: None }),
    }))
  }
}
