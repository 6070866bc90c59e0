//! Topic subscription registry
//!
//! The registry is the multiplexing core of the client: it is the only
//! place subscriber interest is tracked, and it owns the mapping from topic
//! to wire-level subscription. All entry mutations are serialized behind a
//! single coarse mutex; nothing here is a throughput bottleneck.
//!
//! ```text
//! subscribe(topic) ─┬─ connected ────────> SUBSCRIBE frame, wire handle recorded
//!                   └─ disconnected ─────> one-shot waiter, fires on connect
//!                                          (cancelled by unsubscribe)
//!
//! MESSAGE frame ──> dispatch(destination) ──> per-topic broadcast stream
//! reconnect ──────> replay_all() ──────────> SUBSCRIBE per remembered topic
//! ```

use crate::frame::Frame;
use crate::state::StateCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// Capacity of each per-topic broadcast stream
///
/// A receiver that falls more than this many messages behind observes a
/// `Lagged` error and resumes from the oldest retained message.
const TOPIC_STREAM_CAPACITY: usize = 256;

/// Opaque handle for a live wire-level subscription
///
/// Wraps the STOMP subscription id. Exactly one handle exists per topic at
/// any instant; handles never leave the registry except for teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireHandle(String);

impl WireHandle {
    pub(crate) fn id(&self) -> &str {
        &self.0
    }
}

/// A message delivered to topic subscribers
///
/// Bodies are JSON-decoded; a decode failure delivers the raw text instead
/// of erroring, so a malformed broker payload can never poison the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicMessage {
    /// Successfully decoded JSON body
    Json(serde_json::Value),
    /// Raw text fallback for bodies that are not valid JSON
    Text(String),
}

impl TopicMessage {
    fn decode(body: &str) -> Self {
        match serde_json::from_str(body) {
            Ok(value) => TopicMessage::Json(value),
            Err(_) => TopicMessage::Text(body.to_string()),
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            TopicMessage::Json(value) => Some(value),
            TopicMessage::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            TopicMessage::Json(_) => None,
            TopicMessage::Text(text) => Some(text),
        }
    }
}

struct TopicEntry {
    /// Logical subscribers currently interested in the topic
    listeners: usize,
    /// Present iff a live wire-level subscription exists on the current
    /// session
    wire: Option<WireHandle>,
    /// Cached shared stream handed out by `receive`
    stream: broadcast::Sender<TopicMessage>,
    /// One-shot wait-for-connection task, present while a deferred
    /// subscribe is outstanding
    waiter: Option<tokio::task::JoinHandle<()>>,
}

impl TopicEntry {
    fn new() -> Self {
        Self {
            listeners: 0,
            wire: None,
            stream: broadcast::channel(TOPIC_STREAM_CAPACITY).0,
            waiter: None,
        }
    }
}

impl Drop for TopicEntry {
    fn drop(&mut self) {
        if let Some(waiter) = self.waiter.take() {
            waiter.abort();
        }
    }
}

/// Reference-counted topic subscription tracker and message router
pub struct SubscriptionRegistry {
    topics: Mutex<HashMap<String, TopicEntry>>,
    /// Outbound frame queue into the session write loop
    outbound: mpsc::UnboundedSender<Frame>,
    state: Arc<StateCell>,
    next_wire_id: AtomicU64,
    /// Runtime the waiter tasks are spawned onto, captured at construction
    /// so `subscribe` stays callable from non-runtime threads
    runtime: tokio::runtime::Handle,
    /// Weak self-reference handed to waiter tasks; a waiter must not keep
    /// a dropped registry alive
    self_weak: Weak<SubscriptionRegistry>,
}

impl SubscriptionRegistry {
    pub(crate) fn new(
        outbound: mpsc::UnboundedSender<Frame>,
        state: Arc<StateCell>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            topics: Mutex::new(HashMap::new()),
            outbound,
            state,
            next_wire_id: AtomicU64::new(0),
            runtime: tokio::runtime::Handle::current(),
            self_weak: weak.clone(),
        })
    }

    /// Register one logical subscriber for `topic`
    ///
    /// Creates the entry on first call. The wire-level subscribe goes out
    /// immediately when connected; otherwise a one-shot waiter defers it
    /// until the state stream reports connected. Multiple logical
    /// subscribers share a single wire subscription.
    pub fn subscribe(&self, topic: &str) {
        let mut topics = self.topics.lock();
        let entry = topics
            .entry(topic.to_string())
            .or_insert_with(TopicEntry::new);
        entry.listeners += 1;

        if self.state.is_connected() {
            self.issue_wire(topic, entry);
        } else if entry.waiter.is_none() {
            entry.waiter = Some(self.spawn_waiter(topic));
        }
    }

    /// Drop one logical subscriber for `topic`
    ///
    /// When the last subscriber leaves, any pending waiter is cancelled so
    /// a late connect cannot resurrect the subscription, the wire-level
    /// subscription is torn down, and the cached stream closes.
    pub fn unsubscribe(&self, topic: &str) {
        let mut topics = self.topics.lock();
        let Some(entry) = topics.get_mut(topic) else {
            debug!("unsubscribe for unknown topic '{}' ignored", topic);
            return;
        };
        entry.listeners = entry.listeners.saturating_sub(1);
        if entry.listeners > 0 {
            return;
        }

        if let Some(waiter) = entry.waiter.take() {
            waiter.abort();
        }
        if let Some(wire) = entry.wire.take() {
            if self.state.is_connected()
                && self.outbound.send(Frame::unsubscribe(wire.id())).is_err()
            {
                debug!("session gone, skipping wire unsubscribe for '{}'", topic);
            }
        }
        topics.remove(topic);
        debug!("topic entry '{}' removed", topic);
    }

    /// Cached shared stream of decoded messages for `topic`
    ///
    /// Created on first call, reused afterwards; every receiver sees every
    /// message from its point of subscription on. Does not register
    /// interest — pair with [`subscribe`](Self::subscribe).
    pub fn receive(&self, topic: &str) -> broadcast::Receiver<TopicMessage> {
        let mut topics = self.topics.lock();
        topics
            .entry(topic.to_string())
            .or_insert_with(TopicEntry::new)
            .stream
            .subscribe()
    }

    /// Route an inbound MESSAGE body to the topic's stream
    pub(crate) fn dispatch(&self, destination: &str, body: &str) {
        let topics = self.topics.lock();
        let Some(entry) = topics.get(destination) else {
            debug!("message for unknown topic '{}' dropped", destination);
            return;
        };
        if entry.stream.send(TopicMessage::decode(body)).is_err() {
            debug!("no active receivers for topic '{}'", destination);
        }
    }

    /// Re-issue the wire-level subscribe for every remembered topic
    ///
    /// Runs unconditionally on every successful (re)connect; topics whose
    /// wire subscription already exists are left alone, so at most one wire
    /// subscription per topic can result.
    pub(crate) fn replay_all(&self) {
        let mut topics = self.topics.lock();
        for (topic, entry) in topics.iter_mut() {
            if entry.listeners > 0 && entry.wire.is_none() {
                self.issue_wire(topic, entry);
            }
        }
    }

    /// Forget all wire handles after the session died underneath them
    pub(crate) fn invalidate_wire(&self) {
        let mut topics = self.topics.lock();
        for entry in topics.values_mut() {
            entry.wire = None;
        }
    }

    /// Take every live wire handle for explicit teardown
    ///
    /// Logical interest stays registered; only the wire level is cleared.
    pub(crate) fn take_wire_handles(&self) -> Vec<WireHandle> {
        let mut topics = self.topics.lock();
        topics
            .values_mut()
            .filter_map(|entry| entry.wire.take())
            .collect()
    }

    /// Number of topics with at least one entry (listeners or cached
    /// stream)
    pub fn topic_count(&self) -> usize {
        self.topics.lock().len()
    }

    /// Current logical subscriber count for a topic
    pub fn listener_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .get(topic)
            .map(|entry| entry.listeners)
            .unwrap_or(0)
    }

    /// Whether a live wire-level subscription exists for a topic
    pub fn is_wire_active(&self, topic: &str) -> bool {
        self.topics
            .lock()
            .get(topic)
            .map(|entry| entry.wire.is_some())
            .unwrap_or(false)
    }

    /// Allocate a subscription id and enqueue the SUBSCRIBE frame
    ///
    /// Caller holds the topics lock, which is what makes the
    /// one-wire-subscription-per-topic invariant hold.
    fn issue_wire(&self, topic: &str, entry: &mut TopicEntry) {
        if entry.wire.is_some() {
            return;
        }
        let id = format!("sub-{}", self.next_wire_id.fetch_add(1, Ordering::Relaxed));
        if self.outbound.send(Frame::subscribe(&id, topic)).is_ok() {
            debug!("wire subscription '{}' issued for '{}'", id, topic);
            entry.wire = Some(WireHandle(id));
        } else {
            warn!("session gone, wire subscribe for '{}' dropped", topic);
        }
    }

    /// Spawn the one-shot wait-for-connection task for a deferred subscribe
    fn spawn_waiter(&self, topic: &str) -> tokio::task::JoinHandle<()> {
        let registry = self.self_weak.clone();
        let mut state_rx = self.state.watch();
        let topic = topic.to_string();

        self.runtime.spawn(async move {
            loop {
                if state_rx.borrow_and_update().connected {
                    break;
                }
                if state_rx.changed().await.is_err() {
                    return;
                }
            }
            if let Some(registry) = registry.upgrade() {
                registry.finish_waiter(&topic);
            }
        })
    }

    /// Completion path of a waiter: issue the wire subscribe if the topic
    /// still wants one
    fn finish_waiter(&self, topic: &str) {
        let mut topics = self.topics.lock();
        if let Some(entry) = topics.get_mut(topic) {
            entry.waiter = None;
            if entry.listeners > 0 && self.state.is_connected() {
                self.issue_wire(topic, entry);
            }
        }
    }
}
