use crate::config::ClientConfig;
use crate::frame::Frame;
use crate::registry::{SubscriptionRegistry, TopicMessage};
use crate::session::{self, ReconnectState, SessionContext};
use crate::state::{ConnectionState, StateCell};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

/// Durable topic pub/sub client over a single managed WebSocket session
///
/// The client multiplexes any number of logical topic subscriptions onto
/// one STOMP-over-WebSocket connection, survives transport churn by
/// reconnecting with stepped backoff, and replays every remembered topic
/// subscription after each reconnect. Exactly one underlying connection
/// exists at a time; no collaborator ever touches the socket directly.
///
/// All methods are synchronous and non-blocking; delivery happens through
/// the streams returned by [`receive`](Self::receive) and
/// [`connection_state`](Self::connection_state).
///
/// # Example
/// ```ignore
/// let client = topicsocket::builder()
///     .host("broker.example.org")
///     .secure(true)
///     .token_provider(StaticToken::new(token))
///     .build();
///
/// client.subscribe("/topic/runs/42/status");
/// let mut updates = client.receive("/topic/runs/42/status");
/// client.connect();
///
/// while let Ok(message) = updates.recv().await {
///     println!("status: {:?}", message);
/// }
/// ```
pub struct TopicClient {
    config: Arc<ClientConfig>,
    state: Arc<StateCell>,
    registry: Arc<SubscriptionRegistry>,
    reconnect: Arc<ReconnectState>,
    /// Outbound frame queue shared with the registry
    outbound: mpsc::UnboundedSender<Frame>,
    /// True while the client is alive; cleared by shutdown
    shutdown_flag: Arc<AtomicBool>,
    /// Session supervisor task
    session: Option<tokio::task::JoinHandle<()>>,
}

impl TopicClient {
    /// Create the client and spawn its session supervisor
    ///
    /// Called by the builder's `build()`. Use [`crate::builder()`].
    pub(crate) fn new(config: ClientConfig) -> Self {
        let config = Arc::new(config);
        let state = Arc::new(StateCell::new());
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let registry = SubscriptionRegistry::new(outbound_tx.clone(), Arc::clone(&state));
        let reconnect = Arc::new(ReconnectState::new());
        let shutdown_flag = Arc::new(AtomicBool::new(true));

        let session = session::spawn_session(
            SessionContext {
                config: Arc::clone(&config),
                state: Arc::clone(&state),
                registry: Arc::clone(&registry),
                reconnect: Arc::clone(&reconnect),
                shutdown: Arc::clone(&shutdown_flag),
            },
            outbound_rx,
        );

        Self {
            config,
            state,
            registry,
            reconnect,
            outbound: outbound_tx,
            shutdown_flag,
            session: Some(session),
        }
    }

    /// Begin (or continue) the managed session
    ///
    /// No-op while connected or while an attempt is in flight. Calling it
    /// during a backoff wait retries immediately.
    pub fn connect(&self) {
        if self.is_connected() || self.reconnect.connecting() {
            return;
        }
        self.reconnect.request_run();
    }

    /// Tear the session down cleanly and mark the disconnect as intended
    ///
    /// No-op while not connected. Live wire subscriptions are unsubscribed
    /// and the socket closed; logical subscriber interest stays registered
    /// and is replayed by the next [`connect`](Self::connect).
    pub fn disconnect(&self) {
        if !self.is_connected() {
            return;
        }
        self.reconnect.request_stop();
    }

    /// Synchronous read of the connected flag
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Stream of connection state transitions
    ///
    /// Hot, latest-value-cached: a new subscriber immediately observes the
    /// current state.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.watch()
    }

    /// Register one logical subscriber for `topic`
    pub fn subscribe(&self, topic: &str) {
        self.registry.subscribe(topic);
    }

    /// Drop one logical subscriber for `topic`
    pub fn unsubscribe(&self, topic: &str) {
        self.registry.unsubscribe(topic);
    }

    /// Cached shared stream of decoded messages for `topic`
    pub fn receive(&self, topic: &str) -> broadcast::Receiver<TopicMessage> {
        self.registry.receive(topic)
    }

    /// Best-effort publish to a destination
    ///
    /// The payload is JSON-serialized and transmitted only if currently
    /// connected; otherwise it is silently dropped. Callers needing
    /// delivery assurance must check [`is_connected`](Self::is_connected)
    /// and run their own acknowledgment over a topic.
    pub fn send<T: Serialize>(&self, destination: &str, payload: &T) {
        if !self.is_connected() {
            debug!("not connected, dropping message for '{}'", destination);
            return;
        }
        match serde_json::to_string(payload) {
            Ok(body) => {
                if self.outbound.send(Frame::send(destination, body)).is_err() {
                    warn!("session gone, dropping message for '{}'", destination);
                }
            }
            Err(e) => warn!("failed to serialize message for '{}': {}", destination, e),
        }
    }

    /// Client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Disconnect and terminate the session supervisor
    ///
    /// After shutdown the client cannot be reconnected; build a new one.
    pub async fn shutdown(mut self) {
        info!("shutting down topic client");
        self.shutdown_flag.store(false, Ordering::Release);
        // wake the supervisor whichever state it is parked in
        self.reconnect.request_stop();
        if let Some(session) = self.session.take() {
            let _ = session.await;
        }
    }
}

impl Drop for TopicClient {
    fn drop(&mut self) {
        self.shutdown_flag.store(false, Ordering::Release);
        self.reconnect.request_stop();
        if let Some(session) = self.session.take() {
            session.abort();
        }
    }
}
