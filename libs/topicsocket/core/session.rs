//! Transport session and reconnect supervisor
//!
//! One long-lived Tokio task owns the socket end to end. It parks until a
//! connect is requested, then drives attempts: token fetch, WebSocket
//! upgrade with the STOMP subprotocol, CONNECT/CONNECTED handshake, message
//! loop. When a session dies without the caller asking for it, the task
//! publishes the state transition, waits out the backoff delay, and tries
//! again; an explicit disconnect parks it until the next `connect()`.
//!
//! ```text
//! IDLE ──connect()──> CONNECTING ──> CONNECTED ──close/error──> SCHEDULED(delay) ─┐
//!   ^                                    │                           │            │
//!   │                               disconnect()                     └────────────┘
//!   └──────────────────────────── INTENTIONAL <──┘                    (CONNECTING)
//! ```

use crate::config::{ClientConfig, SUBPROTOCOL};
use crate::error::{Result, TopicSocketError};
use crate::frame::{Command, Frame};
use crate::heartbeat;
use crate::registry::SubscriptionRegistry;
use crate::state::StateCell;
use crate::traits::{BackoffPolicy, TokenProvider};
use crossbeam_channel::Receiver;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Retry-loop state shared between the client facade and the supervisor
///
/// The desired-run flag doubles as `should_reconnect`: it is toggled off
/// exactly when the caller explicitly disconnects, and its watch channel is
/// what wakes the parked supervisor.
pub(crate) struct ReconnectState {
    consecutive_failed_attempts: AtomicU32,
    connecting: AtomicBool,
    desired: watch::Sender<bool>,
}

impl ReconnectState {
    pub(crate) fn new() -> Self {
        Self {
            consecutive_failed_attempts: AtomicU32::new(0),
            connecting: AtomicBool::new(false),
            desired: watch::channel(false).0,
        }
    }

    /// Ask the supervisor to run (idempotent)
    ///
    /// `send_replace` keeps the value even when the supervisor has not
    /// polled its receiver yet; a plain `send` would drop the request.
    pub(crate) fn request_run(&self) {
        self.desired.send_replace(true);
    }

    /// Ask the supervisor to stop and park (idempotent)
    pub(crate) fn request_stop(&self) {
        self.desired.send_replace(false);
    }

    pub(crate) fn should_reconnect(&self) -> bool {
        *self.desired.borrow()
    }

    pub(crate) fn watch_desired(&self) -> watch::Receiver<bool> {
        self.desired.subscribe()
    }

    pub(crate) fn connecting(&self) -> bool {
        self.connecting.load(Ordering::Acquire)
    }

    fn set_connecting(&self, connecting: bool) {
        self.connecting.store(connecting, Ordering::Release);
    }

    fn record_failure(&self) -> u32 {
        self.consecutive_failed_attempts
            .fetch_add(1, Ordering::AcqRel)
            + 1
    }

    fn reset_failures(&self) {
        self.consecutive_failed_attempts.store(0, Ordering::Release);
    }

    pub(crate) fn failed_attempts(&self) -> u32 {
        self.consecutive_failed_attempts.load(Ordering::Acquire)
    }
}

/// Everything the supervisor task needs to drive a session
pub(crate) struct SessionContext {
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) state: Arc<StateCell>,
    pub(crate) registry: Arc<SubscriptionRegistry>,
    pub(crate) reconnect: Arc<ReconnectState>,
    /// True while the client is alive; cleared by shutdown
    pub(crate) shutdown: Arc<AtomicBool>,
}

/// How a session ended
enum SessionEnd {
    /// The caller asked for it; park until the next connect
    Intended,
    /// Transport failure; the supervisor schedules a retry
    Failure,
}

pub(crate) fn spawn_session(
    ctx: SessionContext,
    outbound_rx: mpsc::UnboundedReceiver<Frame>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_session(ctx, outbound_rx))
}

/// Supervisor loop
async fn run_session(ctx: SessionContext, mut outbound_rx: mpsc::UnboundedReceiver<Frame>) {
    let mut desired = ctx.reconnect.watch_desired();

    loop {
        if !ctx.shutdown.load(Ordering::Acquire) {
            break;
        }
        if !*desired.borrow_and_update() {
            if desired.changed().await.is_err() {
                break;
            }
            continue;
        }

        ctx.reconnect.set_connecting(true);
        let end = connect_once(&ctx, &mut outbound_rx, &mut desired).await;
        ctx.reconnect.set_connecting(false);
        // whichever way the session went, its wire subscriptions are void
        ctx.registry.invalidate_wire();

        match end {
            SessionEnd::Intended => {
                ctx.state.publish_intended_disconnect();
            }
            SessionEnd::Failure => {
                ctx.state.publish_dropped();
                if !ctx.shutdown.load(Ordering::Acquire) || !ctx.reconnect.should_reconnect() {
                    continue;
                }
                let attempts = ctx.reconnect.record_failure();
                let delay = ctx.config.backoff.delay(attempts);
                info!("reconnecting in {:?} (attempt {})", delay, attempts);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    // an explicit connect() retries immediately; disconnect
                    // and shutdown are re-checked at the top of the loop
                    _ = desired.changed() => {}
                }
            }
        }
    }

    debug!("session supervisor exiting");
}

/// One connection attempt, through handshake and message loop
async fn connect_once(
    ctx: &SessionContext,
    outbound_rx: &mut mpsc::UnboundedReceiver<Frame>,
    desired: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let token = match ctx.config.token_provider.bearer_token().await {
        Ok(token) => token,
        Err(e) => {
            error!("token provider failed: {}", e);
            return SessionEnd::Failure;
        }
    };
    let url = ctx.config.endpoint.url(&token);

    let mut request = match url.as_str().into_client_request() {
        Ok(request) => request,
        Err(e) => {
            error!("failed to create request: {}", e);
            return SessionEnd::Failure;
        }
    };
    match SUBPROTOCOL.parse::<http::header::HeaderValue>() {
        Ok(value) => {
            request
                .headers_mut()
                .insert(http::header::SEC_WEBSOCKET_PROTOCOL, value);
        }
        Err(_) => warn!("invalid subprotocol value: {}", SUBPROTOCOL),
    }

    debug!("opening websocket to {}", ctx.config.endpoint.host());
    let (ws_stream, _) = match connect_async(request).await {
        Ok(connected) => connected,
        Err(e) => {
            error!("failed to connect: {}", e);
            return SessionEnd::Failure;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    if let Err(e) = handshake(&mut write, &mut read, &ctx.config).await {
        error!("handshake failed: {}", e);
        return SessionEnd::Failure;
    }
    info!("connected to {}", ctx.config.endpoint.host());

    // Frames queued while disconnected are stale: sends are best-effort and
    // the registry re-issues every live subscription during replay
    let mut stale = 0usize;
    while outbound_rx.try_recv().is_ok() {
        stale += 1;
    }
    if stale > 0 {
        debug!("dropped {} stale outbound frames", stale);
    }

    ctx.reconnect.set_connecting(false);
    ctx.reconnect.reset_failures();
    ctx.state.publish_connected();
    ctx.registry.replay_all();

    let (_hb_task, hb_shutdown, heartbeat_rx) =
        heartbeat::spawn_heartbeat(ctx.config.heartbeat_interval);

    let end = message_loop(&mut write, &mut read, ctx, outbound_rx, &heartbeat_rx, desired).await;

    let _ = hb_shutdown.send(());
    end
}

/// Send CONNECT and wait for the broker's CONNECTED frame
async fn handshake(write: &mut WsSink, read: &mut WsSource, config: &ClientConfig) -> Result<()> {
    let connect = Frame::connect(config.endpoint.host(), config.heartbeat_interval);
    write
        .send(Message::Text(connect.encode()))
        .await
        .map_err(|e| TopicSocketError::WebSocket(e.to_string()))?;

    let wait = config.handshake_timeout;
    let result = tokio::time::timeout(wait, async {
        loop {
            match read.next().await {
                Some(Ok(msg)) => {
                    let Some(text) = message_text(msg) else {
                        continue;
                    };
                    match Frame::parse(&text)? {
                        Some(frame) if frame.command == Command::Connected => return Ok(()),
                        Some(frame) if frame.command == Command::Error => {
                            let detail =
                                frame.header("message").unwrap_or(&frame.body).to_string();
                            return Err(TopicSocketError::Handshake(detail));
                        }
                        // heartbeats or frames racing ahead of CONNECTED
                        Some(_) | None => continue,
                    }
                }
                Some(Err(e)) => return Err(TopicSocketError::WebSocket(e.to_string())),
                None => {
                    return Err(TopicSocketError::ConnectionClosed(
                        "stream ended during handshake".into(),
                    ))
                }
            }
        }
    })
    .await;

    match result {
        Ok(outcome) => outcome,
        Err(_) => Err(TopicSocketError::Timeout(format!(
            "no CONNECTED frame within {:?}",
            wait
        ))),
    }
}

/// Main message processing loop for an established session
async fn message_loop(
    write: &mut WsSink,
    read: &mut WsSource,
    ctx: &SessionContext,
    outbound_rx: &mut mpsc::UnboundedReceiver<Frame>,
    heartbeat_rx: &Receiver<&'static str>,
    desired: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let idle_timeout = ctx.config.idle_timeout;
    let mut idle_deadline = Instant::now() + idle_timeout;

    loop {
        if !ctx.shutdown.load(Ordering::Acquire) {
            debug!("shutdown detected in message loop, closing session");
            teardown(write, ctx).await;
            return SessionEnd::Intended;
        }

        tokio::select! {
            // Inbound frames; any traffic (heartbeats included) refreshes
            // the idle deadline
            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        idle_deadline = Instant::now() + idle_timeout;
                        if let Some(text) = message_text(msg) {
                            handle_inbound(ctx, &text);
                        }
                    }
                    Some(Err(e)) => {
                        error!("websocket error: {}", e);
                        return SessionEnd::Failure;
                    }
                    None => {
                        warn!("websocket stream closed");
                        return SessionEnd::Failure;
                    }
                }
            }

            // Outbound frames from the registry and from send()
            frame = outbound_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = write.send(Message::Text(frame.encode())).await {
                            error!("failed to send frame: {}", e);
                            return SessionEnd::Failure;
                        }
                    }
                    None => {
                        debug!("outbound channel closed");
                        teardown(write, ctx).await;
                        return SessionEnd::Intended;
                    }
                }
            }

            // Heartbeats from the dedicated heartbeat task (crossbeam
            // channel, bridged with spawn_blocking + timeout)
            hb = async {
                let rx = heartbeat_rx.clone();
                tokio::task::spawn_blocking(move || {
                    rx.recv_timeout(Duration::from_millis(100))
                }).await.ok()
            } => {
                if let Some(Ok(payload)) = hb {
                    if let Err(e) = write.send(Message::Text(payload.to_string())).await {
                        error!("failed to send heartbeat: {}", e);
                        return SessionEnd::Failure;
                    }
                }
                // timeout is normal, continue the loop
            }

            // Explicit disconnect flips the desired flag
            changed = desired.changed() => {
                if changed.is_err() || !*desired.borrow_and_update() {
                    info!("disconnect requested, closing session");
                    teardown(write, ctx).await;
                    return SessionEnd::Intended;
                }
            }

            _ = tokio::time::sleep_until(idle_deadline) => {
                warn!(
                    "no inbound traffic within {:?}, treating connection as dead",
                    idle_timeout
                );
                return SessionEnd::Failure;
            }
        }
    }
}

/// Clean teardown for an intended disconnect
///
/// Wire subscriptions are unsubscribed individually before DISCONNECT; the
/// registry keeps the logical interest so a later connect replays it.
async fn teardown(write: &mut WsSink, ctx: &SessionContext) {
    for handle in ctx.registry.take_wire_handles() {
        let _ = write
            .send(Message::Text(Frame::unsubscribe(handle.id()).encode()))
            .await;
    }
    let _ = write.send(Message::Text(Frame::disconnect().encode())).await;
    let _ = write.close().await;
}

/// Dispatch one inbound text payload
fn handle_inbound(ctx: &SessionContext, text: &str) {
    match Frame::parse(text) {
        Ok(Some(frame)) => match frame.command {
            Command::Message => match frame.header("destination") {
                Some(destination) => ctx.registry.dispatch(destination, &frame.body),
                None => warn!("MESSAGE frame without destination header dropped"),
            },
            Command::Error => {
                let detail = frame
                    .header("message")
                    .unwrap_or(&frame.body)
                    .to_string();
                warn!("broker ERROR frame: {}", detail);
            }
            other => debug!("ignoring {} frame", other.as_str()),
        },
        Ok(None) => {} // inbound heartbeat; the idle deadline is already refreshed
        Err(e) => warn!("dropping malformed frame: {}", e),
    }
}

/// Extract the text payload of a WebSocket message, if any
fn message_text(msg: Message) -> Option<String> {
    match msg {
        Message::Text(text) => Some(text),
        Message::Binary(data) => String::from_utf8(data).ok(),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_state_failure_counting() {
        let state = ReconnectState::new();
        assert_eq!(state.failed_attempts(), 0);
        assert_eq!(state.record_failure(), 1);
        assert_eq!(state.record_failure(), 2);
        state.reset_failures();
        assert_eq!(state.failed_attempts(), 0);
    }

    #[test]
    fn test_desired_flag_round_trip() {
        let state = ReconnectState::new();
        assert!(!state.should_reconnect());
        state.request_run();
        assert!(state.should_reconnect());
        state.request_stop();
        assert!(!state.should_reconnect());
    }
}
