//! Common test utilities for topicsocket integration tests
//!
//! Provides an in-process mock STOMP broker: it accepts WebSocket
//! connections, answers the CONNECT handshake, records every frame it
//! receives, and can push MESSAGE frames or drop connections on demand.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use topicsocket::frame::{Command, Frame};

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

enum ServerCmd {
    Push { destination: String, body: String },
    Drop,
}

#[derive(Default)]
struct BrokerInner {
    /// Every frame received, in arrival order, across all connections
    frames: Mutex<Vec<Frame>>,
    /// Destinations whose wire subscription was explicitly unsubscribed
    unsubscribed: Mutex<Vec<String>>,
    /// Command channels of currently open connections
    sessions: Mutex<Vec<mpsc::UnboundedSender<ServerCmd>>>,
    /// Completed CONNECT/CONNECTED handshakes
    handshakes: AtomicUsize,
    /// Bare-EOL heartbeat frames received
    heartbeats: AtomicUsize,
    /// When set, CONNECT is answered with an ERROR frame
    reject_handshake: AtomicBool,
    /// URI of the most recent WebSocket upgrade request
    last_request_uri: Mutex<Option<String>>,
    /// Subprotocol offered in the most recent upgrade request
    last_subprotocol: Mutex<Option<String>>,
}

/// A mock STOMP-over-WebSocket broker for testing
pub struct MockBroker {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    inner: Arc<BrokerInner>,
}

impl MockBroker {
    /// Create and start a new mock broker
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let inner = Arc::new(BrokerInner::default());
        let shutdown_clone = shutdown.clone();
        let inner_clone = Arc::clone(&inner);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let inner = Arc::clone(&inner_clone);
                                let shutdown = shutdown_clone.clone();
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, inner, shutdown).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_clone.notified() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown,
            inner,
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        inner: Arc<BrokerInner>,
        shutdown: Arc<Notify>,
    ) {
        let inner_cb = Arc::clone(&inner);
        let callback = move |req: &Request, mut response: Response| {
            *inner_cb.last_request_uri.lock() = Some(req.uri().to_string());
            let offered = req
                .headers()
                .get("sec-websocket-protocol")
                .and_then(|value| value.to_str().ok())
                .map(String::from);
            // Echo the offered subprotocol back so the client's tungstenite
            // handshake accepts the negotiated protocol.
            if let Some(proto) = &offered {
                if let Ok(value) = proto.parse() {
                    response
                        .headers_mut()
                        .insert("sec-websocket-protocol", value);
                }
            }
            *inner_cb.last_subprotocol.lock() = offered;
            Ok(response)
        };

        let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("websocket handshake failed: {}", e);
                return;
            }
        };
        let (mut write, mut read) = ws_stream.split();

        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        inner.sessions.lock().push(cmd_tx);

        // destination -> subscription id, for this connection only
        let mut local_subs: HashMap<String, String> = HashMap::new();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match Frame::parse(&text) {
                                Ok(Some(frame)) => {
                                    inner.frames.lock().push(frame.clone());
                                    match frame.command {
                                        Command::Connect => {
                                            if inner.reject_handshake.load(Ordering::Acquire) {
                                                let error = Frame::new(
                                                    Command::Error,
                                                    vec![("message".into(), "refused".into())],
                                                    "",
                                                );
                                                let _ = write.send(Message::Text(error.encode())).await;
                                                break;
                                            }
                                            inner.handshakes.fetch_add(1, Ordering::AcqRel);
                                            let connected = Frame::new(
                                                Command::Connected,
                                                vec![("version".into(), "1.2".into())],
                                                "",
                                            );
                                            if write.send(Message::Text(connected.encode())).await.is_err() {
                                                break;
                                            }
                                        }
                                        Command::Subscribe => {
                                            if let (Some(dest), Some(id)) =
                                                (frame.header("destination"), frame.header("id"))
                                            {
                                                local_subs.insert(dest.to_string(), id.to_string());
                                            }
                                        }
                                        Command::Unsubscribe => {
                                            if let Some(id) = frame.header("id") {
                                                if let Some(dest) = local_subs
                                                    .iter()
                                                    .find(|(_, sub_id)| sub_id.as_str() == id)
                                                    .map(|(dest, _)| dest.clone())
                                                {
                                                    local_subs.remove(&dest);
                                                    inner.unsubscribed.lock().push(dest);
                                                }
                                            }
                                        }
                                        _ => {}
                                    }
                                }
                                Ok(None) => {
                                    inner.heartbeats.fetch_add(1, Ordering::AcqRel);
                                }
                                Err(e) => {
                                    eprintln!("broker received malformed frame: {}", e);
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    }
                }
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(ServerCmd::Push { destination, body }) => {
                            if let Some(id) = local_subs.get(&destination) {
                                let message = Frame::new(
                                    Command::Message,
                                    vec![
                                        ("destination".into(), destination.clone()),
                                        ("subscription".into(), id.clone()),
                                    ],
                                    body,
                                );
                                if write.send(Message::Text(message.encode())).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(ServerCmd::Drop) | None => break,
                    }
                }
                _ = shutdown.notified() => break,
            }
        }
    }

    /// Host string (`127.0.0.1:port`) for the client builder
    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    /// Snapshot of every frame received so far
    pub fn frames(&self) -> Vec<Frame> {
        self.inner.frames.lock().clone()
    }

    /// Number of SUBSCRIBE frames received for a destination
    pub fn subscribe_count(&self, destination: &str) -> usize {
        self.inner
            .frames
            .lock()
            .iter()
            .filter(|frame| {
                frame.command == Command::Subscribe
                    && frame.header("destination") == Some(destination)
            })
            .count()
    }

    /// Number of SEND frames received for a destination
    pub fn send_count(&self, destination: &str) -> usize {
        self.inner
            .frames
            .lock()
            .iter()
            .filter(|frame| {
                frame.command == Command::Send
                    && frame.header("destination") == Some(destination)
            })
            .count()
    }

    /// Destinations explicitly unsubscribed, in order
    pub fn unsubscribed(&self) -> Vec<String> {
        self.inner.unsubscribed.lock().clone()
    }

    /// Number of DISCONNECT frames received
    pub fn disconnect_count(&self) -> usize {
        self.inner
            .frames
            .lock()
            .iter()
            .filter(|frame| frame.command == Command::Disconnect)
            .count()
    }

    /// Completed STOMP handshakes so far
    pub fn handshake_count(&self) -> usize {
        self.inner.handshakes.load(Ordering::Acquire)
    }

    /// Heartbeat frames received so far
    pub fn heartbeat_count(&self) -> usize {
        self.inner.heartbeats.load(Ordering::Acquire)
    }

    /// Make the broker answer CONNECT with an ERROR frame
    pub fn set_reject_handshake(&self, reject: bool) {
        self.inner
            .reject_handshake
            .store(reject, Ordering::Release);
    }

    /// URI of the most recent upgrade request
    pub fn last_request_uri(&self) -> Option<String> {
        self.inner.last_request_uri.lock().clone()
    }

    /// Subprotocol offered in the most recent upgrade request
    pub fn last_subprotocol(&self) -> Option<String> {
        self.inner.last_subprotocol.lock().clone()
    }

    /// Deliver a MESSAGE frame to every connection subscribed to the
    /// destination
    pub fn push_message(&self, destination: &str, body: &str) {
        let sessions = self.inner.sessions.lock();
        for session in sessions.iter() {
            let _ = session.send(ServerCmd::Push {
                destination: destination.to_string(),
                body: body.to_string(),
            });
        }
    }

    /// Abruptly drop every open connection
    pub fn drop_connections(&self) {
        let sessions = self.inner.sessions.lock();
        for session in sessions.iter() {
            let _ = session.send(ServerCmd::Drop);
        }
    }

    /// Shutdown the broker
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockBroker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Poll a condition until it holds or the timeout elapses
pub async fn wait_for<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
