use crate::traits::{BackoffPolicy, TokenProvider};
use std::sync::Arc;
use std::time::Duration;

/// Fixed WebSocket upgrade path on the broker host
///
/// The path names `websocket` twice because the broker exposes STOMP both
/// through SockJS and directly; the second segment selects the raw
/// WebSocket transport.
pub const DEFAULT_PATH: &str = "websocket/websocket";

/// STOMP subprotocol offered during the WebSocket upgrade
pub const SUBPROTOCOL: &str = "v12.stomp";

/// Broker endpoint the client connects to
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub(crate) host: String,
    pub(crate) secure: bool,
    pub(crate) path: String,
}

impl Endpoint {
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Full connection URL for one attempt, with the bearer token appended
    pub fn url(&self, token: &str) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!(
            "{}://{}/{}?access_token={}",
            scheme, self.host, self.path, token
        )
    }
}

/// Configuration for a [`TopicClient`](crate::client::TopicClient)
///
/// Built through the type-state builder; see [`crate::builder`].
pub struct ClientConfig {
    pub(crate) endpoint: Endpoint,

    /// External credential provider, consulted once per connection attempt
    pub(crate) token_provider: Arc<dyn TokenProvider>,

    /// Maps consecutive failed attempts to the wait before the next one
    pub(crate) backoff: Box<dyn BackoffPolicy>,

    /// Outgoing heartbeat cadence, also advertised in the CONNECT frame
    pub(crate) heartbeat_interval: Duration,

    /// How long to wait for the broker's CONNECTED frame
    pub(crate) handshake_timeout: Duration,

    /// Inbound silence (frames and heartbeats both count as traffic) after
    /// which the connection is treated as dead
    pub(crate) idle_timeout: Duration,
}

impl ClientConfig {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }
}
