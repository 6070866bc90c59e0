pub mod states;

use crate::client::TopicClient;
use crate::config::{ClientConfig, Endpoint, DEFAULT_PATH};
use crate::traits::{BackoffPolicy, SteppedBackoff, TokenProvider};
use states::*;
use std::sync::Arc;
use std::time::Duration;

/// Type-state builder for [`TopicClient`]
///
/// This builder uses Rust's type system to enforce that required fields
/// (endpoint host and token provider) are set before the client can be
/// built. Everything else has sensible defaults matching the broker's
/// expectations: stepped backoff, 10 s heartbeats, raw-WebSocket path.
pub struct ClientBuilder<E, T>
where
    E: EndpointState,
    T: TokenState,
{
    _state: TypeState<E, T>,
    host: Option<String>,
    secure: bool,
    path: String,
    token_provider: Option<Arc<dyn TokenProvider>>,
    backoff: Option<Box<dyn BackoffPolicy>>,
    heartbeat_interval: Duration,
    handshake_timeout: Duration,
    idle_timeout: Duration,
}

impl ClientBuilder<NoEndpoint, NoToken> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            host: None,
            secure: false,
            path: DEFAULT_PATH.to_string(),
            token_provider: None,
            backoff: None,
            heartbeat_interval: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for ClientBuilder<NoEndpoint, NoToken> {
    fn default() -> Self {
        Self::new()
    }
}

// Endpoint setting
impl<T> ClientBuilder<NoEndpoint, T>
where
    T: TokenState,
{
    /// Set the broker host (`host[:port]`, no scheme)
    pub fn host(self, host: impl Into<String>) -> ClientBuilder<HasEndpoint, T> {
        ClientBuilder {
            _state: TypeState::new(),
            host: Some(host.into()),
            secure: self.secure,
            path: self.path,
            token_provider: self.token_provider,
            backoff: self.backoff,
            heartbeat_interval: self.heartbeat_interval,
            handshake_timeout: self.handshake_timeout,
            idle_timeout: self.idle_timeout,
        }
    }
}

// Token provider setting
impl<E> ClientBuilder<E, NoToken>
where
    E: EndpointState,
{
    /// Set the credential provider consulted on every connection attempt
    pub fn token_provider(
        self,
        provider: impl TokenProvider + 'static,
    ) -> ClientBuilder<E, HasToken> {
        ClientBuilder {
            _state: TypeState::new(),
            host: self.host,
            secure: self.secure,
            path: self.path,
            token_provider: Some(Arc::new(provider)),
            backoff: self.backoff,
            heartbeat_interval: self.heartbeat_interval,
            handshake_timeout: self.handshake_timeout,
            idle_timeout: self.idle_timeout,
        }
    }
}

// Optional configuration methods
impl<E, T> ClientBuilder<E, T>
where
    E: EndpointState,
    T: TokenState,
{
    /// Use `wss://` instead of `ws://`
    ///
    /// Follow the scheme of the context the client runs in: a page served
    /// over https talks to the broker over wss.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Override the upgrade path (default `websocket/websocket`)
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Override the backoff policy (default [`SteppedBackoff`])
    pub fn backoff(mut self, policy: impl BackoffPolicy + 'static) -> Self {
        self.backoff = Some(Box::new(policy));
        self
    }

    /// Outgoing heartbeat cadence (default 10 s)
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// How long to wait for the broker's CONNECTED frame (default 10 s)
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Inbound-silence window after which the connection is presumed dead
    /// (default 30 s; must comfortably exceed the heartbeat interval)
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

// Build method - only available when all required fields are set
impl ClientBuilder<HasEndpoint, HasToken> {
    /// Build the client and spawn its session supervisor
    ///
    /// Must be called within a Tokio runtime; the supervisor task and
    /// deferred-subscribe waiters are spawned onto it.
    pub fn build(self) -> TopicClient {
        let host = self.host.expect("host must be set");
        let token_provider = self.token_provider.expect("token provider must be set");
        let backoff = self
            .backoff
            .unwrap_or_else(|| Box::new(SteppedBackoff));

        let config = ClientConfig {
            endpoint: Endpoint {
                host,
                secure: self.secure,
                path: self.path,
            },
            token_provider,
            backoff,
            heartbeat_interval: self.heartbeat_interval,
            handshake_timeout: self.handshake_timeout,
            idle_timeout: self.idle_timeout,
        };

        TopicClient::new(config)
    }
}
