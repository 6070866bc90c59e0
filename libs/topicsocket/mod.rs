//! # Topicsocket
//!
//! A resilient topic pub/sub client over a single managed
//! STOMP-over-WebSocket session.
//!
//! ## Features
//!
//! - **One durable session**: exactly one socket at a time, owned end to
//!   end by a supervisor task
//! - **Topic multiplexing**: reference-counted logical subscriptions share
//!   wire-level subscriptions; inbound frames fan out per topic
//! - **Transparent recovery**: stepped backoff reconnects, with every
//!   remembered topic subscription replayed after each reconnect
//! - **Latest-cached state stream**: connection transitions observable
//!   synchronously and as a hot stream
//! - **Forgiving decode**: JSON bodies decode to structured values, with a
//!   raw-text fallback that never poisons the pipeline

pub mod core;
pub mod registry;
pub mod traits;

// Re-export all traits
pub use traits::*;

// Re-export core client functionality
pub use self::core::{
    builder, client, config, frame, heartbeat, session, state,
    builder::ClientBuilder,
    client::TopicClient,
    config::{ClientConfig, Endpoint, DEFAULT_PATH, SUBPROTOCOL},
    frame::{Command, Frame},
    state::{ConnectionState, StateCell},
};

// Re-export the registry
pub use self::registry::{SubscriptionRegistry, TopicMessage, WireHandle};

// Convenience function
pub use self::core::builder as client_builder;

/// Type alias for Result with TopicSocketError
pub type Result<T> = std::result::Result<T, traits::TopicSocketError>;
