//! Core client machinery: configuration, frame codec, connection state,
//! transport session, and the public facade.

pub mod builder;
pub mod client;
pub mod config;
pub mod frame;
pub mod heartbeat;
pub mod session;
pub mod state;

// Re-export main types
pub use builder::ClientBuilder;
pub use client::TopicClient;
pub use config::{ClientConfig, Endpoint, DEFAULT_PATH, SUBPROTOCOL};
pub use frame::{Command, Frame};
pub use state::{ConnectionState, StateCell};

// Re-export traits for convenience
pub use crate::traits::*;

/// Create a new topic client builder
///
/// This is a convenience function for starting the builder pattern.
///
/// # Example
/// ```ignore
/// let client = topicsocket::builder()
///     .host("broker.example.org:8080")
///     .token_provider(StaticToken::new("token"))
///     .backoff(SteppedBackoff)
///     .build();
/// ```
pub fn builder() -> builder::ClientBuilder<builder::states::NoEndpoint, builder::states::NoToken> {
    builder::ClientBuilder::new()
}
