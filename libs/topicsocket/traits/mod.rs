//! # Topicsocket Traits
//!
//! Core traits and types for the topicsocket client:
//!
//! - **TokenProvider**: supply the bearer token for connection auth
//! - **BackoffPolicy**: map consecutive failures to a reconnect delay
//!
//! Both are seams for embedders; the crate ships a trivial implementation
//! of each (`StaticToken`, `SteppedBackoff`).

pub mod auth;
pub mod backoff;
pub mod error;

// Re-export commonly used types
pub use auth::{StaticToken, TokenProvider};
pub use backoff::{BackoffPolicy, FixedDelay, SteppedBackoff};
pub use error::{Result, TopicSocketError};
