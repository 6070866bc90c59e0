//! Subscription registry: the single place subscriber interest lives.

pub mod registry;

pub use registry::{SubscriptionRegistry, TopicMessage, WireHandle};
