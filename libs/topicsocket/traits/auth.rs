use crate::error::Result;
use async_trait::async_trait;

/// Trait for supplying the bearer token used to authenticate a connection
///
/// The token is appended to the connection URL as the `access_token` query
/// parameter. The provider is consulted once per connection attempt, so an
/// implementation backed by a refreshing credential store will naturally
/// hand out a fresh token on every reconnect.
///
/// Token acquisition itself (login flows, refresh, storage) lives outside
/// this crate; implementors only expose the current token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Get the current bearer token
    ///
    /// # Returns
    /// * `Ok(token)` - Token to append to the connection URL
    /// * `Err(TopicSocketError)` - No token available; the attempt counts
    ///   as a connection failure and backoff applies
    async fn bearer_token(&self) -> Result<String>;
}

/// A token provider that always returns the same fixed token
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn bearer_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}
