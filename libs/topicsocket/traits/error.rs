use thiserror::Error;

/// Main error type for topicsocket
#[derive(Error, Debug)]
pub enum TopicSocketError {
    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Connection closed unexpectedly
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// STOMP handshake failed (no CONNECTED frame, or broker sent ERROR)
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Malformed STOMP frame
    #[error("Frame error: {0}")]
    Frame(String),

    /// Credential provider failed to produce a token
    #[error("Token error: {0}")]
    Token(String),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Result type for topicsocket operations
pub type Result<T> = std::result::Result<T, TopicSocketError>;
