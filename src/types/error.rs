//! Error types for link operations

use thiserror::Error;

/// Result type for link operations
pub type LinkResult<T> = Result<T, LinkError>;

/// Errors that can occur while driving the link
#[derive(Debug, Error)]
pub enum LinkError {
    /// The configured page origin cannot be turned into a WebSocket URL
    #[error("invalid origin: {0}")]
    InvalidOrigin(String),

    /// A frame or envelope could not be decoded
    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Socket-level failure reported by the transport
    #[error("transport error: {0}")]
    Transport(String),

    /// The link was stopped by a terminal close or an explicit shutdown
    #[error("link is halted")]
    Halted,

    /// A configuration value could not be parsed
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for LinkError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        LinkError::Transport(e.to_string())
    }
}
