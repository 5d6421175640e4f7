//! Error types for feed operations.

use thiserror::Error;

/// Errors that can occur during feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
    /// No token was supplied, or the server rejected it. Callers must not
    /// retry without a fresh token.
    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    #[error("WebSocket disconnected: {0}")]
    Disconnected(String),

    #[error("subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("failed to parse message: {0}")]
    MalformedMessage(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("channel closed")]
    ChannelClosed,
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error;

        // An HTTP rejection during the handshake carries the auth verdict.
        if let Error::Http(response) = &err {
            let status = response.status();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return FeedError::AuthenticationRequired(format!(
                    "server rejected handshake with status {status}"
                ));
            }
        }
        FeedError::ConnectionFailed(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::MalformedMessage(err.to_string())
    }
}

impl From<url::ParseError> for FeedError {
    fn from(err: url::ParseError) -> Self {
        FeedError::ConnectionFailed(err.to_string())
    }
}

impl FeedError {
    /// Returns true if this error is transient and likely to succeed on retry.
    /// The transport's reconnect loop only retries transient errors.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FeedError::ConnectionFailed(_) | FeedError::Disconnected(_) | FeedError::Timeout(_)
        )
    }

    /// Returns true if this error is permanent and must surface to the caller.
    /// Permanent errors are never retried automatically.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            FeedError::AuthenticationRequired(_) | FeedError::ChannelClosed
        )
    }
}
