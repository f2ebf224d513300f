//! Error types for the riskstream client

use thiserror::Error;

/// Errors that can occur while talking to the vendor API
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network/HTTP error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Authentication rejected by the auth or stream endpoint
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Token response body missing required fields
    #[error("Malformed token response: {0}")]
    MalformedTokenResponse(String),

    /// Rate limited by server
    #[error("Rate limited: retry after {0}s")]
    RateLimited(u64),

    /// Unexpected status from the server
    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    /// Stream closed by the peer
    #[error("Connection closed")]
    ConnectionClosed,

    /// Reconnect budget spent
    #[error("Giving up after {0} consecutive connection failures")]
    RetriesExhausted(u32),
}

impl ClientError {
    /// Check if this is an authentication failure
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            ClientError::Auth(_) | ClientError::MalformedTokenResponse(_)
        )
    }

    /// Check if this error is retryable via reconnect + backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Network(_)
                | ClientError::RateLimited(_)
                | ClientError::Server { .. }
                | ClientError::ConnectionClosed
        )
    }

    /// Create a server error from status and message
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        ClientError::Server {
            status,
            message: message.into(),
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
