//! Client error types
//!
//! Connection errors stop at the connection manager: they are logged and handed to
//! registered observers, never returned from `ensure_connection` once a handshake is running.
//! Notification errors propagate to whoever asked for the data.

use sincronica_shared::ValidationError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Handshake with {url} failed: {reason}")]
    Handshake { url: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("No live connection")]
    NotConnected,

    #[error("Connection attempt cancelled")]
    Cancelled,

    #[error("No Tokio runtime available to drive the connection")]
    NoRuntime,
}

impl ConnectionError {
    /// Returns true if trying again later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ConnectionError::Handshake { .. } => true,
            ConnectionError::Transport(_) => true,
            ConnectionError::NotConnected => true,

            ConnectionError::Validation(_) => false,
            ConnectionError::Protocol(_) => false,
            ConnectionError::Cancelled => false,
            ConnectionError::NoRuntime => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notification API returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

impl NotificationError {
    /// Returns true if the request may succeed when retried
    pub fn is_transient(&self) -> bool {
        match self {
            NotificationError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            NotificationError::Status { status, .. } => {
                status.is_server_error()
                    || *status == reqwest::StatusCode::REQUEST_TIMEOUT
                    || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
        }
    }
}

pub type NotificationResult<T> = Result<T, NotificationError>;
