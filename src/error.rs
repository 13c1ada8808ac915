//! Error types for the streaming layer

use thiserror::Error;

/// Streaming layer errors
#[derive(Error, Debug)]
pub enum StreamError {
    /// A single malformed message. Logged and dropped, the stream continues.
    #[error("failed to decode message: {0}")]
    Decode(String),

    /// An account-scoped stream was requested before authentication completed.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The venue does not support the requested feature.
    #[error("{0} is not available on this venue")]
    NotAvailable(&'static str),

    #[error("balance refresh failed for {currency}: {reason}")]
    RefreshFailed { currency: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    /// The consumer fell behind its buffer bound and was disconnected.
    #[error("subscriber lagged behind by {skipped} messages")]
    Lagged { skipped: u64 },

    /// The underlying subscription or session is gone.
    #[error("stream closed")]
    Closed,

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        StreamError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
