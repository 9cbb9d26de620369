//! Error types for skillwire.

use thiserror::Error;

/// Main error type for all transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The underlying connection dropped mid-stream (zero-byte read/write
    /// or socket close). Carries the reason captured at the failure site.
    #[error("transport disconnected: {reason}")]
    Disconnected {
        /// Human-readable reason captured where the failure was observed.
        reason: String,
    },

    /// Header bytes failed to deserialize; the frame boundary is no longer
    /// trustworthy, so this is treated as a disconnect cause.
    #[error("malformed frame header: {0}")]
    MalformedHeader(String),

    /// `connect` called on a sender/receiver that already had a connection
    /// this lifetime. Connection objects are single-use.
    #[error("already connected")]
    AlreadyConnected,

    /// The send queue worker has stopped; no further packets can be posted.
    #[error("send queue closed")]
    QueueClosed,

    /// Empty or blank skill endpoint URL.
    #[error("invalid skill endpoint")]
    InvalidEndpoint,

    /// The remote side answered an exchange with a non-success status.
    #[error("request failed with status {status}")]
    RequestFailed {
        /// HTTP-like status code from the response envelope.
        status: u16,
    },

    /// A route handler failed while processing an inbound request.
    #[error("handler fault: {0}")]
    HandlerFault(String),

    /// MsgPack encode error for the wire envelope.
    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MsgPack decode error for the wire envelope.
    #[error("decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// JSON error (response bodies: resource ids, fault detail).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransportError {
    /// Shorthand for a disconnect with the given reason.
    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self::Disconnected {
            reason: reason.into(),
        }
    }
}

/// Result type alias using TransportError.
pub type Result<T> = std::result::Result<T, TransportError>;
