//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while framing messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame grew past the configured limit before its terminator arrived.
    #[error("frame too large: more than {max} bytes without end-of-message marker")]
    FrameTooLarge { max: usize },

    /// Stream ended in the middle of a frame.
    #[error("incomplete frame: stream closed after {received} bytes")]
    IncompleteFrame { received: usize },

    /// Delimiter/terminator combination cannot be framed.
    #[error("invalid wire format: {0}")]
    InvalidWireFormat(String),

    /// IO error during read/write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a handshake exchange is rejected.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The peer's first frame was not a valid announcement or reply.
    #[error("invalid handshake message {raw:?}: {reason}")]
    InvalidMessage { raw: String, reason: &'static str },

    /// The peer did not complete the handshake in time.
    #[error("handshake timed out")]
    Timeout,
}

impl HandshakeError {
    pub(crate) fn invalid(raw: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidMessage {
            raw: raw.into(),
            reason,
        }
    }
}
