//! Client error types.

use thiserror::Error;

use simlink_core::TracingError;
use simlink_protocol::{HandshakeError, ProtocolError};
use simlink_server::ServerError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection to the relay failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The relay rejected or garbled the handshake.
    #[error("handshake rejected: {0}")]
    Handshake(#[from] HandshakeError),

    /// Framing error on an established connection.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// An operation did not complete in time.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The relay could not be started.
    #[error("relay error: {0}")]
    Relay(#[from] ServerError),

    /// Logging could not be initialized.
    #[error("logging setup failed: {0}")]
    Tracing(#[from] TracingError),

    /// Invalid command-line input.
    #[error("invalid argument: {0}")]
    Usage(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
