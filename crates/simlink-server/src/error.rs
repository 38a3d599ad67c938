//! Server error types.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use simlink_protocol::{HandshakeError, ProtocolError};

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the relay.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be created.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// `accept_connection` was called without a listening socket.
    #[error("session is not listening")]
    NotListening,

    /// The listening socket failed while waiting for a peer.
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    /// The peer or the host closed the socket while the session was blocked.
    #[error("connection closed")]
    ConnectionClosed,

    /// The first exchange with the peer was rejected.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// Any other transport fault.
    #[error("connection error during {operation}: {source}")]
    Connection {
        operation: &'static str,
        #[source]
        source: ProtocolError,
    },

    /// A peer operation was attempted with no peer attached.
    #[error("no peer connection for {operation}")]
    NotConnected { operation: &'static str },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a transport error for the named operation.
    pub fn connection(operation: &'static str, source: ProtocolError) -> Self {
        Self::Connection { operation, source }
    }

    /// Returns true for the out-of-band close signal.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}
