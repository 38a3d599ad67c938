//! Relay configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use simlink_core::DEFAULT_DELIMITER;
use simlink_protocol::{DEFAULT_END_OF_MESSAGE, DEFAULT_PORT, MAX_FRAME_SIZE, WireFormat};

use crate::error::{ServerError, ServerResult};

/// Relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address to listen on. Loopback unless the simulation runs elsewhere.
    pub bind_address: IpAddr,

    /// TCP port; 0 picks an ephemeral port.
    pub port: u16,

    /// Field separator inside a frame.
    pub delimiter: char,

    /// Single ASCII character terminating every frame.
    pub end_of_message: char,

    /// Maximum frame length in bytes.
    pub max_frame_size: usize,

    /// Seconds a new peer has to complete the handshake. `None` waits forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handshake_timeout_secs: Option<u64>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            delimiter: DEFAULT_DELIMITER,
            end_of_message: DEFAULT_END_OF_MESSAGE,
            max_frame_size: MAX_FRAME_SIZE,
            handshake_timeout_secs: Some(30),
        }
    }
}

impl RelayConfig {
    /// Creates a configuration listening on the given port.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Builder: set the bind address.
    pub fn with_bind_address(mut self, address: IpAddr) -> Self {
        self.bind_address = address;
        self
    }

    /// Builder: set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder: set the field delimiter.
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Builder: set the end-of-message marker.
    pub fn with_end_of_message(mut self, marker: char) -> Self {
        self.end_of_message = marker;
        self
    }

    /// Builder: set the maximum frame size.
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Builder: set or disable the handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout_secs = timeout.map(|t| t.as_secs().max(1));
        self
    }

    /// Returns the handshake timeout.
    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_secs.map(Duration::from_secs)
    }

    /// Returns the address to bind.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Builds the wire format, validating delimiter and marker.
    pub fn wire_format(&self) -> ServerResult<WireFormat> {
        if self.max_frame_size == 0 {
            return Err(ServerError::config("max_frame_size must be greater than zero"));
        }
        WireFormat::new(self.delimiter, self.end_of_message)
            .map(|wire| wire.with_max_frame_size(self.max_frame_size))
            .map_err(|e| ServerError::config(e.to_string()))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ServerResult<()> {
        self.wire_format().map(|_| ())
    }
}
