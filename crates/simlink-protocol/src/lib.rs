//! Line framing and handshake rules for the simulation relay protocol.
//!
//! # Protocol Overview
//!
//! A simulation connects to the relay over TCP and sends:
//! - 1 byte: byte-order preference (`0x01` = reversed, anything else native)
//! - a handshake frame: `<clientID>:SIMULATION:RUNNING\n`
//!
//! The relay answers `<serverID>:LAUNCH_PAGE:LISTENING\n`, after which the
//! simulation streams event frames:
//!
//! ```text
//! <clientID>:OBJECTIVE_COMPLETION:<value>:<objectiveID>\n
//! <clientID>:OBJECTIVE_SCORE:<value>:<objectiveID>\n
//! <clientID>:SIMULATION:STOPPED_NORMAL\n
//! ```
//!
//! Frames are ASCII text terminated by a single end-of-message byte. The
//! delimiter and terminator are configurable through [`WireFormat`] but
//! fixed for the lifetime of a connection.

mod error;
mod framing;
mod handshake;

pub use error::{HandshakeError, ProtocolError, ProtocolResult};
pub use framing::{FrameReader, FrameWriter, WireFormat};
pub use handshake::{
    ByteOrderPreference, handshake_reply, handshake_request, validate_reply, validate_request,
};

/// Default TCP port the relay listens on.
pub const DEFAULT_PORT: u16 = 4444;

/// Default end-of-message marker.
pub const DEFAULT_END_OF_MESSAGE: char = '\n';

/// Default maximum frame length in bytes, terminator excluded (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;
