//! Handshake messages and their validation.
//!
//! The simulation opens with a byte-order byte followed by a
//! `SIMULATION:RUNNING` announcement; the relay accepts with a
//! `LAUNCH_PAGE:LISTENING` reply carrying its own session id.

use simlink_core::{Message, MessageType, values};

use crate::error::HandshakeError;

/// Byte-order preference announced in the first handshake byte.
///
/// Recorded for the session but not applied: every frame is text, so there
/// is no multi-byte payload to reorder yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ByteOrderPreference {
    #[default]
    Native,
    Reversed,
}

impl ByteOrderPreference {
    pub fn from_byte(byte: u8) -> Self {
        if byte == 1 {
            Self::Reversed
        } else {
            Self::Native
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Native => 0,
            Self::Reversed => 1,
        }
    }

    pub fn is_reversed(self) -> bool {
        self == Self::Reversed
    }
}

/// The announcement a simulation sends after the byte-order byte.
pub fn handshake_request(client_id: impl Into<String>) -> Message {
    Message::simulation(client_id, values::RUNNING)
}

/// The relay's reply to a valid announcement.
pub fn handshake_reply(server_id: impl Into<String>) -> Message {
    Message::launch_page(server_id, values::LISTENING)
}

/// Checks a client announcement and returns the client's sender id.
pub fn validate_request(message: &Message) -> Result<&str, HandshakeError> {
    expect(message, MessageType::Simulation, values::RUNNING)
}

/// Checks the relay's reply and returns the relay's session id.
pub fn validate_reply(message: &Message) -> Result<&str, HandshakeError> {
    expect(message, MessageType::LaunchPage, values::LISTENING)
}

fn expect<'a>(
    message: &'a Message,
    message_type: MessageType,
    value: &str,
) -> Result<&'a str, HandshakeError> {
    if message.message_type.as_ref() != Some(&message_type) {
        return Err(HandshakeError::invalid(
            message.encode(),
            match message_type {
                MessageType::LaunchPage => "expected LAUNCH_PAGE type",
                _ => "expected SIMULATION type",
            },
        ));
    }
    if message.value.as_deref() != Some(value) {
        return Err(HandshakeError::invalid(
            message.encode(),
            match message_type {
                MessageType::LaunchPage => "expected LISTENING value",
                _ => "expected RUNNING value",
            },
        ));
    }
    match message.sender_id.as_deref() {
        Some(id) => Ok(id),
        None => Err(HandshakeError::invalid(message.encode(), "missing sender id")),
    }
}
