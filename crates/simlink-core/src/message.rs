//! The simulation event message and its text codec.
//!
//! A message is up to four positional fields joined by a delimiter
//! (`:` by default):
//!
//! ```text
//! senderID:type:value:objectiveID
//! ```
//!
//! Fields are omitted from the right, so `c1:SIMULATION:RUNNING` is a
//! complete message without an objective. There is no escaping: a value
//! containing the delimiter (or the end-of-frame marker used by the wire
//! framing) cannot be represented.
//!
//! # Example
//!
//! ```rust
//! use simlink_core::{Message, MessageType};
//!
//! let msg = Message::decode("c1:OBJECTIVE_SCORE:42:obj-7");
//! assert_eq!(msg.sender_id.as_deref(), Some("c1"));
//! assert_eq!(msg.message_type, Some(MessageType::ObjectiveScore));
//! assert_eq!(msg.encode(), "c1:OBJECTIVE_SCORE:42:obj-7");
//! ```

use std::fmt;

/// Default field separator.
pub const DEFAULT_DELIMITER: char = ':';

/// Maximum number of positional fields in a message.
const FIELD_COUNT: usize = 4;

/// Well-known symbolic values carried in the `value` field.
pub mod values {
    /// The simulation is running (handshake announcement).
    pub const RUNNING: &str = "RUNNING";
    /// The launch page is listening (handshake reply).
    pub const LISTENING: &str = "LISTENING";
    /// Orderly stop.
    pub const STOPPED_NORMAL: &str = "STOPPED_NORMAL";
    /// Stop after a failure.
    pub const STOPPED_ABNORMAL: &str = "STOPPED_ABNORMAL";
    /// Objective completed.
    pub const COMPLETE: &str = "COMPLETE";
    /// Objective not (yet) completed.
    pub const INCOMPLETE: &str = "INCOMPLETE";
}

/// The kind of event a message carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Simulation status (`RUNNING`, or any stop value).
    Simulation,
    /// An objective changed completion state.
    ObjectiveCompletion,
    /// An objective received a score.
    ObjectiveScore,
    /// Launch page status, sent by the relay.
    LaunchPage,
    /// A type name outside the vocabulary, kept verbatim.
    Unrecognized(String),
}

impl MessageType {
    /// Parses a wire type name. Never fails: unknown names become
    /// [`MessageType::Unrecognized`].
    pub fn parse(name: &str) -> Self {
        match name {
            "SIMULATION" => Self::Simulation,
            "OBJECTIVE_COMPLETION" => Self::ObjectiveCompletion,
            "OBJECTIVE_SCORE" => Self::ObjectiveScore,
            "LAUNCH_PAGE" => Self::LaunchPage,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    /// Returns the wire name of this type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Simulation => "SIMULATION",
            Self::ObjectiveCompletion => "OBJECTIVE_COMPLETION",
            Self::ObjectiveScore => "OBJECTIVE_SCORE",
            Self::LaunchPage => "LAUNCH_PAGE",
            Self::Unrecognized(name) => name,
        }
    }

    /// Returns true for the objective event types.
    pub fn is_objective(&self) -> bool {
        matches!(self, Self::ObjectiveCompletion | Self::ObjectiveScore)
    }

    /// Returns true unless this is [`MessageType::Unrecognized`].
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discrete event exchanged between a simulation and the launch page.
///
/// Every field is optional; an absent `message_type` means the field was
/// missing or empty on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Identifies the originator of the message.
    pub sender_id: Option<String>,
    /// The event kind.
    pub message_type: Option<MessageType>,
    /// Symbolic value (`RUNNING`, `LISTENING`, ...) or a raw score.
    pub value: Option<String>,
    /// Objective the event refers to, for objective types.
    pub objective_id: Option<String>,
    delimiter: char,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            sender_id: None,
            message_type: None,
            value: None,
            objective_id: None,
            delimiter: DEFAULT_DELIMITER,
        }
    }
}

impl Message {
    /// Creates a message with sender, type and value.
    pub fn new(
        sender_id: impl Into<String>,
        message_type: MessageType,
        value: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: Some(sender_id.into()),
            message_type: Some(message_type),
            value: Some(value.into()),
            ..Default::default()
        }
    }

    /// Creates a `SIMULATION` status message.
    pub fn simulation(sender_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(sender_id, MessageType::Simulation, value)
    }

    /// Creates a `LAUNCH_PAGE` status message.
    pub fn launch_page(sender_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(sender_id, MessageType::LaunchPage, value)
    }

    /// Creates an `OBJECTIVE_COMPLETION` event.
    pub fn objective_completion(
        sender_id: impl Into<String>,
        objective_id: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(sender_id, MessageType::ObjectiveCompletion, value).with_objective(objective_id)
    }

    /// Creates an `OBJECTIVE_SCORE` event.
    pub fn objective_score(
        sender_id: impl Into<String>,
        objective_id: impl Into<String>,
        score: impl fmt::Display,
    ) -> Self {
        Self::new(sender_id, MessageType::ObjectiveScore, score.to_string())
            .with_objective(objective_id)
    }

    /// Builder: set the objective id.
    pub fn with_objective(mut self, objective_id: impl Into<String>) -> Self {
        self.objective_id = Some(objective_id.into());
        self
    }

    /// Builder: set the field delimiter used by [`Message::encode`].
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Returns the field delimiter.
    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Decodes a message using the default delimiter.
    pub fn decode(raw: &str) -> Self {
        Self::decode_with(raw, DEFAULT_DELIMITER)
    }

    /// Decodes a message split on `delimiter`.
    ///
    /// Only the first three delimiters split; anything after the third
    /// stays inside the objective id. Empty segments decode as absent.
    pub fn decode_with(raw: &str, delimiter: char) -> Self {
        let mut fields = raw
            .splitn(FIELD_COUNT, delimiter)
            .map(|field| (!field.is_empty()).then(|| field.to_string()));
        let mut next = || fields.next().flatten();

        let sender_id = next();
        let message_type = next().map(|name| MessageType::parse(&name));
        let value = next();
        let objective_id = next();

        Self {
            sender_id,
            message_type,
            value,
            objective_id,
            delimiter,
        }
    }

    /// Encodes the present fields, in order, joined by the delimiter.
    ///
    /// Absent fields contribute nothing. A message with no fields encodes
    /// to the empty string.
    pub fn encode(&self) -> String {
        self.encode_with(self.delimiter)
    }

    /// Encodes with an explicit delimiter, ignoring the message's own.
    pub fn encode_with(&self, delimiter: char) -> String {
        let fields = [
            self.sender_id.as_deref(),
            self.message_type.as_ref().map(MessageType::as_str),
            self.value.as_deref(),
            self.objective_id.as_deref(),
        ];

        let mut out = String::new();
        for field in fields.into_iter().flatten() {
            if !out.is_empty() {
                out.push(delimiter);
            }
            out.push_str(field);
        }
        out
    }

    /// Returns true when no field is present.
    pub fn is_empty(&self) -> bool {
        self.sender_id.is_none()
            && self.message_type.is_none()
            && self.value.is_none()
            && self.objective_id.is_none()
    }

    /// Returns true for a `SIMULATION:RUNNING` announcement.
    pub fn is_simulation_running(&self) -> bool {
        self.message_type == Some(MessageType::Simulation)
            && self.value.as_deref() == Some(values::RUNNING)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
