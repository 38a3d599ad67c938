//! Core types: the simulation event message codec and tracing setup

pub mod message;
pub mod tracing;

pub use message::{DEFAULT_DELIMITER, Message, MessageType, values};
pub use tracing::{LogFormat, TracingConfig, TracingError, init_tracing};
