//! CLI, simulation-side client, relay runner
//!
//! This crate provides the `simlink` command-line interface and
//! [`SimulationClient`], the peer side of the relay protocol.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod socket;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
pub use socket::SimulationClient;
