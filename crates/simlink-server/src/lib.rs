//! Relay: session state machine, accept/serve loop, sink forwarding.
//!
//! This crate provides the relay that sits between a running simulation
//! and the page that launched it:
//! - A [`Session`] owning the listening socket and one simulation peer
//! - A [`RelayLoop`] that accepts peers, runs the handshake and forwards
//!   objective and stop events to a [`Sink`]
//! - Out-of-band control through [`ShutdownHandle`] and [`SocketCloser`]
//!
//! # Example
//!
//! ```rust,no_run
//! use simlink_server::{ChannelSink, RelayConfig, spawn_relay};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (sink, mut events) = ChannelSink::new();
//!     let relay = spawn_relay(RelayConfig::default(), sink).await?;
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{event}");
//!     }
//!     relay.join().await;
//!     Ok(())
//! }
//! ```

mod config;
mod control;
mod error;
mod relay;
mod session;
mod sink;

#[cfg(test)]
mod testing;

pub use config::RelayConfig;
pub use control::{RunningController, RunningFlag, ShutdownHandle, SocketCloser};
pub use error::{ServerError, ServerResult};
pub use relay::{RelayExit, RelayHandle, RelayLoop, spawn_relay};
pub use session::{Session, SessionState};
pub use sink::{ChannelSink, ERROR_PREFIX, Sink, error_text};
