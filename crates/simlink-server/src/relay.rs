//! The accept/serve loop that forwards simulation events to the host.
//!
//! One [`RelayLoop`] runs per hosting context, on a single task. Each
//! iteration serves one simulation connection from handshake to close:
//!
//! - the handshake announcement is forwarded as the session-open notice;
//! - objective events are forwarded and the connection kept;
//! - a `SIMULATION` message with any value but `RUNNING` is forwarded and
//!   ends the connection normally;
//! - anything else is logged and dropped.
//!
//! The loop exits when its [`RunningController`] reports stopped (checked
//! between connections), when the listening socket is closed out of band,
//! or on a transport failure it cannot recover from.

use std::net::SocketAddr;

use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use simlink_core::{Message, MessageType};

use crate::config::RelayConfig;
use crate::control::{RunningController, RunningFlag, ShutdownHandle};
use crate::error::ServerResult;
use crate::session::{Session, SessionState};
use crate::sink::Sink;

/// How the relay loop ended. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayExit {
    /// Stopped by the host or the running controller.
    Normal,
    /// Stopped by a bind, accept, transport or close failure.
    Abnormal,
}

impl RelayExit {
    pub fn is_normal(self) -> bool {
        self == Self::Normal
    }
}

enum Cycle {
    Continue,
    Stop(RelayExit),
}

#[derive(PartialEq, Eq)]
enum ConnectionEnd {
    /// Peer or host closed, or the simulation said it stopped.
    Normal,
    /// Unrecoverable; the relay stops after teardown.
    Fatal,
}

/// Drives a [`Session`] across repeated simulation connections.
pub struct RelayLoop<C, S> {
    session: Session,
    running: C,
    sink: S,
    span: Span,
}

impl<C: RunningController, S: Sink> RelayLoop<C, S> {
    /// Creates a relay loop. `span` is the logging context for the loop;
    /// each connection gets a child span.
    pub fn new(session: Session, running: C, sink: S, span: Span) -> Self {
        Self {
            session,
            running,
            sink,
            span,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs until stopped and reports how the loop ended.
    pub async fn run(mut self) -> RelayExit {
        let span = self.span.clone();
        let exit = self.run_cycles().instrument(span.clone()).await;
        span.in_scope(|| match exit {
            RelayExit::Normal => info!("relay stopped"),
            RelayExit::Abnormal => warn!("relay stopped abnormally"),
        });
        exit
    }

    async fn run_cycles(&mut self) -> RelayExit {
        let mut cycle: u64 = 0;

        while self.running.is_running() {
            if !self.session.is_listening() {
                if let Err(e) = self.session.listen().await {
                    error!(error = %e, "cannot open listening socket");
                    return RelayExit::Abnormal;
                }
            }

            cycle += 1;
            let span = info_span!("connection", cycle);
            if let Cycle::Stop(exit) = self.serve_connection().instrument(span).await {
                return exit;
            }
        }

        debug!(cycles = cycle, "running controller reports stopped");
        RelayExit::Normal
    }

    async fn serve_connection(&mut self) -> Cycle {
        let announcement = match self.session.accept_connection().await {
            Ok(message) => message,
            Err(e) if self.session.has_peer() => {
                warn!(
                    error = %e,
                    state = %self.session.state(),
                    "connection attempt failed, waiting for the next peer"
                );
                return match self.teardown(false).await {
                    true => Cycle::Continue,
                    false => Cycle::Stop(RelayExit::Abnormal),
                };
            }
            Err(e) if e.is_connection_closed() => {
                info!("listening socket closed, relay stopping");
                return Cycle::Stop(RelayExit::Normal);
            }
            Err(e) => {
                error!(error = %e, "cannot accept connections, relay stopping");
                return Cycle::Stop(RelayExit::Abnormal);
            }
        };
        self.forward(&announcement);

        let end = self.pump_messages().await;
        let closed = self.teardown(end == ConnectionEnd::Normal).await;
        match (end, closed) {
            (ConnectionEnd::Normal, true) => Cycle::Continue,
            _ => Cycle::Stop(RelayExit::Abnormal),
        }
    }

    async fn pump_messages(&mut self) -> ConnectionEnd {
        while self.session.state() == SessionState::Connected {
            let message = match self.session.receive_message().await {
                Ok(message) => message,
                Err(e) if e.is_connection_closed() => {
                    info!(peer_id = self.session.peer_id(), "connection closed");
                    return ConnectionEnd::Normal;
                }
                Err(e) => {
                    error!(
                        peer_id = self.session.peer_id(),
                        error = %e,
                        "lost connection to simulation"
                    );
                    self.sink.deliver_error(&e.to_string());
                    return ConnectionEnd::Fatal;
                }
            };

            if message.is_empty() {
                error!(peer_id = self.session.peer_id(), "received empty frame");
                self.sink.deliver_error("empty message from simulation");
                return ConnectionEnd::Fatal;
            }

            match &message.message_type {
                Some(MessageType::Simulation) if !message.is_simulation_running() => {
                    info!(value = message.value.as_deref(), "simulation reported stop");
                    self.forward(&message);
                    return ConnectionEnd::Normal;
                }
                Some(MessageType::ObjectiveCompletion | MessageType::ObjectiveScore) => {
                    self.forward(&message);
                }
                Some(
                    MessageType::Simulation
                    | MessageType::LaunchPage
                    | MessageType::Unrecognized(_),
                )
                | None => {
                    warn!(frame = %message, "ignoring unexpected message");
                }
            }
        }

        ConnectionEnd::Normal
    }

    /// Settles the session state and closes the peer. Returns false if the
    /// close failed, which stops the relay.
    async fn teardown(&mut self, normal: bool) -> bool {
        self.session.disconnect(normal);
        match self.session.close_connection().await {
            Ok(()) => true,
            Err(e) => {
                self.sink.deliver_error(&e.to_string());
                false
            }
        }
    }

    fn forward(&self, message: &Message) {
        let text = message.encode();
        debug!(text = %text, "forwarding to sink");
        self.sink.deliver(&text);
    }
}

/// A relay running on its own task.
pub struct RelayHandle {
    local_addr: SocketAddr,
    shutdown: ShutdownHandle,
    task: JoinHandle<RelayExit>,
}

impl RelayHandle {
    /// The address the relay is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A cloneable handle for stopping the relay from elsewhere.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Stops the relay: clears the running flag and closes its sockets.
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    /// Ends the current simulation connection; the relay keeps listening.
    pub fn close_peer(&self) -> bool {
        self.shutdown.close_peer()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the relay task to end.
    pub async fn join(self) -> RelayExit {
        match self.task.await {
            Ok(exit) => exit,
            Err(e) => {
                error!(error = %e, "relay task failed");
                RelayExit::Abnormal
            }
        }
    }
}

/// Binds the configured endpoint and runs a relay on a new task.
///
/// Binding happens before this returns, so a port conflict is reported
/// here rather than as an abnormal exit.
pub async fn spawn_relay<S>(config: RelayConfig, sink: S) -> ServerResult<RelayHandle>
where
    S: Sink + 'static,
{
    let span = info_span!("relay", port = config.port);
    let session_span = info_span!(
        parent: &span,
        "session",
        session_id = tracing::field::Empty
    );

    let mut session = Session::new(config, session_span)?;
    let local_addr = session.listen().await?;

    let running = RunningFlag::new();
    let shutdown = ShutdownHandle::new(running.clone(), session.closer());
    let relay = RelayLoop::new(session, running, sink, span);
    let task = tokio::spawn(relay.run());

    Ok(RelayHandle {
        local_addr,
        shutdown,
        task,
    })
}
