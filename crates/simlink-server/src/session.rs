//! One listening endpoint and at most one simulation peer.
//!
//! A [`Session`] is created once per relay and reused for every peer:
//!
//! ```text
//! DISCONNECTED --accept--> HANDSHAKING --valid RUNNING--> CONNECTED
//!       ^                       |                             |
//!       |                       +--------> ERROR <-- I/O -----+
//!       +------------- disconnect(true) ---------------------+
//! ```
//!
//! `DISCONNECTED` and `ERROR` both end the current peer; the next
//! [`Session::accept_connection`] starts over.

use std::fmt;
use std::net::SocketAddr;

use tokio::io::{BufReader, BufWriter};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::watch;
use tracing::{Instrument, Span, debug, error, info, warn};

use simlink_core::Message;
use simlink_protocol::{
    ByteOrderPreference, FrameReader, FrameWriter, HandshakeError, ProtocolError, WireFormat,
    handshake_reply, validate_request,
};

use crate::config::RelayConfig;
use crate::control::{SocketCloser, closed};
use crate::error::{ServerError, ServerResult};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Disconnected,
    Handshaking,
    Connected,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Handshaking => "HANDSHAKING",
            Self::Connected => "CONNECTED",
            Self::Error => "ERROR",
        })
    }
}

struct PeerConnection {
    addr: SocketAddr,
    reader: FrameReader<BufReader<OwnedReadHalf>>,
    writer: FrameWriter<BufWriter<OwnedWriteHalf>>,
    closed: watch::Receiver<bool>,
}

/// The relay's socket endpoint and its current peer.
pub struct Session {
    config: RelayConfig,
    wire: WireFormat,
    session_id: String,
    listener: Option<TcpListener>,
    peer: Option<PeerConnection>,
    peer_id: Option<String>,
    byte_order: ByteOrderPreference,
    state: SessionState,
    closer: SocketCloser,
    span: Span,
}

impl Session {
    /// Creates an unbound session.
    ///
    /// `span` is the logging context for everything this session does; it
    /// may declare an empty `session_id` field, which is filled in here.
    pub fn new(config: RelayConfig, span: Span) -> ServerResult<Self> {
        let wire = config.wire_format()?;
        let session_id = rand::random::<u32>().to_string();
        span.record("session_id", session_id.as_str());

        Ok(Self {
            config,
            wire,
            session_id,
            listener: None,
            peer: None,
            peer_id: None,
            byte_order: ByteOrderPreference::default(),
            state: SessionState::Disconnected,
            closer: SocketCloser::new(),
            span,
        })
    }

    /// Binds the listening socket.
    ///
    /// Returns the bound address, which differs from the configured one when
    /// the configured port is 0.
    pub async fn listen(&mut self) -> ServerResult<SocketAddr> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        self.span.in_scope(|| info!(addr = %local, "listening for simulation"));
        self.listener = Some(listener);
        Ok(local)
    }

    /// Waits for a peer and runs the handshake.
    ///
    /// On success the session is `CONNECTED` and the peer's announcement is
    /// returned. If the wait is cut short by [`SocketCloser::close_listener`]
    /// the listening socket is released and `ConnectionClosed` is returned
    /// with no peer attached. Any failure after a peer was accepted leaves
    /// the peer attached (see [`Session::has_peer`]) in state `ERROR`; the
    /// caller tears it down.
    pub async fn accept_connection(&mut self) -> ServerResult<Message> {
        let span = self.span.clone();
        self.accept_and_handshake().instrument(span).await
    }

    /// Reads the next frame from the peer.
    ///
    /// `ConnectionClosed` means the peer hung up or the host closed the
    /// connection; the state is left for [`Session::disconnect`] to settle.
    /// Other failures move the session to `ERROR`.
    pub async fn receive_message(&mut self) -> ServerResult<Message> {
        let span = self.span.clone();
        async {
            let message = self.next_message("receive message").await?;
            debug!(frame = %message, "received frame");
            Ok::<_, ServerError>(message)
        }
        .instrument(span)
        .await
    }

    /// Writes one framed message to the peer and flushes it.
    pub async fn send_message(&mut self, message: &Message) -> ServerResult<()> {
        let span = self.span.clone();
        self.write_message(message).instrument(span).await
    }

    /// Forgets the peer's identity and settles the state.
    ///
    /// `normal` selects `DISCONNECTED`, otherwise `ERROR`. Idempotent.
    pub fn disconnect(&mut self, normal: bool) {
        self.peer_id = None;
        self.state = if normal {
            SessionState::Disconnected
        } else {
            SessionState::Error
        };
        self.span
            .in_scope(|| debug!(state = %self.state, "peer disconnected"));
    }

    /// Closes the peer socket. The listening socket stays open.
    ///
    /// A peer that already reset the connection counts as closed.
    pub async fn close_connection(&mut self) -> ServerResult<()> {
        let span = self.span.clone();
        self.release_peer().instrument(span).await
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The random id this session uses as sender on the wire.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The connected simulation's sender id.
    pub fn peer_id(&self) -> Option<&str> {
        self.peer_id.as_deref()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer.as_ref().map(|peer| peer.addr)
    }

    /// Returns true while a peer socket is attached, including after a
    /// failed handshake until [`Session::close_connection`].
    pub fn has_peer(&self) -> bool {
        self.peer.is_some()
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Byte-order preference announced by the current (or last) peer.
    pub fn byte_order(&self) -> ByteOrderPreference {
        self.byte_order
    }

    pub fn wire_format(&self) -> &WireFormat {
        &self.wire
    }

    /// Returns a handle that closes this session's sockets from elsewhere.
    pub fn closer(&self) -> SocketCloser {
        self.closer.clone()
    }

    async fn release_peer(&mut self) -> ServerResult<()> {
        self.closer.disarm_peer();
        let Some(mut peer) = self.peer.take() else {
            return Ok(());
        };

        match peer.writer.shutdown().await {
            Ok(()) => {}
            Err(ProtocolError::Io(e)) if e.kind() == std::io::ErrorKind::NotConnected => {
                debug!(peer = %peer.addr, "peer socket already disconnected");
            }
            Err(e) => {
                self.state = SessionState::Error;
                error!(peer = %peer.addr, error = %e, "failed to close peer connection");
                return Err(ServerError::connection("close connection", e));
            }
        }
        info!(peer = %peer.addr, "peer connection closed");
        Ok(())
    }

    async fn accept_and_handshake(&mut self) -> ServerResult<Message> {
        let Some(listener) = self.listener.as_ref() else {
            return Err(ServerError::NotListening);
        };

        let mut listener_closed = self.closer.listener_closed();
        let accepted = tokio::select! {
            biased;
            _ = closed(&mut listener_closed) => None,
            result = listener.accept() => Some(result),
        };

        let (stream, addr) = match accepted {
            Some(Ok(pair)) => pair,
            Some(Err(e)) => {
                error!(error = %e, "accept failed on listening socket");
                return Err(ServerError::Accept(e));
            }
            None => {
                info!("listening socket closed while waiting for a peer");
                self.listener = None;
                return Err(ServerError::ConnectionClosed);
            }
        };

        let (read_half, write_half) = stream.into_split();
        self.peer = Some(PeerConnection {
            addr,
            reader: FrameReader::new(BufReader::new(read_half), self.wire),
            writer: FrameWriter::new(BufWriter::new(write_half), self.wire),
            closed: self.closer.arm_peer(),
        });
        self.peer_id = None;
        self.byte_order = ByteOrderPreference::default();
        self.state = SessionState::Handshaking;
        info!(peer = %addr, "peer connected, awaiting handshake");

        let result = match self.config.handshake_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.handshake())
                .await
                .unwrap_or_else(|_| Err(HandshakeError::Timeout.into())),
            None => self.handshake().await,
        };

        match result {
            Ok(message) => {
                info!(peer = %addr, peer_id = self.peer_id(), "handshake complete");
                Ok(message)
            }
            Err(e) => {
                self.state = SessionState::Error;
                warn!(peer = %addr, error = %e, "handshake failed");
                Err(e)
            }
        }
    }

    async fn handshake(&mut self) -> ServerResult<Message> {
        let byte = self.next_byte("read byte-order preference").await?;
        self.byte_order = ByteOrderPreference::from_byte(byte);
        debug!(byte_order = ?self.byte_order, "byte-order preference recorded");

        let announcement = self.next_message("read handshake").await?;
        let peer_id = validate_request(&announcement)?.to_string();

        self.peer_id = Some(peer_id);
        let reply = handshake_reply(self.session_id.as_str());
        self.write_message(&reply).await?;
        self.state = SessionState::Connected;
        Ok(announcement)
    }

    async fn next_byte(&mut self, operation: &'static str) -> ServerResult<u8> {
        let peer = self
            .peer
            .as_mut()
            .ok_or(ServerError::NotConnected { operation })?;

        let result = tokio::select! {
            biased;
            _ = closed(&mut peer.closed) => return Err(ServerError::ConnectionClosed),
            result = peer.reader.read_byte() => result,
        };

        match result {
            Ok(Some(byte)) => Ok(byte),
            Ok(None) => Err(ServerError::ConnectionClosed),
            Err(e) => Err(self.transport_failure(operation, e)),
        }
    }

    async fn next_message(&mut self, operation: &'static str) -> ServerResult<Message> {
        let peer = self
            .peer
            .as_mut()
            .ok_or(ServerError::NotConnected { operation })?;

        let result = tokio::select! {
            biased;
            _ = closed(&mut peer.closed) => return Err(ServerError::ConnectionClosed),
            result = peer.reader.read_message() => result,
        };

        match result {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(ServerError::ConnectionClosed),
            Err(e) => Err(self.transport_failure(operation, e)),
        }
    }

    async fn write_message(&mut self, message: &Message) -> ServerResult<()> {
        let operation = "send message";
        let peer = self
            .peer
            .as_mut()
            .ok_or(ServerError::NotConnected { operation })?;

        let result = match peer.writer.write_message(message).await {
            Ok(()) => peer.writer.flush().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                debug!(frame = %message, "sent frame");
                Ok(())
            }
            Err(e) => Err(self.transport_failure(operation, e)),
        }
    }

    fn transport_failure(&mut self, operation: &'static str, source: ProtocolError) -> ServerError {
        self.state = SessionState::Error;
        error!(
            operation,
            peer = ?self.peer_addr(),
            peer_id = self.peer_id(),
            error = %source,
            "transport failure"
        );
        ServerError::connection(operation, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestPeer, test_config};
    use std::time::Duration;

    async fn bound_session() -> (Session, SocketAddr) {
        let mut session = Session::new(test_config(), Span::none()).unwrap();
        let addr = session.listen().await.unwrap();
        (session, addr)
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port() {
        let (session, addr) = bound_session().await;
        assert!(session.is_listening());
        assert_ne!(addr.port(), 0);
        assert_eq!(session.local_addr(), Some(addr));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.session_id().parse::<u32>().is_ok());
    }

    #[tokio::test]
    async fn listen_fails_on_taken_port() {
        let (_session, addr) = bound_session().await;
        let mut second = Session::new(test_config().with_port(addr.port()), Span::none()).unwrap();
        let result = second.listen().await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
        assert!(!second.is_listening());
    }

    #[tokio::test]
    async fn accept_without_listener() {
        let mut session = Session::new(test_config(), Span::none()).unwrap();
        assert!(matches!(
            session.accept_connection().await,
            Err(ServerError::NotListening)
        ));
    }

    #[tokio::test]
    async fn handshake_success() {
        let (mut session, addr) = bound_session().await;
        let server_id = session.session_id().to_string();

        let client = tokio::spawn(async move {
            let mut peer = TestPeer::connect(addr).await;
            peer.send_raw(&[0]).await;
            peer.send_line("c1:SIMULATION:RUNNING").await;
            peer.read_line().await
        });

        let message = session.accept_connection().await.unwrap();
        assert_eq!(message.encode(), "c1:SIMULATION:RUNNING");
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.peer_id(), Some("c1"));
        assert_eq!(session.byte_order(), ByteOrderPreference::Native);
        assert!(session.peer_addr().is_some());

        let reply = client.await.unwrap();
        assert_eq!(reply, Some(format!("{server_id}:LAUNCH_PAGE:LISTENING")));
    }

    #[tokio::test]
    async fn handshake_records_reversed_byte_order() {
        let (mut session, addr) = bound_session().await;

        let client = tokio::spawn(async move {
            let mut peer = TestPeer::connect(addr).await;
            peer.send_raw(b"\x01c7:SIMULATION:RUNNING\n").await;
            peer.read_line().await
        });

        session.accept_connection().await.unwrap();
        assert!(session.byte_order().is_reversed());
        client.await.unwrap();
    }

    #[tokio::test]
    async fn handshake_rejects_wrong_first_message() {
        let (mut session, addr) = bound_session().await;

        let client = tokio::spawn(async move {
            let mut peer = TestPeer::connect(addr).await;
            peer.send_raw(&[0]).await;
            peer.send_line("c1:OBJECTIVE_SCORE:10").await;
            // No reply: the next thing seen is the close.
            peer.read_line().await
        });

        let result = session.accept_connection().await;
        assert!(matches!(
            result,
            Err(ServerError::Handshake(HandshakeError::InvalidMessage { .. }))
        ));
        assert_eq!(session.state(), SessionState::Error);
        assert!(session.has_peer());
        assert!(session.peer_id().is_none());

        session.disconnect(false);
        session.close_connection().await.unwrap();
        assert!(!session.has_peer());
        assert!(session.is_listening());

        assert_eq!(client.await.unwrap(), None);
    }

    #[tokio::test]
    async fn peer_hangs_up_during_handshake() {
        let (mut session, addr) = bound_session().await;

        let client = tokio::spawn(async move {
            let peer = TestPeer::connect(addr).await;
            drop(peer);
        });

        let result = session.accept_connection().await;
        assert!(matches!(result, Err(ServerError::ConnectionClosed)));
        assert!(session.has_peer());
        assert_eq!(session.state(), SessionState::Error);
        client.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_times_out() {
        let config = test_config().with_handshake_timeout(Some(Duration::from_secs(30)));
        let mut session = Session::new(config, Span::none()).unwrap();
        let addr = session.listen().await.unwrap();

        // Connected but silent: the clock auto-advances to the deadline.
        let _peer = TestPeer::connect(addr).await;
        let started = tokio::time::Instant::now();
        let result = session.accept_connection().await;
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(matches!(
            result,
            Err(ServerError::Handshake(HandshakeError::Timeout))
        ));
        assert_eq!(session.state(), SessionState::Error);
    }

    #[tokio::test]
    async fn receive_in_arrival_order_until_peer_closes() {
        let (mut session, addr) = bound_session().await;

        let client = tokio::spawn(async move {
            let mut peer = TestPeer::handshake(addr, "c1").await;
            peer.send_line("c1:OBJECTIVE_COMPLETION:COMPLETE:obj-1").await;
            peer.send_line("c1:OBJECTIVE_SCORE:90:obj-1").await;
        });

        session.accept_connection().await.unwrap();
        let first = session.receive_message().await.unwrap();
        let second = session.receive_message().await.unwrap();
        assert_eq!(first.encode(), "c1:OBJECTIVE_COMPLETION:COMPLETE:obj-1");
        assert_eq!(second.encode(), "c1:OBJECTIVE_SCORE:90:obj-1");

        client.await.unwrap();
        assert!(matches!(
            session.receive_message().await,
            Err(ServerError::ConnectionClosed)
        ));
        assert_eq!(session.state(), SessionState::Connected);

        session.disconnect(true);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.peer_id().is_none());
        session.close_connection().await.unwrap();
    }

    #[tokio::test]
    async fn close_peer_unblocks_receive() {
        let (mut session, addr) = bound_session().await;
        let closer = session.closer();

        let _client = tokio::spawn(async move {
            let peer = TestPeer::handshake(addr, "c1").await;
            // Stay connected and idle.
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(peer);
        });

        session.accept_connection().await.unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            closer.close_peer();
        });

        let result = tokio::time::timeout(Duration::from_secs(2), session.receive_message())
            .await
            .unwrap();
        assert!(matches!(result, Err(ServerError::ConnectionClosed)));
        assert!(session.is_listening());
    }

    #[tokio::test]
    async fn close_listener_unblocks_accept() {
        let (mut session, _addr) = bound_session().await;
        let closer = session.closer();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            closer.close_listener();
        });

        let result = tokio::time::timeout(Duration::from_secs(2), session.accept_connection())
            .await
            .unwrap();
        assert!(matches!(result, Err(ServerError::ConnectionClosed)));
        assert!(!session.is_listening());
        assert!(!session.has_peer());
    }

    #[tokio::test]
    async fn send_message_reaches_peer() {
        let (mut session, addr) = bound_session().await;

        let client = tokio::spawn(async move {
            let mut peer = TestPeer::handshake(addr, "c1").await;
            peer.read_line().await
        });

        session.accept_connection().await.unwrap();
        let id = session.session_id().to_string();
        session
            .send_message(&Message::launch_page(id.as_str(), "STOPPED_NORMAL"))
            .await
            .unwrap();

        assert_eq!(
            client.await.unwrap(),
            Some(format!("{id}:LAUNCH_PAGE:STOPPED_NORMAL"))
        );
    }

    #[tokio::test]
    async fn incomplete_frame_is_transport_failure() {
        let (mut session, addr) = bound_session().await;

        let client = tokio::spawn(async move {
            let mut peer = TestPeer::handshake(addr, "c1").await;
            peer.send_raw(b"c1:OBJECTIVE_SC").await;
        });

        session.accept_connection().await.unwrap();
        client.await.unwrap();

        let result = session.receive_message().await;
        assert!(matches!(
            result,
            Err(ServerError::Connection {
                source: ProtocolError::IncompleteFrame { .. },
                ..
            })
        ));
        assert_eq!(session.state(), SessionState::Error);
    }

    #[tokio::test]
    async fn operations_without_peer() {
        let (mut session, _addr) = bound_session().await;
        assert!(matches!(
            session.receive_message().await,
            Err(ServerError::NotConnected { .. })
        ));
        assert!(matches!(
            session.send_message(&Message::default()).await,
            Err(ServerError::NotConnected { .. })
        ));
        // Closing and disconnecting with nothing attached is harmless.
        session.close_connection().await.unwrap();
        session.disconnect(true);
        session.disconnect(true);
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn session_is_reused_across_peers() {
        let (mut session, addr) = bound_session().await;

        for id in ["first", "second"] {
            let client = tokio::spawn(async move {
                let mut peer = TestPeer::handshake(addr, id).await;
                peer.send_line(&format!("{id}:SIMULATION:STOPPED_NORMAL")).await;
            });

            let hello = session.accept_connection().await.unwrap();
            assert_eq!(hello.sender_id.as_deref(), Some(id));
            let bye = session.receive_message().await.unwrap();
            assert_eq!(bye.value.as_deref(), Some("STOPPED_NORMAL"));

            session.disconnect(true);
            session.close_connection().await.unwrap();
            client.await.unwrap();
        }
    }
}
