//! Loopback test peer speaking the simulation side of the protocol.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::config::RelayConfig;

/// Ephemeral port, short handshake deadline.
pub(crate) fn test_config() -> RelayConfig {
    RelayConfig::new(0).with_handshake_timeout(Some(Duration::from_secs(5)))
}

pub(crate) struct TestPeer {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestPeer {
    pub(crate) async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer,
        }
    }

    /// Connects and completes the handshake as `id`.
    pub(crate) async fn handshake(addr: SocketAddr, id: &str) -> Self {
        let mut peer = Self::connect(addr).await;
        peer.send_raw(&[0]).await;
        peer.send_line(&format!("{id}:SIMULATION:RUNNING")).await;
        let reply = peer.read_line().await.expect("handshake reply");
        assert!(reply.ends_with(":LAUNCH_PAGE:LISTENING"), "reply: {reply}");
        peer
    }

    pub(crate) async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    pub(crate) async fn send_line(&mut self, line: &str) {
        let mut frame = line.as_bytes().to_vec();
        frame.push(b'\n');
        self.send_raw(&frame).await;
    }

    /// Next line without its terminator; `None` once the relay closed.
    pub(crate) async fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.reader.read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches('\n').to_string()),
        }
    }
}
