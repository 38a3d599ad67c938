//! TCP client speaking the simulation side of the relay protocol.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, info};

use simlink_core::{Message, values};
use simlink_protocol::{
    ByteOrderPreference, FrameReader, FrameWriter, WireFormat, handshake_request, validate_reply,
};

use crate::error::{ClientError, ClientResult};

/// A connected simulation that has completed the handshake.
pub struct SimulationClient {
    client_id: String,
    server_id: String,
    peer: SocketAddr,
    reader: FrameReader<BufReader<OwnedReadHalf>>,
    writer: FrameWriter<BufWriter<OwnedWriteHalf>>,
}

impl SimulationClient {
    /// Connects to a relay and performs the handshake as `client_id`.
    ///
    /// `timeout` bounds the connect and the wait for the relay's reply.
    pub async fn connect(
        addr: SocketAddr,
        client_id: impl Into<String>,
        wire: WireFormat,
        timeout: Duration,
    ) -> ClientResult<Self> {
        let client_id = client_id.into();
        debug!(relay = %addr, client_id = %client_id, "connecting to relay");

        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                ClientError::Timeout(format!("connecting to {addr} after {}s", timeout.as_secs()))
            })?
            .map_err(|e| ClientError::Connection(format!("failed to connect to {addr}: {e}")))?;

        let (read_half, write_half) = stream.into_split();
        let mut client = Self {
            client_id,
            server_id: String::new(),
            peer: addr,
            reader: FrameReader::new(BufReader::new(read_half), wire),
            writer: FrameWriter::new(BufWriter::new(write_half), wire),
        };

        client
            .writer
            .write_byte(ByteOrderPreference::Native.as_byte())
            .await?;
        client
            .send(&handshake_request(client.client_id.as_str()))
            .await?;

        let reply = tokio::time::timeout(timeout, client.reader.read_message())
            .await
            .map_err(|_| ClientError::Timeout("waiting for handshake reply".into()))??
            .ok_or_else(|| ClientError::Connection("relay closed during handshake".into()))?;
        client.server_id = validate_reply(&reply)?.to_string();

        info!(
            relay = %addr,
            server_id = %client.server_id,
            "handshake complete"
        );
        Ok(client)
    }

    /// Our sender id.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The relay's session id, from its handshake reply.
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn relay_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Sends one message and flushes it.
    pub async fn send(&mut self, message: &Message) -> ClientResult<()> {
        self.writer.write_message(message).await?;
        self.writer.flush().await?;
        debug!(frame = %message, "sent frame");
        Ok(())
    }

    /// Reports an objective as complete or incomplete.
    pub async fn report_completion(&mut self, objective_id: &str, complete: bool) -> ClientResult<()> {
        let value = if complete {
            values::COMPLETE
        } else {
            values::INCOMPLETE
        };
        let message = Message::objective_completion(self.client_id.as_str(), objective_id, value);
        self.send(&message).await
    }

    /// Reports a score for an objective.
    pub async fn report_score(&mut self, objective_id: &str, score: &str) -> ClientResult<()> {
        let message = Message::objective_score(self.client_id.as_str(), objective_id, score);
        self.send(&message).await
    }

    /// Announces that the simulation stopped, then closes the connection.
    pub async fn stop(mut self, value: &str) -> ClientResult<()> {
        let message = Message::simulation(self.client_id.as_str(), value);
        self.send(&message).await?;
        self.writer.shutdown().await?;
        info!(relay = %self.peer, value, "simulation stopped");
        Ok(())
    }

    /// Waits for the relay to close the connection. Frames the relay sends
    /// in the meantime are returned in order.
    pub async fn drain(mut self) -> ClientResult<Vec<Message>> {
        let mut received = Vec::new();
        while let Some(message) = self.reader.read_message().await? {
            received.push(message);
        }
        Ok(received)
    }
}
