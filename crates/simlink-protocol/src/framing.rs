//! Marker-terminated line framing.
//!
//! Every frame is the encoded message followed by a single end-of-message
//! byte:
//!
//! ```text
//! +---------------------------------+-----+
//! | senderID:type:value:objectiveID | EOM |
//! +---------------------------------+-----+
//! ```
//!
//! Nothing is escaped, so a field containing the marker byte splits the
//! frame in two on the receiving side.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use simlink_core::{DEFAULT_DELIMITER, Message};

use crate::error::{ProtocolError, ProtocolResult};
use crate::{DEFAULT_END_OF_MESSAGE, MAX_FRAME_SIZE};

/// Delimiter, terminator and size limit for one wire session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireFormat {
    delimiter: char,
    end_of_message: u8,
    max_frame_size: usize,
}

impl Default for WireFormat {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            end_of_message: DEFAULT_END_OF_MESSAGE as u8,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl WireFormat {
    /// Creates a wire format with the given delimiter and terminator.
    ///
    /// The terminator must be a single ASCII character and differ from the
    /// delimiter.
    pub fn new(delimiter: char, end_of_message: char) -> ProtocolResult<Self> {
        if !end_of_message.is_ascii() {
            return Err(ProtocolError::InvalidWireFormat(format!(
                "end-of-message marker {end_of_message:?} is not ASCII"
            )));
        }
        if delimiter == end_of_message {
            return Err(ProtocolError::InvalidWireFormat(format!(
                "delimiter and end-of-message marker are both {delimiter:?}"
            )));
        }
        Ok(Self {
            delimiter,
            end_of_message: end_of_message as u8,
            ..Self::default()
        })
    }

    /// Builder: set the maximum frame length.
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    pub fn end_of_message(&self) -> char {
        self.end_of_message as char
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Encodes a message into a complete frame, terminator included.
    pub fn encode_frame(&self, message: &Message) -> ProtocolResult<Vec<u8>> {
        let text = message.encode_with(self.delimiter);
        if text.len() > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                max: self.max_frame_size,
            });
        }

        let mut frame = Vec::with_capacity(text.len() + 1);
        frame.extend_from_slice(text.as_bytes());
        frame.push(self.end_of_message);
        Ok(frame)
    }

    /// Decodes the text of one frame (terminator already stripped).
    pub fn decode_frame(&self, text: &str) -> Message {
        Message::decode_with(text, self.delimiter)
    }
}

/// Reads frames from a buffered byte stream.
pub struct FrameReader<R> {
    reader: R,
    wire: WireFormat,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    /// Creates a new FrameReader wrapping the given reader.
    pub fn new(reader: R, wire: WireFormat) -> Self {
        Self { reader, wire }
    }

    /// Reads a single raw byte.
    ///
    /// Returns `Ok(None)` at end of stream.
    pub async fn read_byte(&mut self) -> ProtocolResult<Option<u8>> {
        let available = self.reader.fill_buf().await?;
        let Some(&byte) = available.first() else {
            return Ok(None);
        };
        self.reader.consume(1);
        Ok(Some(byte))
    }

    /// Reads the text of one frame, without its terminator.
    ///
    /// Returns `Ok(None)` if the stream ends before any byte of a new
    /// frame. A stream that ends mid-frame is an error. Bytes that are not
    /// valid UTF-8 are replaced rather than rejected.
    pub async fn read_frame(&mut self) -> ProtocolResult<Option<String>> {
        let mut line = Vec::new();

        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if line.is_empty() {
                    return Ok(None);
                }
                return Err(ProtocolError::IncompleteFrame {
                    received: line.len(),
                });
            }

            let (complete, used) = match available
                .iter()
                .position(|&b| b == self.wire.end_of_message)
            {
                Some(pos) => {
                    line.extend_from_slice(&available[..pos]);
                    (true, pos + 1)
                }
                None => {
                    line.extend_from_slice(available);
                    (false, available.len())
                }
            };
            self.reader.consume(used);

            if line.len() > self.wire.max_frame_size {
                return Err(ProtocolError::FrameTooLarge {
                    max: self.wire.max_frame_size,
                });
            }

            if complete {
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
        }
    }

    /// Reads and decodes one message.
    ///
    /// Returns `Ok(None)` on a clean end of stream.
    pub async fn read_message(&mut self) -> ProtocolResult<Option<Message>> {
        Ok(self
            .read_frame()
            .await?
            .map(|text| self.wire.decode_frame(&text)))
    }
}

/// Writes frames to a byte stream.
pub struct FrameWriter<W> {
    writer: W,
    wire: WireFormat,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Creates a new FrameWriter wrapping the given writer.
    pub fn new(writer: W, wire: WireFormat) -> Self {
        Self { writer, wire }
    }

    /// Writes a single raw byte.
    pub async fn write_byte(&mut self, byte: u8) -> ProtocolResult<()> {
        self.writer.write_u8(byte).await?;
        Ok(())
    }

    /// Writes one framed message. Call [`FrameWriter::flush`] to push it out.
    pub async fn write_message(&mut self, message: &Message) -> ProtocolResult<()> {
        let frame = self.wire.encode_frame(message)?;
        self.writer.write_all(&frame).await?;
        Ok(())
    }

    /// Flushes the underlying writer.
    pub async fn flush(&mut self) -> ProtocolResult<()> {
        self.writer.flush().await?;
        Ok(())
    }

    /// Flushes and shuts down the write side of the stream.
    pub async fn shutdown(&mut self) -> ProtocolResult<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
