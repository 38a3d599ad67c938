//! Delivery of relayed events to the host.

use tokio::sync::mpsc;
use tracing::debug;

/// Prefix marking diagnostic strings sent on error paths.
pub const ERROR_PREFIX: &str = "ERROR: ";

/// Receives the text of every forwarded message.
///
/// Implementations must not block: they run on the relay task.
pub trait Sink: Send + Sync {
    fn deliver(&self, text: &str);

    /// Delivers an error-tagged diagnostic.
    fn deliver_error(&self, detail: &str) {
        self.deliver(&error_text(detail));
    }
}

impl<F> Sink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn deliver(&self, text: &str) {
        self(text)
    }
}

/// Formats an error-tagged diagnostic string.
pub fn error_text(detail: &str) -> String {
    format!("{ERROR_PREFIX}{detail}")
}

/// A sink that queues deliveries on an unbounded channel.
///
/// The queue has no limit: a host that stops draining the receiver keeps
/// every later delivery in memory until the relay stops. Drop the receiver
/// to discard deliveries instead.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    /// Creates a sink and the receiver the host drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Sink for ChannelSink {
    fn deliver(&self, text: &str) {
        if self.tx.send(text.to_string()).is_err() {
            debug!(text, "sink receiver dropped, discarding delivery");
        }
    }
}
