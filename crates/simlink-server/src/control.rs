//! Host-side control of a running relay.
//!
//! The relay loop only consults its [`RunningController`] between
//! connection cycles. A loop blocked in `accept` or in a frame read is
//! released by closing the socket it waits on, which the blocked call
//! reports as [`ServerError::ConnectionClosed`](crate::ServerError).
//! [`ShutdownHandle::shutdown`] does both halves at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info};

/// Tells the relay loop whether to keep accepting connections.
pub trait RunningController: Send + Sync {
    fn is_running(&self) -> bool;
}

impl<F> RunningController for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_running(&self) -> bool {
        self()
    }
}

/// A shared boolean running flag.
#[derive(Debug, Clone)]
pub struct RunningFlag {
    running: Arc<AtomicBool>,
}

impl Default for RunningFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningFlag {
    /// Creates a flag in the running state.
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }
}

impl RunningController for RunningFlag {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Closes a session's sockets from outside the relay task.
///
/// Cloned out of a [`Session`](crate::Session); every clone acts on the
/// same session.
#[derive(Debug, Clone)]
pub struct SocketCloser {
    listener: Arc<watch::Sender<bool>>,
    peer: Arc<Mutex<Option<watch::Sender<bool>>>>,
}

impl SocketCloser {
    pub(crate) fn new() -> Self {
        let (listener, _) = watch::channel(false);
        Self {
            listener: Arc::new(listener),
            peer: Arc::new(Mutex::new(None)),
        }
    }

    /// Closes the listening socket. A pending or later accept fails with
    /// `ConnectionClosed`. Permanent for the session.
    pub fn close_listener(&self) {
        self.listener.send_replace(true);
    }

    /// Closes the current peer connection, if any. A pending or later read
    /// on it fails with `ConnectionClosed`; the listener stays open.
    ///
    /// Returns false when no peer was attached.
    pub fn close_peer(&self) -> bool {
        let guard = self.peer.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => {
                tx.send_replace(true);
                true
            }
            None => false,
        }
    }

    pub fn is_listener_closed(&self) -> bool {
        *self.listener.borrow()
    }

    pub(crate) fn listener_closed(&self) -> watch::Receiver<bool> {
        self.listener.subscribe()
    }

    /// Installs a fresh close signal for a newly accepted peer.
    ///
    /// A peer accepted after the listener was closed starts out closed, so
    /// a shutdown that lands between accept and arming is not lost.
    pub(crate) fn arm_peer(&self) -> watch::Receiver<bool> {
        let mut slot = self.peer.lock().unwrap_or_else(PoisonError::into_inner);
        let (tx, rx) = watch::channel(self.is_listener_closed());
        *slot = Some(tx);
        rx
    }

    pub(crate) fn disarm_peer(&self) {
        *self.peer.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Resolves once the signal is set. Never resolves if the sender is gone.
pub(crate) async fn closed(signal: &mut watch::Receiver<bool>) {
    let result = signal.wait_for(|closed| *closed).await.map(|_| ());
    if result.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Stops a relay: flips its running flag and closes its sockets.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    running: RunningFlag,
    closer: SocketCloser,
}

impl ShutdownHandle {
    pub fn new(running: RunningFlag, closer: SocketCloser) -> Self {
        Self { running, closer }
    }

    /// Stops the relay. Idempotent.
    ///
    /// The flag is cleared before the sockets close so the loop sees it as
    /// soon as the blocked call returns.
    pub fn shutdown(&self) {
        info!("relay shutdown requested");
        self.running.stop();
        self.closer.close_listener();
        if self.closer.close_peer() {
            debug!("closed active peer connection");
        }
    }

    /// Ends the current connection only; the relay waits for the next peer.
    pub fn close_peer(&self) -> bool {
        self.closer.close_peer()
    }

    pub fn is_shutdown(&self) -> bool {
        !self.running.is_running()
    }
}
