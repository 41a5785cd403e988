//! Transport-neutral handle to one device connection.
//!
//! The application layer never touches a socket.  Each accepted connection is
//! represented by a [`ConnectionHandle`] wrapping the sending half of a bounded
//! queue; the infrastructure layer drains the receiving half into the
//! WebSocket.  Sends never await, so a slow device can only fill its own
//! queue and never stalls the registry lock.
//!
//! Closing is signalled out of band through a `watch` flag, so a connection
//! whose queue is full (a half-open peer) can still be torn down.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use linkrelay_core::{encode_outbound, DeviceKey, OutboundMessage};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique identity of one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0.simple().to_string();
        f.write_str(&s[..8])
    }
}

/// A frame queued for the connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    /// Ask the writer to send a close frame and stop.  Best effort; the
    /// authoritative signal is [`ConnectionHandle::close_requested`].
    Close,
}

/// Failure to queue a frame on a connection.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("connection {0} is closed")]
    Closed(ConnectionId),

    #[error("outbound queue of connection {0} is full")]
    Full(ConnectionId),

    #[error("failed to encode outbound message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Cloneable sender side of a connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    tx: mpsc::Sender<OutboundFrame>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl ConnectionHandle {
    /// Creates a handle and the receiver its writer task drains.
    ///
    /// A `buffer` of zero is raised to one.
    pub fn new(peer: Option<SocketAddr>, buffer: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let (shutdown, _) = watch::channel(false);
        let handle = Self {
            id: ConnectionId::new(),
            peer,
            tx,
            shutdown: Arc::new(shutdown),
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Encodes `msg` and queues it.
    pub fn send(&self, msg: &OutboundMessage) -> Result<(), SendError> {
        let text = encode_outbound(msg)?;
        self.send_text(text)
    }

    /// Queues already-encoded frame text unchanged.
    pub fn send_text(&self, text: String) -> Result<(), SendError> {
        self.push(OutboundFrame::Text(text))
    }

    /// Asks the session to close the transport.
    ///
    /// A close frame is queued when there is room; the shutdown flag is set
    /// regardless, so a saturated queue cannot keep the connection alive.
    pub fn close(&self) {
        if let Err(e) = self.push(OutboundFrame::Close) {
            debug!("connection {}: close frame not queued: {e}", self.id);
        }
        self.shutdown.send_replace(true);
    }

    /// Resolves once [`ConnectionHandle::close`] has been called on any clone.
    pub async fn close_requested(&self) {
        let mut rx = self.shutdown.subscribe();
        // The sender lives in `self`, so `wait_for` cannot fail.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    fn push(&self, frame: OutboundFrame) -> Result<(), SendError> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Full(self.id),
            TrySendError::Closed(_) => SendError::Closed(self.id),
        })
    }
}

/// Best-effort delivery of `msg` to `target`'s connection.
///
/// Failures are logged and reported as `false`; they never abort the caller.
pub(crate) fn notify(
    conn: Option<&ConnectionHandle>,
    msg: &OutboundMessage,
    target: &DeviceKey,
) -> bool {
    let kind = msg.message_type().as_str();
    let Some(conn) = conn else {
        debug!("{target} is not connected; {kind} dropped");
        return false;
    };
    match conn.send(msg) {
        Ok(()) => {
            debug!("→ {target}: {kind}");
            true
        }
        Err(e @ SendError::Closed(_)) => {
            debug!("{kind} to {target} not delivered: {e}");
            false
        }
        Err(e) => {
            warn!("{kind} to {target} not delivered: {e}");
            false
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
