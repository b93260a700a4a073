//! Transport seam
//!
//! The Connection Manager never talks to a websocket library directly. It
//! drives a [`Transport`] and receives lifecycle events back through a
//! [`TransportSink`]. Every event pushed into the sink lands on the socket's
//! dispatcher task, which processes them strictly one at a time.
//!
//! ```text
//! Socket ──connect/write/disconnect──> Transport ──> network
//!    ^                                     │
//!    └──── dispatcher <── TransportSink <──┘  (connected / disconnected / frame)
//! ```

use crate::error::Result;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// A single websocket frame, text or binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl WsMessage {
    /// Get the message as text, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsMessage::Text(s) => Some(s),
            WsMessage::Binary(_) => None,
        }
    }

    /// Get the message as binary, if it is binary
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            WsMessage::Text(_) => None,
            WsMessage::Binary(b) => Some(b),
        }
    }

    /// Check if message is text
    pub fn is_text(&self) -> bool {
        matches!(self, WsMessage::Text(_))
    }
}

/// Events delivered to the socket's serial dispatcher
#[derive(Debug)]
pub(crate) enum SocketEvent {
    /// Transport finished its handshake
    Connected,
    /// Transport closed, cleanly (`None`) or with an error description
    Disconnected(Option<String>),
    /// Transport is about to retry the connection (attempt number)
    Reconnecting(usize),
    /// Raw inbound frame
    Frame(WsMessage),
    /// A push's timeout elapsed
    PushTimeout { reference: String },
    /// A channel's leave was never acknowledged
    LeaveTimeout { topic: String, channel_id: u64 },
}

/// Handle a transport uses to report lifecycle events and inbound frames
///
/// Cloning is cheap; all clones feed the same dispatcher. Sends after the
/// socket has been dropped are silently discarded.
#[derive(Debug, Clone)]
pub struct TransportSink {
    tx: UnboundedSender<SocketEvent>,
}

impl TransportSink {
    pub(crate) fn new(tx: UnboundedSender<SocketEvent>) -> Self {
        Self { tx }
    }

    /// Report a completed handshake
    pub fn connected(&self) {
        let _ = self.tx.send(SocketEvent::Connected);
    }

    /// Report that the connection is gone
    pub fn disconnected(&self, reason: Option<String>) {
        let _ = self.tx.send(SocketEvent::Disconnected(reason));
    }

    /// Report a pending reconnection attempt
    pub fn reconnecting(&self, attempt: usize) {
        let _ = self.tx.send(SocketEvent::Reconnecting(attempt));
    }

    /// Hand an inbound frame to the dispatcher
    pub fn frame(&self, message: WsMessage) {
        let _ = self.tx.send(SocketEvent::Frame(message));
    }

    /// Deliver an internal event after `delay`
    pub(crate) fn schedule(&self, delay: Duration, event: SocketEvent) -> tokio::task::JoinHandle<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        })
    }
}

/// A single physical duplex connection
///
/// Implementations must be non-blocking: `connect` starts the handshake and
/// returns, reporting the outcome later through the sink.
pub trait Transport: Send + Sync + 'static {
    /// Start connecting. Events for this connection go to `sink`.
    fn connect(&self, sink: TransportSink) -> Result<()>;

    /// Close the connection and stop any reconnection attempts
    fn disconnect(&self);

    /// Drop the current connection because it looks dead
    ///
    /// Transports that reconnect on their own may retry afterwards.
    fn abort_connection(&self, reason: &str) {
        tracing::debug!(reason, "Aborting connection");
        self.disconnect();
    }

    /// Queue one frame for writing
    fn write(&self, message: WsMessage) -> Result<()>;

    /// True once the handshake completed and until the connection drops
    fn is_connected(&self) -> bool;

    /// True while connected or while working towards a connection, which
    /// includes waiting between reconnection attempts
    fn is_active(&self) -> bool {
        self.is_connected()
    }
}
