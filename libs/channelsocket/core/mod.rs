//! # Channelsocket core
//!
//! Phoenix-style channel multiplexing over a single realtime connection.
//!
//! ## Example
//!
//! ```rust,ignore
//! use channelsocket::{payload_from, StaticHeaders};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> channelsocket::Result<()> {
//!     let socket = channelsocket::builder()
//!         .url("wss://chat.example.com/socket/websocket")
//!         .param("vsn", "2.0.0")
//!         .heartbeat_interval(Duration::from_secs(30))
//!         .build()?;
//!     socket.connect()?;
//!
//!     let room = socket.channel("room:lobby", payload_from(json!({"user_id": 42})));
//!     room.on("new_msg", |payload| println!("message: {:?}", payload));
//!     room.join(Default::default())
//!         .receive("ok", |_| println!("joined"))
//!         .receive("error", |reason| println!("join failed: {}", reason));
//!
//!     room.push("new_msg", payload_from(json!({"body": "hello"})));
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod channel;
pub mod config;
pub mod connection_state;
pub mod envelope;
pub mod heartbeat;
pub mod push;
pub mod socket;
pub mod websocket;

pub use builder::{states, SocketBuilder};
pub use channel::{Channel, ChannelState, EventHandler};
pub use config::{SocketConfig, TransportConfig};
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics};
pub use envelope::{payload_from, Envelope, Payload};
pub use heartbeat::HeartbeatTracker;
pub use push::{Push, Reply, ReplyHandler};
pub use socket::Socket;
pub use websocket::WebSocketTransport;

pub use crate::traits::*;

/// Start building a [`Socket`]
///
/// # Example
/// ```ignore
/// let socket = channelsocket::builder()
///     .url("ws://localhost:4000/socket/websocket")
///     .push_timeout(Some(Duration::from_secs(5)))
///     .build()?;
/// ```
pub fn builder() -> SocketBuilder<states::NoTransport> {
    SocketBuilder::new()
}
