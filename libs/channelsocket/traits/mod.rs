//! # Channelsocket Traits
//!
//! Seams between the multiplexer core and its collaborators:
//!
//! - **Transport**: the physical duplex connection and its event sink
//! - **Codec**: envelope <-> frame conversion
//! - **HeaderProvider**: handshake headers for the bundled websocket transport
//! - **ReconnectionStrategy**: retry policy for the bundled websocket transport

pub mod codec;
pub mod error;
pub mod headers;
pub mod reconnect;
pub mod transport;

pub use codec::{Codec, JsonCodec};
pub use error::{Result, SocketError};
pub use headers::{HeaderProvider, Headers, StaticHeaders};
pub use reconnect::{ExponentialBackoff, FixedDelay, NeverReconnect, ReconnectionStrategy};
pub use transport::{Transport, TransportSink, WsMessage};
