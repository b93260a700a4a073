//! # Channelsocket
//!
//! Realtime channel multiplexer for chat clients.
//!
//! One [`Socket`] owns one duplex connection and carries any number of
//! topic [`Channel`]s over it. Every outbound operation is a [`Push`] that
//! resolves exactly once: with the server's correlated reply, or with a
//! synthesised error when it cannot be sent or times out.
//!
//! - **Single delivery context**: replies, channel events and lifecycle
//!   callbacks all run on the socket's dispatcher task
//! - **Heartbeats**: periodic `heartbeat` pushes on the `phoenix` topic, with
//!   optional ack tracking
//! - **Pluggable seams**: [`Transport`], [`Codec`], [`ReconnectionStrategy`]
//!   and [`HeaderProvider`]

pub mod traits;
pub mod core;

pub use traits::*;

pub use crate::core::{
    channel, config, connection_state, envelope, heartbeat, push, socket, websocket,
    builder::{states, SocketBuilder},
    channel::{Channel, ChannelState, EventHandler},
    config::{SocketConfig, TransportConfig},
    connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics},
    envelope::{events, payload_from, status, Envelope, Payload},
    heartbeat::HeartbeatTracker,
    push::{reasons, Push, Reply, ReplyHandler},
    socket::Socket,
    websocket::WebSocketTransport,
};

/// `builder()` starts a [`SocketBuilder`]; the module holds its type-state markers
pub use crate::core::builder;
