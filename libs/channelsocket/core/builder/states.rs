/// Type-state markers for the socket builder
///
/// The builder only offers `build()` once a transport has been chosen,
/// either a websocket URL or a caller-supplied [`crate::Transport`].

/// Marker trait for transport state
pub trait TransportState {}

/// Nothing chosen yet
pub struct NoTransport;
impl TransportState for NoTransport {}

/// Bundled websocket transport, configured by URL
pub struct HasUrl;
impl TransportState for HasUrl {}

/// Caller-supplied transport
pub struct HasTransport;
impl TransportState for HasTransport {}
