use thiserror::Error;

/// Main error type for channelsocket
#[derive(Error, Debug)]
pub enum SocketError {
    /// Operation attempted while the transport is down
    #[error("Not connected")]
    NotConnected,

    /// Envelope could not be encoded for the wire
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Inbound frame could not be decoded into an envelope
    #[error("Decode error: {0}")]
    Decode(String),

    /// Transport-level failure (handshake, write, read)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Connection closed unexpectedly
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidState(String),
}

impl From<serde_json::Error> for SocketError {
    fn from(err: serde_json::Error) -> Self {
        SocketError::Serialization(err.to_string())
    }
}

/// Result type for channelsocket operations
pub type Result<T> = std::result::Result<T, SocketError>;
