use crate::envelope::Envelope;
use crate::error::{Result, SocketError};
use crate::transport::WsMessage;

/// Converts envelopes to and from transport frames
///
/// Encoding runs on the caller's thread inside `Socket::send`; decoding runs
/// on the dispatcher for every inbound frame, so keep both cheap.
pub trait Codec: Send + Sync + 'static {
    /// Encode an outbound envelope into a frame
    fn encode(&self, envelope: &Envelope) -> Result<WsMessage>;

    /// Decode an inbound frame into an envelope
    fn decode(&self, message: WsMessage) -> Result<Envelope>;
}

/// JSON object codec: `{"topic", "event", "payload", "ref"}` in text frames
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, envelope: &Envelope) -> Result<WsMessage> {
        let text = serde_json::to_string(envelope)?;
        Ok(WsMessage::Text(text))
    }

    fn decode(&self, message: WsMessage) -> Result<Envelope> {
        let envelope = match message {
            WsMessage::Text(text) => serde_json::from_str(&text),
            WsMessage::Binary(bytes) => serde_json::from_slice(&bytes),
        };
        envelope.map_err(|e| SocketError::Decode(e.to_string()))
    }
}
