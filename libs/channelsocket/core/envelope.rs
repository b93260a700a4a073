//! Wire envelope and the reserved protocol vocabulary

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Arbitrary structured payload (string keys, order irrelevant)
pub type Payload = Map<String, Value>;

/// Reserved event names
pub mod events {
    pub const JOIN: &str = "phx_join";
    pub const LEAVE: &str = "phx_leave";
    pub const REPLY: &str = "phx_reply";
    pub const ERROR: &str = "phx_error";
    pub const CLOSE: &str = "phx_close";
    pub const HEARTBEAT: &str = "heartbeat";
}

/// Pseudo-topic heartbeats are addressed to
pub const HEARTBEAT_TOPIC: &str = "phoenix";

/// Prefix distinguishing heartbeat refs from application refs
pub const HEARTBEAT_REF_PREFIX: &str = "hb-";

/// Reply statuses
pub mod status {
    pub const OK: &str = "ok";
    pub const ERROR: &str = "error";
}

/// One unit exchanged over the connection
///
/// `reference` is present iff the envelope originates a correlated request
/// or replies to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Payload,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl Envelope {
    pub fn new(
        topic: impl Into<String>,
        event: impl Into<String>,
        payload: Payload,
        reference: Option<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            event: event.into(),
            payload,
            reference,
        }
    }

    /// Status string of a reply payload (`payload.status`)
    pub fn status(&self) -> Option<&str> {
        self.payload.get("status").and_then(Value::as_str)
    }

    /// Response body of a reply payload (`payload.response`), empty object if absent
    pub fn response(&self) -> Value {
        self.payload
            .get("response")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    /// True for heartbeat requests and their replies
    pub fn is_heartbeat_ref(&self) -> bool {
        self.reference
            .as_deref()
            .is_some_and(|r| r.starts_with(HEARTBEAT_REF_PREFIX))
    }
}

/// Build a payload from a `serde_json::Value`, keeping only object bodies
///
/// Non-object values are wrapped as `{"value": ...}`.
pub fn payload_from(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_accessors() {
        let envelope: Envelope = serde_json::from_value(json!({
            "topic": "room:1",
            "event": "phx_reply",
            "ref": "3",
            "payload": {"status": "error", "response": {"reason": "unauthorized"}}
        }))
        .unwrap();

        assert_eq!(envelope.status(), Some("error"));
        assert_eq!(envelope.response(), json!({"reason": "unauthorized"}));
        assert!(!envelope.is_heartbeat_ref());
    }

    #[test]
    fn test_missing_response_is_empty_object() {
        let envelope = Envelope::new("t", "phx_reply", payload_from(json!({"status": "ok"})), None);
        assert_eq!(envelope.response(), json!({}));
    }

    #[test]
    fn test_heartbeat_ref_detection() {
        let envelope = Envelope::new(HEARTBEAT_TOPIC, events::REPLY, Payload::new(), Some("hb-12".into()));
        assert!(envelope.is_heartbeat_ref());
    }

    #[test]
    fn test_payload_from_wraps_scalars() {
        assert_eq!(payload_from(json!(5)).get("value"), Some(&json!(5)));
        assert!(payload_from(Value::Null).is_empty());
    }
}
