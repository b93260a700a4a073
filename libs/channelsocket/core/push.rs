//! Push: one outbound operation awaiting at most one correlated reply
//!
//! A push collects status handlers (`receive("ok", ..)`, `receive("error", ..)`)
//! and fires the ones matching the first and only reply it gets. Handlers
//! registered after the reply arrived are replayed immediately, so callers can
//! attach them whenever they like without racing the network.
//!
//! Failures that never reach the server (not connected, encoding failure,
//! write failure, timeout) are reported through the same `"error"` status with
//! a `{"reason": ...}` response.

use crate::envelope::{status, Envelope, Payload};
use crate::error::SocketError;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Reasons carried in synthesised `"error"` replies
pub mod reasons {
    pub const NOT_CONNECTED: &str = "not_connected";
    pub const SERIALIZATION: &str = "serialization";
    pub const WRITE_FAILED: &str = "write_failed";
    pub const TIMEOUT: &str = "timeout";
}

/// Status handler, invoked with the reply's `response` body
pub type ReplyHandler = Arc<dyn Fn(&Value) + Send + Sync>;

type AfterHook = Box<dyn FnOnce(&Reply) + Send>;

/// Terminal outcome of a push
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: String,
    pub response: Value,
}

impl Reply {
    pub fn is_ok(&self) -> bool {
        self.status == status::OK
    }

    /// `response.reason` for error replies, if present
    pub fn reason(&self) -> Option<&str> {
        self.response.get("reason").and_then(Value::as_str)
    }
}

#[derive(Default)]
struct PushState {
    reply: Option<Reply>,
    hooks: HashMap<String, Vec<ReplyHandler>>,
    after: Option<AfterHook>,
    timer: Option<JoinHandle<()>>,
}

struct PushInner {
    topic: String,
    event: String,
    payload: Payload,
    reference: Option<String>,
    timeout: Option<Duration>,
    state: Mutex<PushState>,
}

/// Handle to a push; clones share the same underlying operation
#[derive(Clone)]
pub struct Push {
    inner: Arc<PushInner>,
}

impl Push {
    /// Create a push. Pushes without a `reference` are fire-and-forget and
    /// never matched to a reply.
    pub fn new(
        topic: impl Into<String>,
        event: impl Into<String>,
        payload: Payload,
        reference: Option<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(PushInner {
                topic: topic.into(),
                event: event.into(),
                payload,
                reference,
                timeout,
                state: Mutex::new(PushState::default()),
            }),
        }
    }

    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    pub fn event(&self) -> &str {
        &self.inner.event
    }

    pub fn payload(&self) -> &Payload {
        &self.inner.payload
    }

    pub fn reference(&self) -> Option<&str> {
        self.inner.reference.as_deref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout
    }

    /// Wire envelope for this push
    pub fn envelope(&self) -> Envelope {
        Envelope::new(
            self.inner.topic.clone(),
            self.inner.event.clone(),
            self.inner.payload.clone(),
            self.inner.reference.clone(),
        )
    }

    /// True once a reply (real or synthesised) has been recorded
    pub fn is_received(&self) -> bool {
        self.inner.state.lock().reply.is_some()
    }

    pub fn reply(&self) -> Option<Reply> {
        self.inner.state.lock().reply.clone()
    }

    /// Identity comparison
    pub fn ptr_eq(a: &Push, b: &Push) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Run `handler` when a reply with `status` arrives
    ///
    /// If the push already completed with that status the handler runs now,
    /// on the caller's thread. Each handler runs at most once.
    pub fn receive<F>(&self, status: &str, handler: F) -> &Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let completed = {
            let mut state = self.inner.state.lock();
            match &state.reply {
                Some(reply) => Some(reply.clone()),
                None => {
                    state
                        .hooks
                        .entry(status.to_string())
                        .or_default()
                        .push(Arc::new(handler));
                    return self;
                }
            }
        };

        if let Some(reply) = completed {
            if reply.status == status {
                handler(&reply.response);
            }
        }
        self
    }

    /// One-shot hook fired after the status handlers, whatever the outcome
    ///
    /// Replaces a previously set hook. Replayed if the push already completed.
    pub fn after<F>(&self, hook: F) -> &Self
    where
        F: FnOnce(&Reply) + Send + 'static,
    {
        let completed = {
            let mut state = self.inner.state.lock();
            if state.reply.is_none() {
                state.after = Some(Box::new(hook));
                return self;
            }
            state.reply.clone()
        };

        if let Some(reply) = completed {
            hook(&reply);
        }
        self
    }

    /// Complete with a server reply envelope
    pub(crate) fn handle_response(&self, envelope: &Envelope) -> bool {
        let reply = Reply {
            status: envelope.status().unwrap_or(status::ERROR).to_string(),
            response: envelope.response(),
        };
        self.complete(reply)
    }

    pub(crate) fn handle_not_connected(&self) -> bool {
        self.fail(reasons::NOT_CONNECTED, None)
    }

    pub(crate) fn handle_parse_error(&self, error: &SocketError) -> bool {
        self.fail(reasons::SERIALIZATION, Some(error.to_string()))
    }

    pub(crate) fn handle_write_error(&self, error: &SocketError) -> bool {
        self.fail(reasons::WRITE_FAILED, Some(error.to_string()))
    }

    pub(crate) fn handle_timeout(&self) -> bool {
        self.fail(reasons::TIMEOUT, None)
    }

    fn fail(&self, reason: &str, detail: Option<String>) -> bool {
        let response = match detail {
            Some(detail) => json!({ "reason": reason, "detail": detail }),
            None => json!({ "reason": reason }),
        };
        self.complete(Reply {
            status: status::ERROR.to_string(),
            response,
        })
    }

    /// Record the reply and fire matching handlers outside the lock
    fn complete(&self, reply: Reply) -> bool {
        let (handlers, after, timer) = {
            let mut state = self.inner.state.lock();
            if state.reply.is_some() {
                debug!(
                    topic = %self.inner.topic,
                    reference = ?self.inner.reference,
                    "Ignoring second reply for completed push"
                );
                return false;
            }
            state.reply = Some(reply.clone());
            let handlers = state.hooks.remove(&reply.status).unwrap_or_default();
            state.hooks.clear();
            (handlers, state.after.take(), state.timer.take())
        };

        if let Some(timer) = timer {
            timer.abort();
        }
        for handler in handlers {
            handler(&reply.response);
        }
        if let Some(after) = after {
            after(&reply);
        }
        true
    }

    /// Attach the pending timeout timer, replacing any previous one
    pub(crate) fn set_timer(&self, timer: JoinHandle<()>) {
        let mut state = self.inner.state.lock();
        if state.reply.is_some() {
            timer.abort();
            return;
        }
        if let Some(old) = state.timer.replace(timer) {
            old.abort();
        }
    }

    pub(crate) fn cancel_timer(&self) {
        if let Some(timer) = self.inner.state.lock().timer.take() {
            timer.abort();
        }
    }
}

impl fmt::Debug for Push {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Push")
            .field("topic", &self.inner.topic)
            .field("event", &self.inner.event)
            .field("reference", &self.inner.reference)
            .field("received", &self.is_received())
            .finish()
    }
}
