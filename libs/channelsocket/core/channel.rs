//! Channel: one topic multiplexed over the shared connection
//!
//! ```text
//! closed ──join──> joining ──ok──> joined ──leave──> leaving ──reply──> closed
//!                     │               │
//!                     └──error/phx_error──> errored ──join──> joining
//! ```
//!
//! A channel only holds a weak reference to its socket. Everything that
//! touches the socket registries goes through the socket.

use crate::envelope::{events, status, Envelope, Payload};
use crate::push::Push;
use crate::socket::SocketInner;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Channel membership state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Joining,
    Joined,
    Leaving,
    Errored,
}

/// Event handler, invoked with the envelope payload
pub type EventHandler = Arc<dyn Fn(&Payload) + Send + Sync>;

pub(crate) struct ChannelInner {
    id: u64,
    topic: String,
    params: Payload,
    state: Mutex<ChannelState>,
    bindings: Mutex<HashMap<String, Vec<EventHandler>>>,
    join_push: Mutex<Option<Push>>,
    socket: Weak<SocketInner>,
}

impl ChannelInner {
    /// Whether `reference` belongs to the most recent join
    fn is_current_join(&self, reference: Option<&str>) -> bool {
        self.join_push
            .lock()
            .as_ref()
            .is_some_and(|push| push.reference() == reference)
    }

    /// Apply `to` only when the current state is one of `from`
    fn transition(&self, from: &[ChannelState], to: ChannelState) -> bool {
        let mut state = self.state.lock();
        if !from.contains(&state) {
            return false;
        }
        debug!(topic = %self.topic, from = ?*state, to = ?to, "Channel state change");
        *state = to;
        true
    }
}

/// Handle to a channel; clones refer to the same channel
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    pub(crate) fn new(id: u64, topic: String, params: Payload, socket: Weak<SocketInner>) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                id,
                topic,
                params,
                state: Mutex::new(ChannelState::Closed),
                bindings: Mutex::new(HashMap::new()),
                join_push: Mutex::new(None),
                socket,
            }),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    /// Params sent with every join
    pub fn params(&self) -> &Payload {
        &self.inner.params
    }

    pub fn state(&self) -> ChannelState {
        *self.inner.state.lock()
    }

    pub fn is_joined(&self) -> bool {
        self.state() == ChannelState::Joined
    }

    /// Identity comparison
    pub fn ptr_eq(a: &Channel, b: &Channel) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Join the topic
    ///
    /// The join payload is the channel params overlaid with `payload`. While
    /// joining or joined this is a no-op that returns the in-flight join push.
    pub fn join(&self, payload: Payload) -> Push {
        {
            let mut state = self.inner.state.lock();
            if matches!(*state, ChannelState::Joining | ChannelState::Joined) {
                if let Some(existing) = self.inner.join_push.lock().clone() {
                    debug!(topic = %self.inner.topic, "Join ignored, already {:?}", *state);
                    return existing;
                }
            }
            *state = ChannelState::Joining;
        }

        let mut join_payload = self.inner.params.clone();
        join_payload.extend(payload);

        let socket = self.inner.socket.upgrade();
        let push = self.build_push(socket.as_ref(), events::JOIN, join_payload, None);

        // A superseded join may still complete or time out; only the latest moves state
        let reference = push.reference().map(str::to_string);
        let weak = Arc::downgrade(&self.inner);
        let ok_reference = reference.clone();
        push.receive(status::OK, move |_| {
            if let Some(channel) = weak.upgrade() {
                if !channel.is_current_join(ok_reference.as_deref()) {
                    debug!(topic = %channel.topic, "Ignoring reply to superseded join");
                    return;
                }
                if channel.transition(&[ChannelState::Joining], ChannelState::Joined) {
                    info!(topic = %channel.topic, "Joined channel");
                }
            }
        });
        let weak = Arc::downgrade(&self.inner);
        push.receive(status::ERROR, move |response| {
            if let Some(channel) = weak.upgrade() {
                if !channel.is_current_join(reference.as_deref()) {
                    debug!(topic = %channel.topic, "Ignoring failure of superseded join");
                    return;
                }
                if channel.transition(
                    &[ChannelState::Joining, ChannelState::Joined],
                    ChannelState::Errored,
                ) {
                    warn!(topic = %channel.topic, response = %response, "Join failed");
                }
            }
        });

        *self.inner.join_push.lock() = Some(push.clone());
        self.dispatch(socket, &push);
        push
    }

    /// Leave the topic
    ///
    /// Moves to `leaving` now and to `closed` once the leave completes, with
    /// any status.
    pub fn leave(&self) -> Push {
        {
            let mut state = self.inner.state.lock();
            debug!(topic = %self.inner.topic, from = ?*state, "Leaving channel");
            *state = ChannelState::Leaving;
        }

        let socket = self.inner.socket.upgrade();
        let push = self.build_push(socket.as_ref(), events::LEAVE, Payload::new(), None);

        for reply_status in [status::OK, status::ERROR] {
            let weak = Arc::downgrade(&self.inner);
            push.receive(reply_status, move |_| {
                if let Some(channel) = weak.upgrade() {
                    channel.transition(&[ChannelState::Leaving], ChannelState::Closed);
                    debug!(topic = %channel.topic, status = reply_status, "Left channel");
                }
            });
        }

        self.dispatch(socket, &push);
        push
    }

    /// Register a handler for `event`; handlers run in registration order
    pub fn on<F>(&self, event: &str, handler: F)
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.inner
            .bindings
            .lock()
            .entry(event.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Remove every handler bound to `event`
    pub fn off(&self, event: &str) {
        self.inner.bindings.lock().remove(event);
    }

    /// Send an application event using the socket's default push timeout
    pub fn push(&self, event: &str, payload: Payload) -> Push {
        let socket = self.inner.socket.upgrade();
        let timeout = socket.as_ref().and_then(|s| s.config.push_timeout);
        self.push_with_timeout(event, payload, timeout)
    }

    /// Send an application event with an explicit timeout (`None` waits forever)
    pub fn push_with_timeout(&self, event: &str, payload: Payload, timeout: Option<Duration>) -> Push {
        let socket = self.inner.socket.upgrade();
        let push = Push::new(
            self.inner.topic.clone(),
            event,
            payload,
            socket.as_ref().map(|s| s.make_ref()),
            timeout,
        );
        self.dispatch(socket, &push);
        push
    }

    /// Dispatch an inbound envelope addressed to this topic
    pub(crate) fn received(&self, envelope: &Envelope) {
        match envelope.event.as_str() {
            events::ERROR => {
                if self.inner.transition(
                    &[ChannelState::Joining, ChannelState::Joined],
                    ChannelState::Errored,
                ) {
                    warn!(topic = %self.inner.topic, "Server reported channel error");
                }
            }
            events::CLOSE => {
                let mut state = self.inner.state.lock();
                if *state != ChannelState::Closed {
                    info!(topic = %self.inner.topic, "Channel closed by server");
                    *state = ChannelState::Closed;
                }
            }
            _ => {}
        }

        let handlers = self
            .inner
            .bindings
            .lock()
            .get(&envelope.event)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(&envelope.payload);
        }
    }

    /// Connection dropped: a live membership is now meaningless
    pub(crate) fn mark_disconnected(&self) {
        self.inner.transition(
            &[ChannelState::Joining, ChannelState::Joined],
            ChannelState::Errored,
        );
    }

    fn build_push(
        &self,
        socket: Option<&Arc<SocketInner>>,
        event: &str,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Push {
        let timeout = timeout.or_else(|| socket.and_then(|s| s.config.push_timeout));
        Push::new(
            self.inner.topic.clone(),
            event,
            payload,
            socket.map(|s| s.make_ref()),
            timeout,
        )
    }

    fn dispatch(&self, socket: Option<Arc<SocketInner>>, push: &Push) {
        match socket {
            Some(socket) => socket.send(push),
            None => {
                warn!(topic = %self.inner.topic, event = %push.event(), "Socket dropped, failing push");
                push.handle_not_connected();
            }
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("topic", &self.inner.topic)
            .field("state", &self.state())
            .finish()
    }
}
