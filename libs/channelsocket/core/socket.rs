//! Socket: the connection manager
//!
//! Owns the transport, the heartbeat loop and the two registries:
//!
//! - `channels`: topic -> [`Channel`]
//! - `awaiting`: ref -> [`Push`] waiting for its reply
//!
//! Both registries live behind one lock and are only mutated by the socket.
//! Transport events, push timeouts and forced channel removals are queued to
//! a single dispatcher task and processed strictly in order, so reply and
//! event callbacks always run on that task. The heartbeat loop runs on its
//! own task and only reaches the registries through [`SocketInner::send`].

use crate::channel::Channel;
use crate::codec::Codec;
use crate::config::SocketConfig;
use crate::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics};
use crate::envelope::{events, status, Payload, HEARTBEAT_REF_PREFIX, HEARTBEAT_TOPIC};
use crate::error::Result;
use crate::heartbeat::{spawn_heartbeat, HeartbeatHandle, HeartbeatTracker};
use crate::push::Push;
use crate::transport::{SocketEvent, Transport, TransportSink, WsMessage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{debug, info, warn};

type ConnectCallback = Arc<dyn Fn() + Send + Sync>;
type DisconnectCallback = Arc<dyn Fn(Option<&str>) + Send + Sync>;

#[derive(Default)]
struct Registry {
    channels: HashMap<String, Channel>,
    awaiting: HashMap<String, Push>,
}

#[derive(Default)]
struct Callbacks {
    on_connect: Vec<ConnectCallback>,
    on_disconnect: Vec<DisconnectCallback>,
}

pub(crate) struct SocketInner {
    pub(crate) config: SocketConfig,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn Codec>,
    registry: Mutex<Registry>,
    state: AtomicConnectionState,
    metrics: AtomicMetrics,
    ref_counter: AtomicU64,
    sink: TransportSink,
    heartbeat: Mutex<Option<HeartbeatHandle>>,
    tracker: HeartbeatTracker,
    callbacks: Mutex<Callbacks>,
}

impl SocketInner {
    /// Next correlation ref, unique for the lifetime of this socket
    pub(crate) fn make_ref(&self) -> String {
        (self.ref_counter.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    /// Encode and write a push, registering it for its reply first
    pub(crate) fn send(&self, push: &Push) {
        if !self.transport.is_connected() {
            debug!(topic = %push.topic(), event = %push.event(), "Not connected, failing push");
            push.handle_not_connected();
            return;
        }

        let frame = match self.codec.encode(&push.envelope()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(topic = %push.topic(), event = %push.event(), error = %e, "Failed to encode push");
                push.handle_parse_error(&e);
                return;
            }
        };

        if let Some(reference) = push.reference() {
            self.registry
                .lock()
                .awaiting
                .insert(reference.to_string(), push.clone());
            if let Some(timeout) = push.timeout() {
                let timer = self.sink.schedule(
                    timeout,
                    SocketEvent::PushTimeout {
                        reference: reference.to_string(),
                    },
                );
                push.set_timer(timer);
            }
        }

        match self.transport.write(frame) {
            Ok(()) => {
                self.metrics.increment_sent();
                debug!(topic = %push.topic(), event = %push.event(), reference = ?push.reference(), "Push sent");
            }
            Err(e) => {
                warn!(topic = %push.topic(), event = %push.event(), error = %e, "Transport write failed");
                if let Some(reference) = push.reference() {
                    self.take_awaiting_if(reference, push);
                }
                push.handle_write_error(&e);
            }
        }
    }

    /// One heartbeat tick. Returns false when the loop should stop.
    pub(crate) fn beat(&self) -> bool {
        if !self.transport.is_connected() {
            debug!("Not connected, heartbeat loop stopping");
            return false;
        }

        if !self.tracker.is_healthy() {
            warn!(
                since_last_ack = ?self.tracker.time_since_last_ack(),
                "Heartbeat not acknowledged in time, closing connection"
            );
            self.transport.abort_connection("heartbeat timeout");
            return false;
        }

        let reference = format!("{}{}", HEARTBEAT_REF_PREFIX, self.make_ref());
        let push = Push::new(
            HEARTBEAT_TOPIC,
            events::HEARTBEAT,
            Payload::new(),
            Some(reference),
            Some(self.config.heartbeat_interval),
        );
        self.tracker.record_sent();
        self.metrics.increment_heartbeats();
        self.send(&push);
        true
    }

    fn take_awaiting_if(&self, reference: &str, push: &Push) {
        let mut registry = self.registry.lock();
        if registry
            .awaiting
            .get(reference)
            .is_some_and(|pending| Push::ptr_eq(pending, push))
        {
            registry.awaiting.remove(reference);
        }
    }

    fn unregister_channel(&self, topic: &str, channel_id: u64) -> bool {
        let mut registry = self.registry.lock();
        if registry
            .channels
            .get(topic)
            .is_some_and(|channel| channel.id() == channel_id)
        {
            registry.channels.remove(topic);
            return true;
        }
        false
    }

    fn handle_event(self: &Arc<Self>, event: SocketEvent) {
        match event {
            SocketEvent::Connected => self.on_transport_connected(),
            SocketEvent::Disconnected(reason) => self.on_transport_disconnected(reason),
            SocketEvent::Reconnecting(attempt) => {
                info!(attempt, "Transport reconnecting");
                self.state.set(ConnectionState::Reconnecting);
                self.metrics.increment_reconnects();
            }
            SocketEvent::Frame(frame) => self.on_frame(frame),
            SocketEvent::PushTimeout { reference } => {
                let push = self.registry.lock().awaiting.remove(&reference);
                if let Some(push) = push {
                    debug!(reference = %reference, topic = %push.topic(), "Push timed out");
                    push.handle_timeout();
                }
            }
            SocketEvent::LeaveTimeout { topic, channel_id } => {
                if self.unregister_channel(&topic, channel_id) {
                    warn!(topic = %topic, "Leave not acknowledged, channel force-removed");
                }
            }
        }
    }

    fn on_transport_connected(self: &Arc<Self>) {
        info!("Socket connected");
        self.state.set(ConnectionState::Connected);
        self.tracker.reset();

        let heartbeat = spawn_heartbeat(Arc::downgrade(self), self.config.heartbeat_interval);
        if let Some(previous) = self.heartbeat.lock().replace(heartbeat) {
            previous.stop();
        }

        let callbacks = self.callbacks.lock().on_connect.clone();
        for callback in callbacks {
            callback();
        }
    }

    fn on_transport_disconnected(&self, reason: Option<String>) {
        match &reason {
            Some(reason) => warn!(reason = %reason, "Socket disconnected"),
            None => info!("Socket disconnected"),
        }
        self.state.set(ConnectionState::Disconnected);
        if let Some(heartbeat) = self.heartbeat.lock().take() {
            heartbeat.stop();
        }

        let callbacks = self.callbacks.lock().on_disconnect.clone();
        for callback in callbacks {
            callback(reason.as_deref());
        }

        let Registry { channels, awaiting } = std::mem::take(&mut *self.registry.lock());
        if !awaiting.is_empty() || !channels.is_empty() {
            debug!(
                pending = awaiting.len(),
                channels = channels.len(),
                "Abandoning pending pushes and channels"
            );
        }
        for push in awaiting.values() {
            push.cancel_timer();
        }
        for channel in channels.values() {
            channel.mark_disconnected();
        }
    }

    fn on_frame(&self, frame: WsMessage) {
        self.metrics.increment_received();

        let envelope = match self.codec.decode(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                self.metrics.increment_dropped();
                return;
            }
        };
        debug!(topic = %envelope.topic, event = %envelope.event, reference = ?envelope.reference, "Frame received");

        if envelope.is_heartbeat_ref() && envelope.event == events::REPLY {
            if envelope.status() != Some(status::OK) {
                warn!(reference = ?envelope.reference, "Heartbeat rejected by server");
            }
            self.tracker.record_ack();
        }

        let push = envelope
            .reference
            .as_deref()
            .and_then(|reference| self.registry.lock().awaiting.remove(reference));
        if let Some(push) = push {
            push.handle_response(&envelope);
        }

        let channel = self.registry.lock().channels.get(&envelope.topic).cloned();
        if let Some(channel) = channel {
            channel.received(&envelope);
        }
    }
}

impl Drop for SocketInner {
    fn drop(&mut self) {
        if self.transport.is_active() {
            self.transport.disconnect();
        }
    }
}

/// Serial delivery context for everything the socket reacts to
async fn dispatch_loop(socket: Weak<SocketInner>, mut events_rx: UnboundedReceiver<SocketEvent>) {
    while let Some(event) = events_rx.recv().await {
        let Some(socket) = socket.upgrade() else {
            break;
        };
        socket.handle_event(event);
    }
    debug!("Socket dispatcher exiting");
}

/// Realtime channel multiplexer over one transport
///
/// Cloning is cheap and yields another handle to the same socket. Must be
/// created inside a Tokio runtime.
#[derive(Clone)]
pub struct Socket {
    inner: Arc<SocketInner>,
}

impl Socket {
    /// Create a socket over `transport`; `config` must already be validated
    /// by [`crate::builder`]
    pub(crate) fn new(config: SocketConfig, transport: Arc<dyn Transport>, codec: Arc<dyn Codec>) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        let tracker = HeartbeatTracker::new(config.heartbeat_timeout);
        let inner = Arc::new(SocketInner {
            config,
            transport,
            codec,
            registry: Mutex::new(Registry::default()),
            state: AtomicConnectionState::new(ConnectionState::Disconnected),
            metrics: AtomicMetrics::new(),
            ref_counter: AtomicU64::new(0),
            sink: TransportSink::new(events_tx),
            heartbeat: Mutex::new(None),
            tracker,
            callbacks: Mutex::new(Callbacks::default()),
        });

        tokio::spawn(dispatch_loop(Arc::downgrade(&inner), events_rx));

        Self { inner }
    }

    /// Open the transport; no-op if already connected or connecting
    pub fn connect(&self) -> Result<()> {
        if self.inner.transport.is_active() {
            debug!("connect() ignored, transport already active");
            return Ok(());
        }
        info!("Connecting socket");
        self.inner.state.set(ConnectionState::Connecting);
        self.inner.transport.connect(self.inner.sink.clone())
    }

    /// Close the transport and stop any pending reconnection; no-op if the
    /// transport is idle
    pub fn disconnect(&self) {
        if !self.inner.transport.is_active() {
            debug!("disconnect() ignored, transport not active");
            return;
        }
        info!("Disconnecting socket");
        // Between reconnection attempts no further disconnect event arrives
        self.inner.state.set(if self.inner.transport.is_connected() {
            ConnectionState::ShuttingDown
        } else {
            ConnectionState::Disconnected
        });
        self.inner.transport.disconnect();
    }

    /// Get or create the channel for `topic`
    ///
    /// `params` only apply when the channel is created. Does not join.
    pub fn channel(&self, topic: &str, params: Payload) -> Channel {
        let mut registry = self.inner.registry.lock();
        if let Some(existing) = registry.channels.get(topic) {
            return existing.clone();
        }
        let id = self.inner.ref_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let channel = Channel::new(id, topic.to_string(), params, Arc::downgrade(&self.inner));
        registry.channels.insert(topic.to_string(), channel.clone());
        debug!(topic = %topic, "Channel created");
        channel
    }

    /// Leave `channel` and drop it from the registry once acknowledged
    ///
    /// Without an acknowledgement the channel is force-removed after the
    /// configured leave timeout.
    pub fn remove(&self, channel: &Channel) -> Push {
        let topic = channel.topic().to_string();
        let channel_id = channel.id();
        let push = channel.leave();

        let weak = Arc::downgrade(&self.inner);
        let ack_topic = topic.clone();
        push.receive(status::OK, move |_| {
            if let Some(socket) = weak.upgrade() {
                if socket.unregister_channel(&ack_topic, channel_id) {
                    debug!(topic = %ack_topic, "Channel removed");
                }
            }
        });

        if let Some(timeout) = self.inner.config.leave_timeout {
            self.inner
                .sink
                .schedule(timeout, SocketEvent::LeaveTimeout { topic, channel_id });
        }
        push
    }

    /// Send a push built by the caller
    pub fn send(&self, push: &Push) {
        self.inner.send(push);
    }

    /// Fresh correlation ref
    pub fn make_ref(&self) -> String {
        self.inner.make_ref()
    }

    /// Called on the dispatcher each time a connection is established
    pub fn on_connect<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.callbacks.lock().on_connect.push(Arc::new(callback));
    }

    /// Called on the dispatcher each time the connection drops, with the error if any
    pub fn on_disconnect<F>(&self, callback: F)
    where
        F: Fn(Option<&str>) + Send + Sync + 'static,
    {
        self.inner.callbacks.lock().on_disconnect.push(Arc::new(callback));
    }

    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    pub fn config(&self) -> &SocketConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> Metrics {
        self.inner.metrics.snapshot(self.inner.state.get())
    }

    pub fn has_channel(&self, topic: &str) -> bool {
        self.inner.registry.lock().channels.contains_key(topic)
    }

    pub fn channel_count(&self) -> usize {
        self.inner.registry.lock().channels.len()
    }

    /// Number of pushes waiting for a reply
    pub fn pending_count(&self) -> usize {
        self.inner.registry.lock().awaiting.len()
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("state", &self.inner.state.get())
            .field("channels", &self.channel_count())
            .field("pending", &self.pending_count())
            .finish()
    }
}

