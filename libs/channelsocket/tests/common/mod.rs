//! Common test utilities for channelsocket integration tests
//!
//! - [`MockTransport`]: in-memory transport driven by the test
//! - [`MockPhoenixServer`]: a real websocket server speaking the channel protocol

#![allow(dead_code)]

use channelsocket::{Envelope, Result, SocketError, Transport, TransportSink, WsMessage};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Let the dispatcher drain its queue
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// In-memory transport
///
/// `connect()` completes the handshake immediately unless built with
/// [`MockTransport::manual`]. Every written frame is recorded.
pub struct MockTransport {
    connected: AtomicBool,
    auto_handshake: bool,
    fail_writes: AtomicBool,
    sink: Mutex<Option<TransportSink>>,
    written: Mutex<Vec<WsMessage>>,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    abort_reasons: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::with_handshake(true))
    }

    /// Handshake completes only when the test calls [`MockTransport::complete_handshake`]
    pub fn manual() -> Arc<Self> {
        Arc::new(Self::with_handshake(false))
    }

    fn with_handshake(auto_handshake: bool) -> Self {
        Self {
            connected: AtomicBool::new(false),
            auto_handshake,
            fail_writes: AtomicBool::new(false),
            sink: Mutex::new(None),
            written: Mutex::new(Vec::new()),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            abort_reasons: Mutex::new(Vec::new()),
        }
    }

    fn sink(&self) -> TransportSink {
        self.sink
            .lock()
            .clone()
            .expect("transport was never connected")
    }

    pub fn complete_handshake(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.sink().connected();
    }

    /// Simulate the server dropping the connection
    pub fn drop_connection(&self, reason: Option<&str>) {
        self.connected.store(false, Ordering::SeqCst);
        self.sink().disconnected(reason.map(str::to_string));
    }

    /// Deliver a JSON envelope as a text frame
    pub fn deliver(&self, envelope: Value) {
        self.sink().frame(WsMessage::Text(envelope.to_string()));
    }

    pub fn deliver_raw(&self, frame: WsMessage) {
        self.sink().frame(frame);
    }

    /// Deliver a `phx_reply` for `request`
    pub fn reply(&self, request: &Envelope, status: &str, response: Value) {
        self.deliver(reply_json(request, status, response));
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Every envelope written so far, in order
    pub fn sent(&self) -> Vec<Envelope> {
        self.written
            .lock()
            .iter()
            .filter_map(|frame| frame.as_text().map(|t| serde_json::from_str(t).unwrap()))
            .collect()
    }

    pub fn sent_with_event(&self, event: &str) -> Vec<Envelope> {
        self.sent().into_iter().filter(|e| e.event == event).collect()
    }

    pub fn last_sent(&self) -> Envelope {
        self.sent().pop().expect("nothing was written")
    }

    pub fn write_count(&self) -> usize {
        self.written.lock().len()
    }

    pub fn clear_sent(&self) {
        self.written.lock().clear();
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn abort_reasons(&self) -> Vec<String> {
        self.abort_reasons.lock().clone()
    }
}

impl Transport for MockTransport {
    fn connect(&self, sink: TransportSink) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock() = Some(sink);
        if self.auto_handshake {
            self.complete_handshake();
        }
        Ok(())
    }

    fn disconnect(&self) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        if self.connected.swap(false, Ordering::SeqCst) {
            if let Some(sink) = self.sink.lock().as_ref() {
                sink.disconnected(None);
            }
        }
    }

    fn abort_connection(&self, reason: &str) {
        self.abort_reasons.lock().push(reason.to_string());
        self.disconnect();
    }

    fn write(&self, message: WsMessage) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SocketError::Transport("broken pipe".into()));
        }
        self.written.lock().push(message);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// `phx_reply` envelope answering `request`
pub fn reply_json(request: &Envelope, status: &str, response: Value) -> Value {
    json!({
        "topic": request.topic,
        "event": "phx_reply",
        "ref": request.reference,
        "payload": { "status": status, "response": response },
    })
}

/// Websocket server that answers joins, leaves and heartbeats with `ok`
///
/// Any other event is acknowledged with `ok` and broadcast back on the same
/// topic as the same event. Query strings and the `x-client-id` header of each handshake are kept.
pub struct MockPhoenixServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    kick: Arc<Notify>,
    connections: Arc<AtomicUsize>,
    handshakes: Arc<Mutex<Vec<String>>>,
    /// Stop answering heartbeats
    mute_heartbeats: Arc<AtomicBool>,
}

impl MockPhoenixServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let kick = Arc::new(Notify::new());
        let connections = Arc::new(AtomicUsize::new(0));
        let handshakes = Arc::new(Mutex::new(Vec::new()));
        let mute_heartbeats = Arc::new(AtomicBool::new(false));

        let server = Self {
            addr,
            shutdown: Arc::clone(&shutdown),
            kick: Arc::clone(&kick),
            connections: Arc::clone(&connections),
            handshakes: Arc::clone(&handshakes),
            mute_heartbeats: Arc::clone(&mute_heartbeats),
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                connections.fetch_add(1, Ordering::SeqCst);
                                let kick = Arc::clone(&kick);
                                let handshakes = Arc::clone(&handshakes);
                                let mute = Arc::clone(&mute_heartbeats);
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, kick, handshakes, mute).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown.notified() => break,
                }
            }
        });

        server
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        kick: Arc<Notify>,
        handshakes: Arc<Mutex<Vec<String>>>,
        mute_heartbeats: Arc<AtomicBool>,
    ) {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
        use tokio_tungstenite::tungstenite::Message;

        let record = move |request: &Request, response: Response| {
            let client_id = request
                .headers()
                .get("x-client-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            handshakes.lock().push(format!(
                "{}|{}",
                request.uri().query().unwrap_or_default(),
                client_id
            ));
            Ok::<Response, ErrorResponse>(response)
        };
        let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, record).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => continue,
                    };
                    let Ok(request) = serde_json::from_str::<Envelope>(&text) else {
                        continue;
                    };

                    let mut outbound = Vec::new();
                    match request.event.as_str() {
                        "heartbeat" if mute_heartbeats.load(Ordering::SeqCst) => {}
                        "heartbeat" | "phx_join" | "phx_leave" => {
                            outbound.push(reply_json(&request, "ok", json!({})));
                        }
                        _ => {
                            outbound.push(reply_json(&request, "ok", json!({})));
                            outbound.push(json!({
                                "topic": request.topic,
                                "event": request.event,
                                "ref": null,
                                "payload": request.payload,
                            }));
                        }
                    }

                    for frame in outbound {
                        if write.send(Message::Text(frame.to_string())).await.is_err() {
                            return;
                        }
                    }
                }
                _ = kick.notified() => {
                    let _ = write.close().await;
                    break;
                }
            }
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/socket/websocket", self.addr)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// `"<query>|<x-client-id header>"` per handshake
    pub fn handshakes(&self) -> Vec<String> {
        self.handshakes.lock().clone()
    }

    pub fn mute_heartbeats(&self) {
        self.mute_heartbeats.store(true, Ordering::SeqCst);
    }

    /// Close every open connection; the listener keeps accepting
    pub fn kick_all(&self) {
        self.kick.notify_waiters();
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
        self.kick.notify_waiters();
    }
}

impl Drop for MockPhoenixServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
