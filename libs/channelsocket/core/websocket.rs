//! Websocket transport on tokio-tungstenite
//!
//! One I/O task per `connect()`. It performs the handshake, pumps frames in
//! both directions and, after an unexpected drop, retries according to the
//! configured [`ReconnectionStrategy`]. `disconnect()` stops it for good.

use crate::config::TransportConfig;
use crate::connection_state::{AtomicConnectionState, ConnectionState};
use crate::traits::*;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Commands from the transport handle to its I/O task
#[derive(Debug)]
enum TransportCommand {
    /// Write a frame
    Send(WsMessage),
    /// Close the current connection; `reconnect` keeps the retry loop alive
    Close { reconnect: bool, reason: Option<String> },
}

/// How one connection ended
enum LoopExit {
    /// Closed locally
    Closed { reconnect: bool, reason: Option<String> },
}

/// [`Transport`] over a real websocket
pub struct WebSocketTransport {
    config: Arc<TransportConfig>,
    state: Arc<AtomicConnectionState>,
    command_tx: Mutex<Option<UnboundedSender<TransportCommand>>>,
    /// Cleared by `disconnect()`; the I/O task never reconnects once false
    running: Arc<AtomicBool>,
}

impl WebSocketTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(AtomicConnectionState::new(ConnectionState::Disconnected)),
            command_tx: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.get()
    }
}

impl Transport for WebSocketTransport {
    fn connect(&self, sink: TransportSink) -> Result<()> {
        let mut slot = self.command_tx.lock();
        if slot.as_ref().is_some_and(|tx| !tx.is_closed()) {
            debug!("Websocket transport already running");
            return Ok(());
        }

        let (command_tx, command_rx) = unbounded_channel();
        self.running.store(true, Ordering::Release);
        self.state.set(ConnectionState::Connecting);

        tokio::spawn(run_transport(
            Arc::clone(&self.config),
            Arc::clone(&self.state),
            Arc::clone(&self.running),
            command_rx,
            sink,
        ));

        *slot = Some(command_tx);
        Ok(())
    }

    fn disconnect(&self) {
        self.running.store(false, Ordering::Release);
        self.state.set(ConnectionState::ShuttingDown);
        if let Some(tx) = self.command_tx.lock().take() {
            let _ = tx.send(TransportCommand::Close {
                reconnect: false,
                reason: None,
            });
        }
    }

    fn abort_connection(&self, reason: &str) {
        if let Some(tx) = self.command_tx.lock().as_ref() {
            let _ = tx.send(TransportCommand::Close {
                reconnect: true,
                reason: Some(reason.to_string()),
            });
        }
    }

    fn write(&self, message: WsMessage) -> Result<()> {
        let slot = self.command_tx.lock();
        let tx = slot.as_ref().ok_or(SocketError::NotConnected)?;
        tx.send(TransportCommand::Send(message))
            .map_err(|e| SocketError::ChannelSend(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// True from `connect()` until the I/O task exits or `disconnect()`,
    /// including the backoff between reconnection attempts
    fn is_active(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self
                .command_tx
                .lock()
                .as_ref()
                .is_some_and(|tx| !tx.is_closed())
    }
}

/// Connection + reconnection loop
async fn run_transport(
    config: Arc<TransportConfig>,
    state: Arc<AtomicConnectionState>,
    running: Arc<AtomicBool>,
    mut command_rx: UnboundedReceiver<TransportCommand>,
    sink: TransportSink,
) {
    let mut attempt = 0;

    loop {
        if !running.load(Ordering::Acquire) {
            debug!("Transport stopped, exiting connection loop");
            break;
        }

        state.set(if attempt == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting
        });

        match open(&config).await {
            Ok(stream) => {
                info!(url = %config.url(), "Websocket connected");
                state.set(ConnectionState::Connected);
                sink.connected();
                attempt = 0;

                let outcome = message_loop(stream, &mut command_rx, &sink).await;
                state.set(ConnectionState::Disconnected);

                match outcome {
                    Ok(LoopExit::Closed { reconnect, reason }) => {
                        sink.disconnected(reason);
                        if !reconnect {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Websocket connection error");
                        sink.disconnected(Some(e.to_string()));
                    }
                }
            }
            Err(e) => {
                error!(url = %config.url(), error = %e, "Failed to connect");
                state.set(ConnectionState::Disconnected);
                sink.disconnected(Some(e.to_string()));
            }
        }

        if !running.load(Ordering::Acquire) {
            break;
        }

        if !config.reconnection_delay_offset.is_zero() {
            debug!("Waiting reconnection delay offset: {:?}", config.reconnection_delay_offset);
            if !wait_or_close(config.reconnection_delay_offset, &mut command_rx).await {
                break;
            }
        }

        let Some(delay) = config.reconnect_strategy.next_delay(attempt) else {
            warn!("Reconnection strategy exhausted, stopping");
            break;
        };
        info!("Reconnecting in {:?} (attempt {})", delay, attempt + 1);
        if !wait_or_close(delay, &mut command_rx).await {
            break;
        }
        attempt += 1;
        sink.reconnecting(attempt);
    }

    if !state.is_connected() {
        state.set(ConnectionState::Disconnected);
    }
    info!("Transport task exiting");
}

/// Sleep for `delay` unless closed meanwhile. Frames queued while offline
/// are discarded. Returns false when the loop should stop.
async fn wait_or_close(delay: Duration, command_rx: &mut UnboundedReceiver<TransportCommand>) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return true,
            command = command_rx.recv() => match command {
                Some(TransportCommand::Send(_)) => {
                    debug!("Discarding frame written while offline");
                }
                Some(TransportCommand::Close { reconnect: true, .. }) => {}
                Some(TransportCommand::Close { reconnect: false, .. }) | None => return false,
            }
        }
    }
}

/// Build the handshake request (query params + headers) and connect
async fn open(config: &TransportConfig) -> Result<WsStream> {
    let url = config.endpoint_url()?;
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| SocketError::Configuration(e.to_string()))?;

    if let Some(provider) = &config.headers {
        for (key, value) in provider.get_headers().await {
            let Ok(name) = key.parse::<http::header::HeaderName>() else {
                warn!("Invalid header name: {}", key);
                continue;
            };
            let Ok(value) = value.parse::<http::header::HeaderValue>() else {
                warn!("Invalid header value for key '{}'", key);
                continue;
            };
            request.headers_mut().insert(name, value);
        }
        debug!("Connecting with custom headers");
    }

    let (stream, _) = connect_async(request)
        .await
        .map_err(|e| SocketError::Transport(e.to_string()))?;
    Ok(stream)
}

/// Pump frames until the connection ends
async fn message_loop(
    stream: WsStream,
    command_rx: &mut UnboundedReceiver<TransportCommand>,
    sink: &TransportSink,
) -> Result<LoopExit> {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => sink.frame(WsMessage::Text(text)),
                Some(Ok(Message::Binary(data))) => sink.frame(WsMessage::Binary(data)),
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("closed by server ({}): {}", f.code, f.reason))
                        .unwrap_or_else(|| "closed by server".to_string());
                    return Err(SocketError::ConnectionClosed(reason));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(SocketError::Transport(e.to_string())),
                None => return Err(SocketError::ConnectionClosed("Stream ended".into())),
            },

            command = command_rx.recv() => match command {
                Some(TransportCommand::Send(message)) => {
                    write
                        .send(to_tungstenite(message))
                        .await
                        .map_err(|e| SocketError::Transport(e.to_string()))?;
                }
                Some(TransportCommand::Close { reconnect, reason }) => {
                    let _ = write.close().await;
                    return Ok(LoopExit::Closed { reconnect, reason });
                }
                None => {
                    let _ = write.close().await;
                    return Ok(LoopExit::Closed { reconnect: false, reason: None });
                }
            },
        }
    }
}

fn to_tungstenite(message: WsMessage) -> Message {
    match message {
        WsMessage::Text(text) => Message::Text(text),
        WsMessage::Binary(data) => Message::Binary(data),
    }
}
