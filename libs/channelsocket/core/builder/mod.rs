pub mod states;

use crate::config::{SocketConfig, TransportConfig};
use crate::socket::Socket;
use crate::traits::*;
use crate::websocket::WebSocketTransport;
use states::*;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Type-state builder for [`Socket`]
///
/// Pick a transport first, with [`SocketBuilder::url`] for the bundled
/// websocket transport or [`SocketBuilder::transport`] for your own. `build()`
/// is only available after that.
pub struct SocketBuilder<T>
where
    T: TransportState,
{
    _state: PhantomData<T>,
    config: SocketConfig,
    codec: Option<Arc<dyn Codec>>,
    ws: Option<TransportConfig>,
    transport: Option<Arc<dyn Transport>>,
}

impl SocketBuilder<NoTransport> {
    pub fn new() -> Self {
        Self {
            _state: PhantomData,
            config: SocketConfig::default(),
            codec: None,
            ws: None,
            transport: None,
        }
    }

    /// Connect over a websocket to `url` (ws:// or wss://)
    pub fn url(self, url: impl Into<String>) -> SocketBuilder<HasUrl> {
        SocketBuilder {
            _state: PhantomData,
            config: self.config,
            codec: self.codec,
            ws: Some(TransportConfig::new(url)),
            transport: None,
        }
    }

    /// Use a caller-supplied transport
    pub fn transport<T>(self, transport: Arc<T>) -> SocketBuilder<HasTransport>
    where
        T: Transport,
    {
        SocketBuilder {
            _state: PhantomData,
            config: self.config,
            codec: self.codec,
            ws: None,
            transport: Some(transport as Arc<dyn Transport>),
        }
    }
}

impl Default for SocketBuilder<NoTransport> {
    fn default() -> Self {
        Self::new()
    }
}

// Options available in every state
impl<T> SocketBuilder<T>
where
    T: TransportState,
{
    /// Frame codec, [`JsonCodec`] by default
    pub fn codec(mut self, codec: impl Codec) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Close the connection when heartbeats stay unacknowledged this long
    ///
    /// Recommended value: 2-3x the heartbeat interval.
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.config.heartbeat_timeout = Some(timeout);
        self
    }

    /// Reply timeout for joins and pushes; `None` waits forever
    pub fn push_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.push_timeout = timeout;
        self
    }

    /// Bound on `Socket::remove` waiting for the leave acknowledgement
    pub fn leave_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.leave_timeout = timeout;
        self
    }

    /// Replace the whole timing configuration
    pub fn socket_config(mut self, config: SocketConfig) -> Self {
        self.config = config;
        self
    }

    fn take_codec(&mut self) -> Arc<dyn Codec> {
        self.codec
            .take()
            .unwrap_or_else(|| Arc::new(JsonCodec::default()))
    }

    fn check_config(&self) -> Result<()> {
        if self.config.heartbeat_interval.is_zero() {
            return Err(SocketError::Configuration(
                "heartbeat interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

// Websocket-only options
impl SocketBuilder<HasUrl> {
    /// Add a query parameter to the endpoint URL
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Some(ws) = self.ws.as_mut() {
            ws.params.push((key.into(), value.into()));
        }
        self
    }

    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        if let Some(ws) = self.ws.as_mut() {
            ws.params
                .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        }
        self
    }

    pub fn headers(mut self, provider: impl HeaderProvider + 'static) -> Self {
        if let Some(ws) = self.ws.as_mut() {
            ws.headers = Some(Arc::new(provider));
        }
        self
    }

    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        if let Some(ws) = self.ws.as_mut() {
            ws.reconnect_strategy = Box::new(strategy);
        }
        self
    }

    /// Extra wait after a drop, applied before the strategy's delay
    pub fn reconnection_delay_offset(mut self, offset: Duration) -> Self {
        if let Some(ws) = self.ws.as_mut() {
            ws.reconnection_delay_offset = offset;
        }
        self
    }

    /// Build the socket. Must be called inside a Tokio runtime. Does not connect.
    pub fn build(mut self) -> Result<Socket> {
        self.check_config()?;
        let ws = self
            .ws
            .take()
            .ok_or_else(|| SocketError::Configuration("URL must be set".into()))?;
        ws.validate()?;
        debug!(url = %ws.url(), params = ws.params.len(), "Building websocket socket");

        let codec = self.take_codec();
        let transport: Arc<dyn Transport> = Arc::new(WebSocketTransport::new(ws));
        Ok(Socket::new(self.config, transport, codec))
    }
}

impl SocketBuilder<HasTransport> {
    /// Build the socket. Must be called inside a Tokio runtime. Does not connect.
    pub fn build(mut self) -> Result<Socket> {
        self.check_config()?;
        let transport = self
            .transport
            .take()
            .ok_or_else(|| SocketError::Configuration("transport must be set".into()))?;

        let codec = self.take_codec();
        Ok(Socket::new(self.config, transport, codec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_non_websocket_url() {
        let result = SocketBuilder::new().url("http://localhost:4000/socket").build();
        assert!(matches!(result, Err(SocketError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_rejects_zero_heartbeat() {
        let result = SocketBuilder::new()
            .url("ws://localhost:4000/socket/websocket")
            .heartbeat_interval(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(SocketError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_rejects_zero_heartbeat_from_socket_config() {
        let transport = Arc::new(WebSocketTransport::new(TransportConfig::new(
            "ws://localhost:4000/socket/websocket",
        )));
        let result = SocketBuilder::new()
            .transport(transport)
            .socket_config(SocketConfig {
                heartbeat_interval: Duration::ZERO,
                ..SocketConfig::default()
            })
            .build();
        assert!(matches!(result, Err(SocketError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_options_reach_socket_config() {
        let socket = SocketBuilder::new()
            .heartbeat_interval(Duration::from_secs(5))
            .url("ws://localhost:4000/socket/websocket")
            .param("vsn", "2.0.0")
            .push_timeout(None)
            .leave_timeout(Some(Duration::from_secs(2)))
            .build()
            .unwrap();

        assert_eq!(socket.config().heartbeat_interval, Duration::from_secs(5));
        assert_eq!(socket.config().push_timeout, None);
        assert_eq!(socket.config().leave_timeout, Some(Duration::from_secs(2)));
        assert!(!socket.is_connected());
    }
}
