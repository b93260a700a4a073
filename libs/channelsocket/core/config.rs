use crate::traits::*;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Default heartbeat period
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default reply timeout for joins and application pushes
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on waiting for a leave acknowledgement in `Socket::remove`
pub const DEFAULT_LEAVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Multiplexer timing configuration
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Period between heartbeats while connected
    pub heartbeat_interval: Duration,

    /// Close the connection when a heartbeat stays unacknowledged this long
    pub heartbeat_timeout: Option<Duration>,

    /// Reply timeout for joins, leaves and application pushes
    pub push_timeout: Option<Duration>,

    /// Force-remove a channel from the registry if its leave is not acknowledged
    pub leave_timeout: Option<Duration>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: None,
            push_timeout: Some(DEFAULT_PUSH_TIMEOUT),
            leave_timeout: Some(DEFAULT_LEAVE_TIMEOUT),
        }
    }
}

/// Configuration for the bundled websocket transport
pub struct TransportConfig {
    /// Endpoint URL (ws:// or wss://)
    pub(crate) url: String,

    /// Query parameters appended to the URL (e.g. `vsn`, auth token)
    pub(crate) params: Vec<(String, String)>,

    /// Optional header provider for the handshake
    pub(crate) headers: Option<Arc<dyn HeaderProvider>>,

    /// Reconnection strategy after an unexpected drop
    pub(crate) reconnect_strategy: Box<dyn ReconnectionStrategy>,

    /// Delay applied after a drop, before the strategy's delay
    pub(crate) reconnection_delay_offset: Duration,
}

impl TransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: Vec::new(),
            headers: None,
            reconnect_strategy: Box::new(ExponentialBackoff::default()),
            reconnection_delay_offset: Duration::ZERO,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn has_headers(&self) -> bool {
        self.headers.is_some()
    }

    /// URL with query parameters appended and form-encoded
    pub fn endpoint_url(&self) -> Result<Url> {
        let mut url = self.parse_url()?;
        if !self.params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in &self.params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Reject URLs the websocket handshake can never accept
    pub fn validate(&self) -> Result<()> {
        self.parse_url().map(|_| ())
    }

    fn parse_url(&self) -> Result<Url> {
        let url = Url::parse(&self.url).map_err(|e| {
            SocketError::Configuration(format!("invalid websocket URL '{}': {}", self.url, e))
        })?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            scheme => Err(SocketError::Configuration(format!(
                "websocket URL must use ws or wss, got '{}'",
                scheme
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SocketConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.push_timeout, Some(Duration::from_secs(10)));
        assert!(config.heartbeat_timeout.is_none());
    }

    #[test]
    fn test_endpoint_url_appends_encoded_params() {
        let mut config = TransportConfig::new("wss://chat.example.com/socket/websocket");
        assert_eq!(
            config.endpoint_url().unwrap().as_str(),
            "wss://chat.example.com/socket/websocket"
        );

        config.params.push(("vsn".into(), "1.0.0".into()));
        config.params.push(("token".into(), "a b&c".into()));
        assert_eq!(
            config.endpoint_url().unwrap().as_str(),
            "wss://chat.example.com/socket/websocket?vsn=1.0.0&token=a+b%26c"
        );
    }

    #[test]
    fn test_endpoint_url_extends_existing_query() {
        let mut config = TransportConfig::new("ws://localhost:4000/socket?x=1");
        config.params.push(("y".into(), "2".into()));
        assert_eq!(
            config.endpoint_url().unwrap().as_str(),
            "ws://localhost:4000/socket?x=1&y=2"
        );
    }

    #[test]
    fn test_validate_scheme() {
        assert!(TransportConfig::new("wss://host/socket").validate().is_ok());
        assert!(matches!(
            TransportConfig::new("https://host/socket").validate(),
            Err(SocketError::Configuration(_))
        ));
        assert!(matches!(
            TransportConfig::new("not a url").validate(),
            Err(SocketError::Configuration(_))
        ));
    }
}
