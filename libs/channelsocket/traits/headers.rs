use async_trait::async_trait;
use std::collections::HashMap;

/// HTTP headers sent with the websocket handshake
pub type Headers = HashMap<String, String>;

/// Trait for providing handshake headers dynamically
///
/// Called on every connection attempt, including reconnections, so short
/// lived credentials (session tokens, signed timestamps) can be refreshed.
///
/// # Example
/// ```ignore
/// struct VisitorToken {
///     store: Arc<TokenStore>,
/// }
///
/// #[async_trait::async_trait]
/// impl HeaderProvider for VisitorToken {
///     async fn get_headers(&self) -> Headers {
///         let mut headers = HashMap::new();
///         headers.insert("Authorization".to_string(), format!("Bearer {}", self.store.current()));
///         headers
///     }
/// }
/// ```
#[async_trait]
pub trait HeaderProvider: Send + Sync {
    /// Generate headers for the next handshake
    async fn get_headers(&self) -> Headers;
}

/// Static header set, cloned for every handshake
#[derive(Debug, Clone, Default)]
pub struct StaticHeaders(pub Headers);

#[async_trait]
impl HeaderProvider for StaticHeaders {
    async fn get_headers(&self) -> Headers {
        self.0.clone()
    }
}
