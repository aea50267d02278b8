//! Transport abstraction traits for ezchat.
//!
//! These traits define what the client needs from the network, allowing the
//! session layer to run against real sockets or in-memory fakes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a live connection, used for log correlation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a process-unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let counter = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{}", timestamp, counter))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// The server refused the upgrade with an HTTP status.
    #[error("Connection rejected with status {0}")]
    Rejected(u16),

    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// An HTTP request could not be completed.
    #[error("Request failed: {0}")]
    RequestFailed(String),
}

/// An open live channel, already split into its two directions.
pub struct LiveChannel {
    /// Identifier for logging.
    pub id: ConnectionId,
    /// Outbound half.
    pub sink: Box<dyn FrameSink>,
    /// Inbound half.
    pub stream: Box<dyn FrameStream>,
}

impl fmt::Debug for LiveChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveChannel").field("id", &self.id).finish()
    }
}

/// Something that can open live channels.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a channel to the given `ws://` or `wss://` URL.
    ///
    /// Resolves once the transport reports the channel as open.
    async fn connect(&self, url: &str) -> Result<LiveChannel, TransportError>;

    /// Get the transport name (e.g., "websocket").
    fn name(&self) -> &'static str;
}

/// Outbound half of a live channel.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the channel gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Inbound half of a live channel.
#[async_trait]
pub trait FrameStream: Send {
    /// Receive the next text frame.
    ///
    /// Returns `None` if the channel is closed cleanly.
    async fn next_frame(&mut self) -> Result<Option<String>, TransportError>;
}

/// A `GET` request against the history API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    /// Absolute URL without query string.
    pub url: String,
    /// Query parameters, appended in order.
    pub query: Vec<(String, String)>,
    /// Request headers.
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// Create a request for a URL.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Add a query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up a header value (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Look up a query parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A fully-read HTTP response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers, keys lowercased.
    pub headers: HashMap<String, String>,
    /// Body as text.
    pub body: String,
}

impl HttpResponse {
    /// Create a response with a status and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Look up a header value (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// An HTTP client able to perform history requests.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform a `GET` and read the whole body.
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_generation() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("conn_"));
    }

    #[test]
    fn test_request_builders() {
        let request = HttpRequest::get("http://host/c/rooms/1/messages")
            .with_query("size", "10")
            .with_header("Authorization", "Bearer t");

        assert_eq!(request.query_param("size"), Some("10"));
        assert_eq!(request.query_param("cursor"), None);
        assert_eq!(request.header("authorization"), Some("Bearer t"));
    }

    #[test]
    fn test_response_helpers() {
        let response = HttpResponse::new(204, "").with_header("X-Ezchat-Protocol", "1.0");
        assert!(response.is_success());
        assert_eq!(response.header("x-ezchat-protocol"), Some("1.0"));
        assert!(!HttpResponse::new(419, "").is_success());
    }
}
