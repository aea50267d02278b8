//! Client configuration.
//!
//! Every field has a default so a config file only needs to name what it
//! changes. `EZCHAT_HOST` and `EZCHAT_SECURE` override the host defaults.

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

/// A chat room identifier.
pub type RoomId = u64;

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Chat service host, with optional port.
    #[serde(default = "default_host")]
    pub host: String,

    /// Use `https`/`wss` instead of `http`/`ws`.
    #[serde(default = "default_secure")]
    pub secure: bool,

    /// History fetch configuration.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Visible message set configuration.
    #[serde(default)]
    pub feed: FeedConfig,

    /// Live channel configuration.
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Which history endpoint to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryEndpoint {
    /// `GET /c/rooms/{roomId}/messages?cursor=&size=`
    #[default]
    Current,
    /// `GET /join/{roomId}/init`, unpaginated.
    Legacy,
}

/// History fetch configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Endpoint flavour.
    #[serde(default)]
    pub endpoint: HistoryEndpoint,

    /// Page size for the initial fetch. `None` lets the server decide.
    #[serde(default = "default_page_size")]
    pub page_size: Option<u32>,
}

/// Visible message set configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Present oldest-first instead of newest-first.
    #[serde(default)]
    pub reverse_order: bool,

    /// Keep join/leave/ban notices in the visible set.
    #[serde(default)]
    pub include_join_leave: bool,

    /// Cap on items kept while live messages arrive.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Default page size for loading older history.
    #[serde(default = "default_messages_per_page")]
    pub messages_per_page: u32,
}

/// Live channel configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Largest live frame in bytes, inbound or outbound. Larger inbound
    /// frames are reported and skipped.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

// Default value functions
fn default_host() -> String {
    std::env::var("EZCHAT_HOST").unwrap_or_else(|_| "127.0.0.1:8080".to_string())
}

fn default_secure() -> bool {
    std::env::var("EZCHAT_SECURE")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn default_page_size() -> Option<u32> {
    Some(25)
}

fn default_max_messages() -> usize {
    200
}

fn default_messages_per_page() -> u32 {
    25
}

fn default_max_message_size() -> usize {
    ezchat_protocol::codec::MAX_FRAME_SIZE
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            secure: default_secure(),
            history: HistoryConfig::default(),
            feed: FeedConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            endpoint: HistoryEndpoint::default(),
            page_size: default_page_size(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            reverse_order: false,
            include_join_leave: false,
            max_messages: default_max_messages(),
            messages_per_page: default_messages_per_page(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
        }
    }
}

impl ClientConfig {
    /// Config pointing at a specific host.
    #[must_use]
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Base URL for REST calls.
    #[must_use]
    pub fn http_base(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}", scheme, self.host)
    }

    /// URL of the configured history endpoint for a room.
    #[must_use]
    pub fn history_url(&self, room: RoomId) -> String {
        match self.history.endpoint {
            HistoryEndpoint::Current => format!("{}/c/rooms/{}/messages", self.http_base(), room),
            HistoryEndpoint::Legacy => format!("{}/join/{}/init", self.http_base(), room),
        }
    }

    /// URL of the live channel for a room, with the credential embedded.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the host does not form a valid URL.
    pub fn live_url(&self, room: RoomId, token: Option<&str>) -> Result<String> {
        let scheme = if self.secure { "wss" } else { "ws" };
        let base = format!("{}://{}/join/{}", scheme, self.host, room);
        let url = match token {
            Some(token) => Url::parse_with_params(&base, [("authToken", token)]),
            None => Url::parse(&base),
        }
        .map_err(|e| {
            ChatError::Validation(ezchat_protocol::ProtocolError::Invalid(format!(
                "bad live url {}: {}",
                base, e
            )))
        })?;
        Ok(url.to_string())
    }
}
