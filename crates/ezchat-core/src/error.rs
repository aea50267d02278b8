//! Error taxonomy for the ezchat client.

use ezchat_protocol::ProtocolError;
use ezchat_transport::TransportError;
use thiserror::Error;

use crate::config::RoomId;

/// Errors surfaced by sessions, history fetches and live connections.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The server rejected the credential (HTTP 419).
    #[error("authToken is out of date")]
    CredentialExpired,

    /// Network-level failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// `send` was called while the connection was still opening.
    #[error("Websocket for room {room} is not yet connected")]
    NotYetConnected { room: RoomId },

    /// `send` was called on a closing or closed connection.
    #[error("Websocket for room {room} is not connected")]
    NotConnected { room: RoomId },

    /// A server payload did not match the contract.
    #[error("Invalid server payload: {0}")]
    Validation(#[source] ProtocolError),

    /// A frame could not be encoded or decoded.
    #[error("Protocol error: {0}")]
    Protocol(#[source] ProtocolError),

    /// Non-success, non-419 response. Displays the server's body text.
    #[error("{message}")]
    Request { status: u16, message: String },

    /// The configured token supplier failed.
    #[error("Token supplier failed: {0}")]
    TokenSupplier(String),

    /// The server pushed an `error` live event.
    #[error("{0}")]
    Server(String),

    /// No cursor is available for loading older history.
    #[error("No more messages to fetch")]
    NoMoreMessages,

    /// The session was torn down.
    #[error("Session has been torn down")]
    TornDown,
}

impl ChatError {
    /// Create a request error from a status and body text.
    pub fn request(status: u16, message: impl Into<String>) -> Self {
        Self::Request {
            status,
            message: message.into(),
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CredentialExpired => "credential_expired",
            Self::Transport(_) => "transport",
            Self::NotYetConnected { .. } | Self::NotConnected { .. } => "not_ready",
            Self::Validation(_) => "validation",
            Self::Protocol(_) => "protocol",
            Self::Request { .. } => "request",
            Self::TokenSupplier(_) => "token_supplier",
            Self::Server(_) => "server",
            Self::NoMoreMessages => "no_more_messages",
            Self::TornDown => "torn_down",
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ChatError>;
