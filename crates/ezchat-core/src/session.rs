//! Per-room session handle.
//!
//! A [`RoomSession`] owns the credential, the history fetcher and at most
//! one live connection for a single room.

use ezchat_protocol::{FrameCodec, MessageId, Page};
use ezchat_transport::{Connector, HttpClient, ReqwestClient, WebSocketConnector};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::auth::{TokenManager, TokenSupplier};
use crate::config::{ClientConfig, RoomId};
use crate::error::{ChatError, Result};
use crate::history::HistoryFetcher;
use crate::live::{ConnectionState, LiveConnection, LiveEvents};

/// Non-fatal conditions detected while building a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionWarning {
    /// A static token and a token supplier were both given.
    StaticTokenOverridesSupplier,
}

impl fmt::Display for SessionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionWarning::StaticTokenOverridesSupplier => f.write_str(
                "Both authToken and a token supplier are provided, authToken will be used",
            ),
        }
    }
}

type LiveSlot = Arc<Mutex<Option<LiveConnection>>>;

fn lock_slot(slot: &Mutex<Option<LiveConnection>>) -> MutexGuard<'_, Option<LiveConnection>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Builder for [`RoomSession`].
pub struct RoomSessionBuilder {
    room: RoomId,
    config: ClientConfig,
    auth_token: Option<String>,
    token_supplier: Option<Arc<dyn TokenSupplier>>,
    fallback_token_supplier: Option<Arc<dyn TokenSupplier>>,
    http: Option<Arc<dyn HttpClient>>,
    connector: Option<Arc<dyn Connector>>,
}

impl RoomSessionBuilder {
    fn new(room: RoomId) -> Self {
        Self {
            room,
            config: ClientConfig::default(),
            auth_token: None,
            token_supplier: None,
            fallback_token_supplier: None,
            http: None,
            connector: None,
        }
    }

    /// Use this client configuration.
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Start with a static bearer token.
    #[must_use]
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Refresh credentials through this supplier.
    #[must_use]
    pub fn token_supplier(mut self, supplier: Arc<dyn TokenSupplier>) -> Self {
        self.token_supplier = Some(supplier);
        self
    }

    /// Supplier used only when no room-specific one is given.
    #[must_use]
    pub fn fallback_token_supplier(mut self, supplier: Arc<dyn TokenSupplier>) -> Self {
        self.fallback_token_supplier = Some(supplier);
        self
    }

    /// Replace the HTTP client.
    #[must_use]
    pub fn http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    /// Replace the live channel connector.
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Build the session.
    #[must_use]
    pub fn build(self) -> RoomSession {
        let supplier = self.token_supplier.or(self.fallback_token_supplier);
        let tokens = Arc::new(TokenManager::new(self.auth_token, supplier));

        let mut warnings = Vec::new();
        if tokens.static_overrides_supplier() {
            let warning = SessionWarning::StaticTokenOverridesSupplier;
            warn!(room = self.room, "{}", warning);
            warnings.push(warning);
        }

        let config = Arc::new(self.config);
        let http = self
            .http
            .unwrap_or_else(|| Arc::new(ReqwestClient::new()));
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WebSocketConnector::new()));

        RoomSession {
            room: self.room,
            history: HistoryFetcher::new(self.room, config.clone(), http, tokens.clone()),
            config,
            tokens,
            connector,
            live: Arc::new(Mutex::new(None)),
            warnings,
        }
    }
}

/// The public handle for one chat room.
pub struct RoomSession {
    room: RoomId,
    config: Arc<ClientConfig>,
    tokens: Arc<TokenManager>,
    history: HistoryFetcher,
    connector: Arc<dyn Connector>,
    live: LiveSlot,
    warnings: Vec<SessionWarning>,
}

impl RoomSession {
    /// Start building a session for `room`.
    #[must_use]
    pub fn builder(room: RoomId) -> RoomSessionBuilder {
        RoomSessionBuilder::new(room)
    }

    /// Room this session is bound to.
    #[must_use]
    pub fn room_id(&self) -> RoomId {
        self.room
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Warnings raised while the session was built.
    #[must_use]
    pub fn warnings(&self) -> &[SessionWarning] {
        &self.warnings
    }

    /// The credential currently held.
    #[must_use]
    pub fn current_token(&self) -> Option<String> {
        self.tokens.current_token()
    }

    /// Refresh the credential.
    ///
    /// # Errors
    ///
    /// Returns the token supplier's error.
    pub async fn refresh_token(&self) -> Result<Option<String>> {
        self.tokens.refresh().await
    }

    /// Fetch a page of history.
    ///
    /// # Errors
    ///
    /// Returns the last error once the retry bound is exhausted.
    pub async fn fetch_messages(&self, cursor: Option<&str>, size: Option<u32>) -> Result<Page> {
        self.history.fetch_page(cursor, size).await
    }

    /// Open the live channel, superseding any previous one.
    ///
    /// The returned handle always acts on this session's current connection.
    ///
    /// # Errors
    ///
    /// Fails if the credential cannot be refreshed or the live URL cannot be
    /// built. Failures after that point arrive through `events`.
    pub async fn connect_websocket(&self, events: Arc<dyn LiveEvents>) -> Result<LiveHandle> {
        let token = self.tokens.refresh().await?;
        let url = self.config.live_url(self.room, token.as_deref())?;

        let mut slot = lock_slot(&self.live);
        if let Some(previous) = slot.take() {
            if previous.is_live() {
                warn!(room = self.room, "Superseding existing live connection");
            }
            previous.shutdown();
        }

        debug!(room = self.room, "Connecting live channel");
        *slot = Some(LiveConnection::open(
            self.room,
            url,
            FrameCodec::new(self.config.transport.max_message_size),
            self.connector.clone(),
            events,
        ));

        Ok(self.live_handle())
    }

    /// Handle bound to whatever live connection this session holds.
    ///
    /// Usable before [`connect_websocket`](Self::connect_websocket): sends
    /// fail with [`ChatError::NotYetConnected`] until a connection exists.
    #[must_use]
    pub fn live_handle(&self) -> LiveHandle {
        LiveHandle {
            room: self.room,
            slot: self.live.clone(),
        }
    }

    /// State of the current live connection.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        lock_slot(&self.live)
            .as_ref()
            .map_or(ConnectionState::Uninitialized, LiveConnection::state)
    }

    /// Close the live connection if it is open.
    pub fn disconnect(&self) {
        if let Some(conn) = lock_slot(&self.live).as_ref() {
            conn.disconnect();
        }
    }

    /// Stop the live connection in any state, silencing its callbacks.
    pub fn shutdown(&self) {
        if let Some(conn) = lock_slot(&self.live).as_ref() {
            conn.shutdown();
        }
    }
}

impl fmt::Debug for RoomSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomSession")
            .field("room", &self.room)
            .field("tokens", &self.tokens)
            .field("state", &self.connection_state())
            .finish()
    }
}

/// Send/disconnect handle returned by [`RoomSession::connect_websocket`].
#[derive(Clone)]
pub struct LiveHandle {
    room: RoomId,
    slot: LiveSlot,
}

impl LiveHandle {
    /// Send a chat message on the current connection.
    ///
    /// # Errors
    ///
    /// See [`LiveConnection::send_message`].
    pub fn send_message(&self, text: &str) -> Result<()> {
        match lock_slot(&self.slot).as_ref() {
            Some(conn) => conn.send_message(text),
            None => Err(ChatError::NotYetConnected { room: self.room }),
        }
    }

    /// Ask the server to delete a message.
    ///
    /// # Errors
    ///
    /// See [`LiveConnection::delete_message`].
    pub fn delete_message(&self, message_id: MessageId) -> Result<()> {
        match lock_slot(&self.slot).as_ref() {
            Some(conn) => conn.delete_message(message_id),
            None => Err(ChatError::NotYetConnected { room: self.room }),
        }
    }

    /// Close the current connection if it is open.
    pub fn disconnect(&self) {
        if let Some(conn) = lock_slot(&self.slot).as_ref() {
            conn.disconnect();
        }
    }

    /// State of the current connection.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        lock_slot(&self.slot)
            .as_ref()
            .map_or(ConnectionState::Uninitialized, LiveConnection::state)
    }
}

impl fmt::Debug for LiveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveHandle")
            .field("room", &self.room)
            .field("state", &self.state())
            .finish()
    }
}
