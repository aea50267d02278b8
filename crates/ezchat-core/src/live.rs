//! Live connection to a chat room.
//!
//! A [`LiveConnection`] owns one spawned task that drives the transport:
//! it opens the channel, decodes inbound frames into [`LiveEvent`]s and
//! writes queued outbound frames. Every failure after construction is
//! reported through [`LiveEvents`]; nothing is thrown across the task
//! boundary. There is no automatic reconnect.

use ezchat_protocol::{FrameCodec, LiveEvent, MessageId, Outbound};
use ezchat_transport::{Connector, LiveChannel};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::RoomId;
use crate::error::{ChatError, Result};
use crate::metrics::{self, ConnectionMetricsGuard};

/// Lifecycle of a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Uninitialized = 0,
    Connecting = 1,
    Open = 2,
    Closing = 3,
    Closed = 4,
}

impl From<ConnectionState> for u8 {
    fn from(state: ConnectionState) -> u8 {
        state as u8
    }
}

impl TryFrom<u8> for ConnectionState {
    type Error = &'static str;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(ConnectionState::Uninitialized),
            1 => Ok(ConnectionState::Connecting),
            2 => Ok(ConnectionState::Open),
            3 => Ok(ConnectionState::Closing),
            4 => Ok(ConnectionState::Closed),
            _ => Err("Invalid connection state"),
        }
    }
}

/// Callbacks invoked by the connection task.
///
/// Each inbound frame fires exactly one callback. A fatal transport error
/// fires `on_error` followed by `on_close`.
pub trait LiveEvents: Send + Sync + 'static {
    /// The channel is open.
    fn on_open(&self) {}

    /// A server event arrived.
    fn on_message(&self, _event: LiveEvent) {}

    /// The channel closed.
    fn on_close(&self) {}

    /// A transport failure or an undecodable frame.
    fn on_error(&self, _error: ChatError) {}
}

enum Command {
    Send(String),
    Close,
}

struct Shared {
    room: RoomId,
    codec: FrameCodec,
    state: AtomicU8,
    /// Set by `shutdown`; silences every later callback.
    cancelled: AtomicBool,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        ConnectionState::try_from(self.state.load(Ordering::SeqCst))
            .unwrap_or(ConnectionState::Closed)
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.into(), Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Handle to one live channel.
///
/// Dropping the handle closes the channel.
pub struct LiveConnection {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
}

impl LiveConnection {
    /// Start connecting to `url` in a background task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(
        room: RoomId,
        url: String,
        codec: FrameCodec,
        connector: Arc<dyn Connector>,
        events: Arc<dyn LiveEvents>,
    ) -> Self {
        let shared = Arc::new(Shared {
            room,
            codec,
            state: AtomicU8::new(ConnectionState::Connecting.into()),
            cancelled: AtomicBool::new(false),
        });
        let (commands, rx) = mpsc::unbounded_channel();

        tokio::spawn(run_connection(shared.clone(), url, connector, events, rx));

        Self { shared, commands }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Room this connection belongs to.
    #[must_use]
    pub fn room(&self) -> RoomId {
        self.shared.room
    }

    /// Whether the connection is opening or open.
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Open
        )
    }

    /// Send a chat message.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotYetConnected`] while connecting and
    /// [`ChatError::NotConnected`] once closing or closed.
    pub fn send_message(&self, text: &str) -> Result<()> {
        self.send(&Outbound::message(text))
    }

    /// Ask the server to delete a message.
    ///
    /// # Errors
    ///
    /// Same readiness rules as [`send_message`](Self::send_message).
    pub fn delete_message(&self, message_id: MessageId) -> Result<()> {
        self.send(&Outbound::delete_message(message_id))
    }

    fn send(&self, outbound: &Outbound) -> Result<()> {
        let room = self.shared.room;
        match self.state() {
            ConnectionState::Open => {}
            ConnectionState::Uninitialized | ConnectionState::Connecting => {
                return Err(ChatError::NotYetConnected { room })
            }
            ConnectionState::Closing | ConnectionState::Closed => {
                return Err(ChatError::NotConnected { room })
            }
        }

        let frame = self.shared.codec.encode(outbound).map_err(ChatError::Protocol)?;
        self.commands
            .send(Command::Send(frame))
            .map_err(|_| ChatError::NotConnected { room })?;

        metrics::record_frame("outbound", outbound.kind().as_str());
        Ok(())
    }

    /// Close the channel if it is open. Does nothing otherwise.
    pub fn disconnect(&self) {
        let swapped = self.shared.state.compare_exchange(
            ConnectionState::Open.into(),
            ConnectionState::Closing.into(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if swapped.is_ok() {
            debug!(room = self.shared.room, "Disconnecting");
            if self.commands.send(Command::Close).is_err() {
                self.shared.set_state(ConnectionState::Closed);
            }
        }
    }

    /// Stop the connection in any state without firing further callbacks.
    pub fn shutdown(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        if !self.is_live() {
            return;
        }
        if self.state() == ConnectionState::Open {
            self.disconnect();
        } else {
            let _ = self.commands.send(Command::Close);
        }
    }
}

impl std::fmt::Debug for LiveConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveConnection")
            .field("room", &self.shared.room)
            .field("state", &self.state())
            .finish()
    }
}

async fn run_connection(
    shared: Arc<Shared>,
    url: String,
    connector: Arc<dyn Connector>,
    events: Arc<dyn LiveEvents>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let room = shared.room;
    debug!(room, transport = connector.name(), "Opening live connection");

    let connected = tokio::select! {
        result = connector.connect(&url) => result,
        // Only `shutdown` or dropping the handle can reach us before open
        _ = commands.recv() => {
            debug!(room, "Live connection abandoned while connecting");
            shared.set_state(ConnectionState::Closed);
            return;
        }
    };

    let LiveChannel {
        id,
        mut sink,
        mut stream,
    } = match connected {
        Ok(channel) => channel,
        Err(e) => {
            shared.set_state(ConnectionState::Closed);
            if !shared.is_cancelled() {
                warn!(room, error = %e, "Live connection failed");
                events.on_error(ChatError::Transport(e));
                events.on_close();
            }
            return;
        }
    };

    if shared.is_cancelled() {
        let _ = sink.close().await;
        shared.set_state(ConnectionState::Closed);
        return;
    }

    let _metrics_guard = ConnectionMetricsGuard::new();
    shared.set_state(ConnectionState::Open);
    info!(room, connection = %id, "Live connection open");
    events.on_open();

    loop {
        tokio::select! {
            frame = stream.next_frame() => match frame {
                Ok(Some(text)) => dispatch(&shared, events.as_ref(), &text),
                Ok(None) => {
                    debug!(room, connection = %id, "Live connection closed by server");
                    break;
                }
                Err(e) => {
                    warn!(room, connection = %id, error = %e, "Live connection error");
                    if !shared.is_cancelled() {
                        events.on_error(ChatError::Transport(e));
                    }
                    break;
                }
            },

            command = commands.recv() => match command {
                Some(Command::Send(frame)) => {
                    if let Err(e) = sink.send_text(frame).await {
                        warn!(room, connection = %id, error = %e, "Failed to send frame");
                        if !shared.is_cancelled() {
                            events.on_error(ChatError::Transport(e));
                        }
                        break;
                    }
                }
                Some(Command::Close) | None => {
                    if let Err(e) = sink.close().await {
                        debug!(room, connection = %id, error = %e, "Close handshake failed");
                    }
                    break;
                }
            },
        }
    }

    shared.set_state(ConnectionState::Closed);
    info!(room, connection = %id, "Live connection closed");
    if !shared.is_cancelled() {
        events.on_close();
    }
}

fn dispatch(shared: &Shared, events: &dyn LiveEvents, text: &str) {
    if shared.is_cancelled() {
        return;
    }

    match shared.codec.decode(text) {
        Ok(event) => {
            metrics::record_frame("inbound", event.kind().as_str());
            events.on_message(event);
        }
        Err(e) => {
            warn!(room = shared.room, error = %e, "Undecodable live frame");
            events.on_error(ChatError::Protocol(e));
        }
    }
}
