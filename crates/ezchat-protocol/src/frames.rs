//! Frame types for the live channel.
//!
//! Every frame is a JSON object `{ "payloadType": <tag>, "payload": {...} }`.
//! Inbound frames decode to [`LiveEvent`]; outbound frames are built from
//! [`Outbound`].

use serde::{Deserialize, Serialize};

use crate::message::{ChatMessage, Chatter, MessageId};

/// Live event tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    DeleteMessage,
    Join,
    Leave,
    Ban,
    Error,
}

impl EventKind {
    /// The wire tag for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Message => "message",
            EventKind::DeleteMessage => "delete_message",
            EventKind::Join => "join",
            EventKind::Leave => "leave",
            EventKind::Ban => "ban",
            EventKind::Error => "error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A server-pushed live event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "payloadType", content = "payload")]
pub enum LiveEvent {
    /// A new chat message.
    #[serde(rename = "message")]
    Message(ChatMessage),

    /// A message was deleted.
    #[serde(rename = "delete_message")]
    DeleteMessage {
        /// Target message.
        #[serde(rename = "messageId")]
        message_id: MessageId,
    },

    /// A chatter joined the room.
    #[serde(rename = "join")]
    Join {
        #[serde(rename = "chatterId")]
        chatter_id: i64,
        #[serde(rename = "chatterName")]
        chatter_name: String,
    },

    /// A chatter left the room.
    #[serde(rename = "leave")]
    Leave {
        #[serde(rename = "chatterId")]
        chatter_id: i64,
        #[serde(rename = "chatterName")]
        chatter_name: String,
    },

    /// A chatter was banned.
    #[serde(rename = "ban")]
    Ban {
        #[serde(rename = "chatterId")]
        chatter_id: i64,
        #[serde(rename = "chatterName")]
        chatter_name: String,
        /// Name of the moderator who issued the ban.
        #[serde(rename = "bannedBy")]
        banned_by: String,
    },

    /// Server-side error report. Does not close the channel.
    #[serde(rename = "error")]
    Error {
        /// Human-readable error message.
        message: String,
    },
}

impl LiveEvent {
    /// Get the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            LiveEvent::Message(_) => EventKind::Message,
            LiveEvent::DeleteMessage { .. } => EventKind::DeleteMessage,
            LiveEvent::Join { .. } => EventKind::Join,
            LiveEvent::Leave { .. } => EventKind::Leave,
            LiveEvent::Ban { .. } => EventKind::Ban,
            LiveEvent::Error { .. } => EventKind::Error,
        }
    }

    /// The chatter a membership event refers to.
    #[must_use]
    pub fn chatter(&self) -> Option<Chatter> {
        match self {
            LiveEvent::Join {
                chatter_id,
                chatter_name,
            }
            | LiveEvent::Leave {
                chatter_id,
                chatter_name,
            }
            | LiveEvent::Ban {
                chatter_id,
                chatter_name,
                ..
            } => Some(Chatter::new(*chatter_id, chatter_name.clone())),
            LiveEvent::Message(message) => Some(message.author.clone()),
            _ => None,
        }
    }

    /// Create a Join event.
    #[must_use]
    pub fn join(chatter_id: i64, chatter_name: impl Into<String>) -> Self {
        LiveEvent::Join {
            chatter_id,
            chatter_name: chatter_name.into(),
        }
    }

    /// Create a Leave event.
    #[must_use]
    pub fn leave(chatter_id: i64, chatter_name: impl Into<String>) -> Self {
        LiveEvent::Leave {
            chatter_id,
            chatter_name: chatter_name.into(),
        }
    }

    /// Create a DeleteMessage event.
    #[must_use]
    pub fn delete(message_id: MessageId) -> Self {
        LiveEvent::DeleteMessage { message_id }
    }

    /// Create an Error event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        LiveEvent::Error {
            message: message.into(),
        }
    }
}

/// An outbound action envelope.
///
/// The server never accepts bare text; every send is wrapped in one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "payloadType", content = "payload")]
pub enum Outbound {
    /// Post a chat message.
    #[serde(rename = "message")]
    Message {
        #[serde(rename = "messageText")]
        message_text: String,
    },

    /// Ask the server to delete a message.
    #[serde(rename = "delete_message")]
    DeleteMessage {
        #[serde(rename = "messageId")]
        message_id: MessageId,
    },
}

impl Outbound {
    /// Create a message-send envelope.
    #[must_use]
    pub fn message(text: impl Into<String>) -> Self {
        Outbound::Message {
            message_text: text.into(),
        }
    }

    /// Create a delete-message envelope.
    #[must_use]
    pub fn delete_message(message_id: MessageId) -> Self {
        Outbound::DeleteMessage { message_id }
    }

    /// The tag this envelope carries on the wire.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Outbound::Message { .. } => EventKind::Message,
            Outbound::DeleteMessage { .. } => EventKind::DeleteMessage,
        }
    }
}
