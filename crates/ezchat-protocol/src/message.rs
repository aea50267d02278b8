//! Message records and history pages.
//!
//! These are the shapes returned by the history endpoints and carried inside
//! `message` live events.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A unique message identifier, assigned by the server.
pub type MessageId = i64;

/// The author of a message, or the subject of a membership event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chatter {
    /// Server-side chatter identifier.
    pub id: i64,
    /// Display name.
    pub name: String,
}

impl Chatter {
    /// Create a new chatter descriptor.
    #[must_use]
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Moderation state the server attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    /// Shown normally.
    #[default]
    Visible,
    /// Flagged for review but still delivered.
    Flagged,
    /// Removed by a moderator.
    Removed,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Unique message identifier.
    pub id: MessageId,
    /// Who sent it.
    pub author: Chatter,
    /// Message body.
    pub text: String,
    /// When the server accepted the message (unix millis).
    pub sent_at: i64,
    /// Moderation state.
    #[serde(default)]
    pub status: ModerationStatus,
}

impl ChatMessage {
    /// Create a visible message.
    #[must_use]
    pub fn new(id: MessageId, author: Chatter, text: impl Into<String>, sent_at: i64) -> Self {
        Self {
            id,
            author,
            text: text.into(),
            sent_at,
            status: ModerationStatus::Visible,
        }
    }

    /// Set the moderation status.
    #[must_use]
    pub fn with_status(mut self, status: ModerationStatus) -> Self {
        self.status = status;
        self
    }
}

/// One batch of historical messages plus its continuation cursor.
///
/// A missing `next_cursor` means there is no older history to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Messages in server order (newest first).
    pub messages: Vec<ChatMessage>,
    /// Opaque cursor for the next (older) page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    /// Total number of messages in the room, if the server reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

impl Page {
    /// Create a page.
    #[must_use]
    pub fn new(messages: Vec<ChatMessage>, next_cursor: Option<String>) -> Self {
        Self {
            messages,
            next_cursor,
            total_count: None,
        }
    }

    /// Whether the server indicated more history is available.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }

    /// Check the structural invariants serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated invariant.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::with_capacity(self.messages.len());
        for message in &self.messages {
            if !seen.insert(message.id) {
                return Err(format!("duplicate message id {} in page", message.id));
            }
        }

        if let Some(total) = self.total_count {
            if total < self.messages.len() as u64 {
                return Err(format!(
                    "totalCount {} is smaller than page length {}",
                    total,
                    self.messages.len()
                ));
            }
        }

        if matches!(self.next_cursor.as_deref(), Some("")) {
            return Err("nextCursor must not be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(id: MessageId) -> ChatMessage {
        ChatMessage::new(id, Chatter::new(1, "ada"), "hi", 1_700_000_000_000)
    }

    #[test]
    fn test_message_wire_names() {
        let value = serde_json::to_value(message(5).with_status(ModerationStatus::Flagged)).unwrap();
        assert_eq!(value["sentAt"], json!(1_700_000_000_000i64));
        assert_eq!(value["status"], json!("flagged"));
        assert_eq!(value["author"]["name"], json!("ada"));
    }

    #[test]
    fn test_status_defaults_to_visible() {
        let parsed: ChatMessage = serde_json::from_value(json!({
            "id": 3,
            "author": {"id": 9, "name": "bob"},
            "text": "yo",
            "sentAt": 10
        }))
        .unwrap();
        assert_eq!(parsed.status, ModerationStatus::Visible);
    }

    #[test]
    fn test_page_validation() {
        assert!(Page::new(vec![message(1), message(2)], Some("c".into()))
            .validate()
            .is_ok());
        assert!(Page::new(vec![message(1), message(1)], None)
            .validate()
            .is_err());
        assert!(Page::new(vec![], Some(String::new())).validate().is_err());

        let mut page = Page::new(vec![message(1), message(2)], None);
        page.total_count = Some(1);
        assert!(page.validate().is_err());
    }

    #[test]
    fn test_page_without_cursor_has_no_more() {
        let page: Page = serde_json::from_value(json!({"messages": []})).unwrap();
        assert!(!page.has_more());
        assert_eq!(page.total_count, None);
    }
}
