//! Codec for encoding and decoding ezchat frames and history bodies.
//!
//! All payloads are JSON text. Live frames are bounded by a maximum size;
//! history bodies are validated after parsing so callers never see a
//! schema-invalid page.

use thiserror::Error;

use crate::frames::{LiveEvent, Outbound};
use crate::message::{ChatMessage, Page};

/// Default maximum live frame size (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    /// JSON decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[source] serde_json::Error),

    /// Parsed, but violates the contract.
    #[error("Invalid payload: {0}")]
    Invalid(String),
}

/// Encode an outbound envelope to a text frame.
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode(frame: &Outbound) -> Result<String, ProtocolError> {
    FrameCodec::default().encode(frame)
}

/// Decode a live event from a text frame.
///
/// # Errors
///
/// Returns an error if the frame is too large or is not a known event.
pub fn decode_event(data: &str) -> Result<LiveEvent, ProtocolError> {
    FrameCodec::default().decode(data)
}

/// Decode and validate a paginated history body.
///
/// # Errors
///
/// Returns an error if the body is not a page or fails validation.
pub fn decode_page(body: &str) -> Result<Page, ProtocolError> {
    let page: Page = serde_json::from_str(body).map_err(ProtocolError::Decode)?;
    page.validate().map_err(ProtocolError::Invalid)?;
    Ok(page)
}

/// Decode the legacy init body (a bare message array) into a page.
///
/// The legacy endpoint has no pagination, so the page never has a cursor.
///
/// # Errors
///
/// Returns an error if the body is not a message array or fails validation.
pub fn decode_legacy_history(body: &str) -> Result<Page, ProtocolError> {
    let messages: Vec<ChatMessage> = serde_json::from_str(body).map_err(ProtocolError::Decode)?;
    let page = Page::new(messages, None);
    page.validate().map_err(ProtocolError::Invalid)?;
    Ok(page)
}

/// Codec for live frames with a configurable size limit.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl FrameCodec {
    /// Create a codec with the given frame limit.
    #[must_use]
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Encode an outbound envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the result exceeds the limit.
    pub fn encode(&self, frame: &Outbound) -> Result<String, ProtocolError> {
        let text = serde_json::to_string(frame).map_err(ProtocolError::Encode)?;
        self.check_size(text.len())?;
        Ok(text)
    }

    /// Decode an inbound live event.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame exceeds the limit or cannot be parsed.
    pub fn decode(&self, data: &str) -> Result<LiveEvent, ProtocolError> {
        self.check_size(data.len())?;
        serde_json::from_str(data).map_err(ProtocolError::Decode)
    }

    fn check_size(&self, size: usize) -> Result<(), ProtocolError> {
        if size > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Chatter;

    #[test]
    fn test_decode_message_event() {
        let frame = r#"{"payloadType":"message","payload":{"id":3,"author":{"id":1,"name":"ada"},"text":"hi","sentAt":99}}"#;
        let event = decode_event(frame).unwrap();
        assert_eq!(
            event,
            LiveEvent::Message(ChatMessage::new(3, Chatter::new(1, "ada"), "hi", 99))
        );
    }

    #[test]
    fn test_decode_unknown_tag() {
        match decode_event(r#"{"payloadType":"typing","payload":{}}"#) {
            Err(ProtocolError::Decode(_)) => {}
            other => panic!("Expected Decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            decode_event("not json"),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn test_frame_too_large() {
        let codec = FrameCodec::new(16);
        match codec.encode(&Outbound::message("x".repeat(64))) {
            Err(ProtocolError::FrameTooLarge { max: 16, .. }) => {}
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
        assert!(matches!(
            codec.decode(&"x".repeat(17)),
            Err(ProtocolError::FrameTooLarge { size: 17, .. })
        ));
    }

    #[test]
    fn test_decode_page_rejects_duplicates() {
        let body = r#"{"messages":[
            {"id":1,"author":{"id":1,"name":"a"},"text":"x","sentAt":1},
            {"id":1,"author":{"id":1,"name":"a"},"text":"y","sentAt":2}
        ],"nextCursor":"abc"}"#;
        assert!(matches!(decode_page(body), Err(ProtocolError::Invalid(_))));
    }

    #[test]
    fn test_decode_page_wrong_shape() {
        assert!(matches!(
            decode_page(r#"{"items":[]}"#),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_legacy_history() {
        let body = r#"[{"id":2,"author":{"id":1,"name":"a"},"text":"x","sentAt":1}]"#;
        let page = decode_legacy_history(body).unwrap();
        assert_eq!(page.messages.len(), 1);
        assert!(!page.has_more());
    }
}
