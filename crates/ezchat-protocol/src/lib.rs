//! # ezchat-protocol
//!
//! Wire contract for the ezchat chat service.
//!
//! This crate pins the single schema the client speaks: the message record
//! returned by the history endpoints, the paginated page envelope, the tagged
//! live events pushed over the real-time channel, and the outbound envelopes
//! the client sends back.
//!
//! ## Live Event Tags
//!
//! - `message` - A new chat message
//! - `delete_message` - A message was removed
//! - `join` / `leave` - Chatter membership changes
//! - `ban` - A chatter was banned
//! - `error` - Server-side error report
//!
//! ## Example
//!
//! ```rust
//! use ezchat_protocol::{codec, LiveEvent, Outbound};
//!
//! let frame = codec::encode(&Outbound::message("hello")).unwrap();
//! assert!(frame.contains("\"payloadType\":\"message\""));
//!
//! let event = codec::decode_event(r#"{"payloadType":"delete_message","payload":{"messageId":7}}"#).unwrap();
//! assert_eq!(event, LiveEvent::DeleteMessage { message_id: 7 });
//! ```

pub mod codec;
pub mod frames;
pub mod message;
pub mod version;

pub use codec::{
    decode_event, decode_legacy_history, decode_page, encode, FrameCodec, ProtocolError,
};
pub use frames::{EventKind, LiveEvent, Outbound};
pub use message::{ChatMessage, Chatter, MessageId, ModerationStatus, Page};
pub use version::{
    Compatibility, ParseVersionError, Version, PROTOCOL_VERSION, PROTOCOL_VERSION_HEADER,
};
