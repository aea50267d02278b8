//! # ezchat-core
//!
//! Room sessions for the ezchat real-time chat service.
//!
//! This crate provides the client-side building blocks:
//!
//! - **Auth** - Credential holder with serialized refresh
//! - **History** - Cursor-paginated history fetch with bounded retry
//! - **Live** - Live channel state machine and event dispatch
//! - **Session** - Per-room handle tying the above together
//! - **Feed** - Reconciled, observable message view
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  RoomFeed   │────▶│ RoomSession │────▶│TokenManager │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                        │        │
//!                        ▼        ▼
//!             ┌──────────────┐ ┌──────────────┐
//!             │HistoryFetcher│ │LiveConnection│
//!             └──────────────┘ └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use ezchat_core::{ClientConfig, RoomFeed, RoomSession};
//!
//! # async fn run() {
//! let session = RoomSession::builder(42)
//!     .config(ClientConfig::for_host("chat.example.com"))
//!     .auth_token("secret")
//!     .build();
//!
//! let feed = RoomFeed::start(session);
//! let mut updates = feed.subscribe();
//! while updates.changed().await.is_ok() {
//!     let snapshot = updates.borrow().clone();
//!     println!("{} messages", snapshot.messages.len());
//! }
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod feed;
pub mod history;
pub mod live;
pub mod metrics;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{token_fn, FnTokenSupplier, TokenManager, TokenSupplier};
pub use config::{ClientConfig, FeedConfig, HistoryConfig, HistoryEndpoint, RoomId, TransportConfig};
pub use error::{ChatError, Result};
pub use feed::{FeedItem, FeedSnapshot, MessageWindow, RoomFeed};
pub use history::{HistoryFetcher, CREDENTIAL_EXPIRED_STATUS, MAX_FETCH_ATTEMPTS};
pub use live::{ConnectionState, LiveConnection, LiveEvents};
pub use session::{LiveHandle, RoomSession, RoomSessionBuilder, SessionWarning};

pub use ezchat_protocol::{ChatMessage, Chatter, LiveEvent, MessageId, ModerationStatus, Page};
