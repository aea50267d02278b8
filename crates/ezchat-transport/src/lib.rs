//! # ezchat-transport
//!
//! Transport seams for the ezchat client.
//!
//! The client touches the network in exactly two ways, and each goes through
//! a trait so the session logic never depends on a concrete socket or HTTP
//! stack:
//!
//! - **Live channel** - [`Connector`] opens a [`LiveChannel`], split into a
//!   [`FrameSink`] and a [`FrameStream`] of JSON text frames
//! - **History** - [`HttpClient`] issues authenticated `GET` requests
//!
//! ```rust,ignore
//! use ezchat_transport::{Connector, WebSocketConnector};
//!
//! async fn tail(url: &str) {
//!     let mut channel = WebSocketConnector::default().connect(url).await.unwrap();
//!     while let Ok(Some(frame)) = channel.stream.next_frame().await {
//!         println!("{frame}");
//!     }
//! }
//! ```

pub mod traits;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use traits::{
    ConnectionId, Connector, FrameSink, FrameStream, HttpClient, HttpRequest, HttpResponse,
    LiveChannel, TransportError,
};

#[cfg(feature = "http")]
pub use http::ReqwestClient;

#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnector;
