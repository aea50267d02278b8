//! WebSocket transport implementation.
//!
//! This module provides the live channel client using tokio-tungstenite.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, warn};

use crate::traits::{ConnectionId, Connector, FrameSink, FrameStream, LiveChannel, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens live channels over WebSocket.
///
/// Frames are handed up as text without any size policy; the frame codec
/// above decides what is acceptable.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<LiveChannel, TransportError> {
        let (ws, _response) = connect_async(url).await.map_err(|e| match e {
            WsError::Http(response) => {
                warn!(status = response.status().as_u16(), "WebSocket upgrade rejected");
                TransportError::Rejected(response.status().as_u16())
            }
            e => {
                error!("WebSocket connect failed: {}", e);
                TransportError::ConnectFailed(e.to_string())
            }
        })?;

        let id = ConnectionId::generate();
        debug!(connection = %id, "WebSocket handshake completed");

        let (sink, stream) = ws.split();
        Ok(LiveChannel {
            id,
            sink: Box::new(WebSocketSink { sink }),
            stream: Box::new(WebSocketFrames { stream }),
        })
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// Outbound half of a WebSocket channel.
struct WebSocketSink {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| match e {
                WsError::ConnectionClosed | WsError::AlreadyClosed => {
                    TransportError::ConnectionClosed
                }
                e => TransportError::SendFailed(e.to_string()),
            })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::SendFailed(format!("Failed to close: {}", e))),
        }
    }
}

/// Inbound half of a WebSocket channel.
struct WebSocketFrames {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameStream for WebSocketFrames {
    async fn next_frame(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(data))) => {
                    // Some servers send JSON as binary frames. Invalid UTF-8
                    // is replaced and left for the decoder to reject.
                    return Ok(Some(String::from_utf8_lossy(&data).into_owned()));
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // tungstenite queues the pong itself
                }
                Some(Ok(Message::Frame(_))) => {
                    // Raw frame, ignore
                }
                Some(Ok(Message::Close(_))) => {
                    debug!("Received close frame");
                    return Ok(None);
                }
                Some(Err(WsError::ConnectionClosed)) | Some(Err(WsError::AlreadyClosed)) => {
                    debug!("Connection closed");
                    return Ok(None);
                }
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!("WebSocket stream ended");
                    return Ok(None);
                }
            }
        }
    }
}
