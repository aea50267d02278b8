//! In-memory fakes shared by the unit tests.

use async_trait::async_trait;
use ezchat_protocol::{ChatMessage, Chatter, LiveEvent, MessageId, Page};
use ezchat_transport::{
    ConnectionId, Connector, FrameSink, FrameStream, HttpClient, HttpRequest, HttpResponse,
    LiveChannel, TransportError,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::ChatError;
use crate::live::LiveEvents;

pub(crate) fn message(id: MessageId) -> ChatMessage {
    ChatMessage::new(id, Chatter::new(1, "ada"), format!("message {}", id), id * 1000)
}

pub(crate) fn page_body(ids: &[MessageId], cursor: Option<&str>) -> String {
    let page = Page::new(ids.iter().copied().map(message).collect(), cursor.map(String::from));
    serde_json::to_string(&page).unwrap()
}

type Scripted = (Result<HttpResponse, TransportError>, Option<oneshot::Receiver<()>>);

/// HTTP client that replays scripted responses and records requests.
#[derive(Default)]
pub(crate) struct ScriptedHttp {
    responses: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttp {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push(&self, status: u16, body: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .push_back((Ok(HttpResponse::new(status, body)), None));
    }

    /// Queue a response that is held back until the returned sender fires.
    pub(crate) fn push_gated(&self, status: u16, body: impl Into<String>) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.responses
            .lock()
            .unwrap()
            .push_back((Ok(HttpResponse::new(status, body)), Some(rx)));
        tx
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttp {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some((response, gate)) => {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                response
            }
            None => Err(TransportError::RequestFailed("no scripted response".into())),
        }
    }
}

/// What the fake server pushes to the client.
pub(crate) enum PeerFrame {
    Text(String),
    Close,
    Error(String),
}

struct FakeLink {
    gate: oneshot::Receiver<()>,
    to_client: mpsc::UnboundedReceiver<PeerFrame>,
    from_client: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

/// Server side of a fake live channel.
pub(crate) struct FakePeer {
    open: Option<oneshot::Sender<()>>,
    to_client: mpsc::UnboundedSender<PeerFrame>,
    from_client: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

impl FakePeer {
    /// Let the pending connect complete.
    pub(crate) fn open(&mut self) {
        if let Some(open) = self.open.take() {
            let _ = open.send(());
        }
    }

    pub(crate) fn push_text(&self, text: impl Into<String>) {
        let _ = self.to_client.send(PeerFrame::Text(text.into()));
    }

    pub(crate) fn push_event(&self, event: &LiveEvent) {
        self.push_text(serde_json::to_string(event).unwrap());
    }

    pub(crate) fn close(&self) {
        let _ = self.to_client.send(PeerFrame::Close);
    }

    pub(crate) fn fail(&self, reason: &str) {
        let _ = self.to_client.send(PeerFrame::Error(reason.to_string()));
    }

    /// Frames the client has sent so far.
    pub(crate) fn sent(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(frame);
        }
        frames
    }

    pub(crate) async fn next_sent(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(5), self.from_client.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("client sink dropped")
    }

    pub(crate) fn client_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Connector handing out pre-registered fake channels.
#[derive(Default)]
pub(crate) struct FakeConnector {
    links: Mutex<VecDeque<FakeLink>>,
    urls: Mutex<Vec<String>>,
}

impl FakeConnector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register the channel the next `connect` call will get.
    pub(crate) fn expect_connection(&self) -> FakePeer {
        let (open_tx, open_rx) = oneshot::channel();
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        let (from_client_tx, from_client_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        self.links.lock().unwrap().push_back(FakeLink {
            gate: open_rx,
            to_client: to_client_rx,
            from_client: from_client_tx,
            closed: closed.clone(),
        });

        FakePeer {
            open: Some(open_tx),
            to_client: to_client_tx,
            from_client: from_client_rx,
            closed,
        }
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, url: &str) -> Result<LiveChannel, TransportError> {
        self.urls.lock().unwrap().push(url.to_string());
        let link = self.links.lock().unwrap().pop_front();
        let Some(link) = link else {
            return Err(TransportError::ConnectFailed("connection refused".into()));
        };

        link.gate
            .await
            .map_err(|_| TransportError::ConnectFailed("peer went away".into()))?;

        Ok(LiveChannel {
            id: ConnectionId::generate(),
            sink: Box::new(FakeSink {
                tx: link.from_client,
                closed: link.closed,
            }),
            stream: Box::new(FakeStream { rx: link.to_client }),
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

struct FakeSink {
    tx: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for FakeSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.tx
            .send(text)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeStream {
    rx: mpsc::UnboundedReceiver<PeerFrame>,
}

#[async_trait]
impl FrameStream for FakeStream {
    async fn next_frame(&mut self) -> Result<Option<String>, TransportError> {
        match self.rx.recv().await {
            Some(PeerFrame::Text(text)) => Ok(Some(text)),
            Some(PeerFrame::Error(reason)) => Err(TransportError::ReceiveFailed(reason)),
            Some(PeerFrame::Close) | None => Ok(None),
        }
    }
}

/// A callback observed by [`RecordingEvents`].
#[derive(Debug)]
pub(crate) enum Observed {
    Open,
    Event(LiveEvent),
    Close,
    Error(ChatError),
}

/// Live callbacks forwarded into a channel.
pub(crate) struct RecordingEvents {
    tx: mpsc::UnboundedSender<Observed>,
}

impl RecordingEvents {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Observed>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl LiveEvents for RecordingEvents {
    fn on_open(&self) {
        let _ = self.tx.send(Observed::Open);
    }

    fn on_message(&self, event: LiveEvent) {
        let _ = self.tx.send(Observed::Event(event));
    }

    fn on_close(&self) {
        let _ = self.tx.send(Observed::Close);
    }

    fn on_error(&self, error: ChatError) {
        let _ = self.tx.send(Observed::Error(error));
    }
}

pub(crate) async fn next_observed(rx: &mut mpsc::UnboundedReceiver<Observed>) -> Observed {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for callback")
        .expect("callback channel closed")
}

/// Wait until the watched value satisfies `predicate`.
pub(crate) async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, predicate: F) -> T
where
    T: Clone,
    F: Fn(&T) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let current = rx.borrow_and_update();
                if predicate(&current) {
                    return current.clone();
                }
            }
            rx.changed().await.expect("watch sender dropped");
        }
    })
    .await
    .expect("timed out waiting for state")
}

/// Poll `check` until it holds.
pub(crate) async fn eventually<F: Fn() -> bool>(check: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for condition");
}
