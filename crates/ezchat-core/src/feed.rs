//! Reconciled, observable view of a room.
//!
//! [`RoomFeed`] installs the first history page, then opens the live
//! channel and folds every event into a [`MessageWindow`]. Consumers read
//! the result through a `watch` channel of [`FeedSnapshot`]s. Failures never
//! escape as errors; they land in the snapshot's error fields.
//!
//! Ordering is fixed per feed. Newest-first (the default) keeps the newest
//! message at index 0 and appends older pages at the end. Oldest-first
//! (`reverse_order`) mirrors that.

use ezchat_protocol::{ChatMessage, LiveEvent, MessageId};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::error::{ChatError, Result};
use crate::live::{ConnectionState, LiveEvents};
use crate::session::{LiveHandle, RoomSession};

/// One entry of the visible set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedItem {
    /// A chat message.
    Message(ChatMessage),
    /// A join, leave or ban notice.
    Notice(LiveEvent),
}

impl FeedItem {
    /// Id of the message, if this item is one.
    #[must_use]
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            FeedItem::Message(message) => Some(message.id),
            FeedItem::Notice(_) => None,
        }
    }

    #[must_use]
    pub fn as_message(&self) -> Option<&ChatMessage> {
        match self {
            FeedItem::Message(message) => Some(message),
            FeedItem::Notice(_) => None,
        }
    }
}

/// Ordered, id-unique sequence of feed items.
#[derive(Debug, Clone)]
pub struct MessageWindow {
    items: VecDeque<FeedItem>,
    ids: HashSet<MessageId>,
    reverse_order: bool,
    /// Cap applied on live inserts; 0 disables it.
    max_messages: usize,
}

impl MessageWindow {
    /// Create an empty window.
    #[must_use]
    pub fn new(reverse_order: bool, max_messages: usize) -> Self {
        Self {
            items: VecDeque::new(),
            ids: HashSet::new(),
            reverse_order,
            max_messages,
        }
    }

    /// Replace the contents with a newest-first page.
    pub fn install(&mut self, messages: Vec<ChatMessage>) {
        self.items.clear();
        self.ids.clear();
        if self.reverse_order {
            for message in messages {
                if self.ids.insert(message.id) {
                    self.items.push_front(FeedItem::Message(message));
                }
            }
        } else {
            for message in messages {
                if self.ids.insert(message.id) {
                    self.items.push_back(FeedItem::Message(message));
                }
            }
        }
    }

    /// Merge an older newest-first page at the old end.
    ///
    /// Messages already present are skipped. Returns how many were added.
    pub fn merge_older(&mut self, messages: Vec<ChatMessage>) -> usize {
        let mut added = 0;
        for message in messages {
            if !self.ids.insert(message.id) {
                continue;
            }
            if self.reverse_order {
                self.items.push_front(FeedItem::Message(message));
            } else {
                self.items.push_back(FeedItem::Message(message));
            }
            added += 1;
        }
        added
    }

    /// Insert a live message at the new end.
    ///
    /// A message whose id is already present replaces the old copy in place.
    /// Returns how many messages were evicted from the old end.
    pub fn insert_live(&mut self, message: ChatMessage) -> usize {
        if self.ids.contains(&message.id) {
            if let Some(slot) = self
                .items
                .iter_mut()
                .find(|item| item.message_id() == Some(message.id))
            {
                *slot = FeedItem::Message(message);
            }
            return 0;
        }

        self.ids.insert(message.id);
        self.push_newest(FeedItem::Message(message))
    }

    /// Append a membership notice at the new end.
    ///
    /// Returns how many messages were evicted from the old end.
    pub fn push_notice(&mut self, event: LiveEvent) -> usize {
        self.push_newest(FeedItem::Notice(event))
    }

    /// Remove the message with `id`. Returns whether it was present.
    pub fn remove(&mut self, id: MessageId) -> bool {
        if !self.ids.remove(&id) {
            return false;
        }
        self.items.retain(|item| item.message_id() != Some(id));
        true
    }

    fn push_newest(&mut self, item: FeedItem) -> usize {
        if self.reverse_order {
            self.items.push_back(item);
        } else {
            self.items.push_front(item);
        }
        self.evict()
    }

    /// Drop items from the old end down to `max_messages`. Notices are
    /// dropped too but only messages are counted.
    fn evict(&mut self) -> usize {
        if self.max_messages == 0 {
            return 0;
        }
        let mut evicted = 0;
        while self.items.len() > self.max_messages {
            let oldest = if self.reverse_order {
                self.items.pop_front()
            } else {
                self.items.pop_back()
            };
            if let Some(id) = oldest.as_ref().and_then(FeedItem::message_id) {
                self.ids.remove(&id);
                evicted += 1;
            }
        }
        evicted
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: MessageId) -> bool {
        self.ids.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeedItem> {
        self.items.iter()
    }

    /// Copy the items out in display order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<FeedItem> {
        self.items.iter().cloned().collect()
    }
}

/// Point-in-time view of a feed.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub messages: Vec<FeedItem>,
    /// True until the live channel opens or setup fails.
    pub loading: bool,
    pub error: Option<Arc<ChatError>>,
    pub connected: bool,
    pub has_more_messages: bool,
    pub is_loading_more_messages: bool,
    pub load_more_error: Option<Arc<ChatError>>,
}

impl FeedSnapshot {
    fn initial() -> Self {
        Self {
            messages: Vec::new(),
            loading: true,
            error: None,
            connected: false,
            has_more_messages: false,
            is_loading_more_messages: false,
            load_more_error: None,
        }
    }

    /// Ids of the messages in display order, skipping notices.
    #[must_use]
    pub fn message_ids(&self) -> Vec<MessageId> {
        self.messages.iter().filter_map(FeedItem::message_id).collect()
    }
}

struct FeedState {
    window: MessageWindow,
    cursor: Option<String>,
    loading: bool,
    error: Option<Arc<ChatError>>,
    connected: bool,
    loading_more: bool,
    load_more_error: Option<Arc<ChatError>>,
}

impl FeedState {
    fn new(config: &FeedConfig) -> Self {
        Self {
            window: MessageWindow::new(config.reverse_order, config.max_messages),
            cursor: None,
            loading: true,
            error: None,
            connected: false,
            loading_more: false,
            load_more_error: None,
        }
    }

    fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            messages: self.window.to_vec(),
            loading: self.loading,
            error: self.error.clone(),
            connected: self.connected,
            has_more_messages: self.cursor.is_some(),
            is_loading_more_messages: self.loading_more,
            load_more_error: self.load_more_error.clone(),
        }
    }

    fn apply(&mut self, event: LiveEvent, include_join_leave: bool) {
        let evicted = match event {
            LiveEvent::Message(message) => self.window.insert_live(message),
            LiveEvent::DeleteMessage { message_id } => {
                if !self.window.remove(message_id) {
                    debug!(message_id, "Delete for message not in view");
                }
                0
            }
            LiveEvent::Join { .. } | LiveEvent::Leave { .. } | LiveEvent::Ban { .. } => {
                if include_join_leave {
                    self.window.push_notice(event)
                } else {
                    0
                }
            }
            LiveEvent::Error { message } => {
                self.error = Some(Arc::new(ChatError::Server(message)));
                0
            }
        };

        // The cursor points past the evicted messages; paging on from it
        // would leave a hole in the view.
        if evicted > 0 && self.cursor.take().is_some() {
            debug!(evicted, "Older history no longer reachable after eviction");
        }
    }
}

struct FeedInner {
    session: Arc<RoomSession>,
    config: FeedConfig,
    state: Mutex<FeedState>,
    torn_down: AtomicBool,
    snapshots: watch::Sender<FeedSnapshot>,
    live: LiveHandle,
    init: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FeedInner {
    fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Mutate state and publish a snapshot, unless the feed is torn down.
    fn update<R>(&self, f: impl FnOnce(&mut FeedState) -> R) -> Option<R> {
        let mut state = lock(&self.state);
        if self.is_torn_down() {
            return None;
        }
        let result = f(&mut state);
        self.snapshots.send_replace(state.snapshot());
        Some(result)
    }

    fn fail(&self, error: ChatError) {
        self.update(|state| {
            state.loading = false;
            state.error = Some(Arc::new(error));
        });
    }
}

/// Routes live callbacks into a feed without keeping it alive.
struct FeedEvents {
    feed: Weak<FeedInner>,
}

impl LiveEvents for FeedEvents {
    fn on_open(&self) {
        if let Some(feed) = self.feed.upgrade() {
            feed.update(|state| {
                state.connected = true;
                state.loading = false;
                state.error = None;
            });
        }
    }

    fn on_message(&self, event: LiveEvent) {
        if let Some(feed) = self.feed.upgrade() {
            let include = feed.config.include_join_leave;
            feed.update(|state| state.apply(event, include));
        }
    }

    fn on_close(&self) {
        if let Some(feed) = self.feed.upgrade() {
            feed.update(|state| {
                state.connected = false;
                state.loading = false;
            });
        }
    }

    fn on_error(&self, error: ChatError) {
        if let Some(feed) = self.feed.upgrade() {
            feed.fail(error);
        }
    }
}

/// A room's reconciled message feed.
///
/// Dropping the feed tears it down.
pub struct RoomFeed {
    inner: Arc<FeedInner>,
}

impl RoomFeed {
    /// Start loading history and connecting the live channel.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(session: RoomSession) -> Self {
        let config = session.config().feed.clone();
        let state = FeedState::new(&config);
        let (snapshots, _) = watch::channel(FeedSnapshot::initial());
        let live = session.live_handle();

        let inner = Arc::new(FeedInner {
            session: Arc::new(session),
            config,
            state: Mutex::new(state),
            torn_down: AtomicBool::new(false),
            snapshots,
            live,
            init: Mutex::new(None),
        });

        let task = tokio::spawn(initialize(inner.clone()));
        *lock(&inner.init) = Some(task);

        Self { inner }
    }

    /// Latest snapshot.
    #[must_use]
    pub fn snapshot(&self) -> FeedSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// The underlying session.
    #[must_use]
    pub fn session(&self) -> &RoomSession {
        &self.inner.session
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.session.connection_state()
    }

    /// Send a chat message.
    ///
    /// # Errors
    ///
    /// Fails if the live channel is not open yet, already closed, or the
    /// feed has been torn down.
    pub fn send_message(&self, text: &str) -> Result<()> {
        self.with_live(|live| live.send_message(text))
    }

    /// Ask the server to delete a message.
    ///
    /// # Errors
    ///
    /// Same as [`send_message`](Self::send_message).
    pub fn delete_message(&self, message_id: MessageId) -> Result<()> {
        self.with_live(|live| live.delete_message(message_id))
    }

    fn with_live(&self, f: impl FnOnce(&LiveHandle) -> Result<()>) -> Result<()> {
        if self.inner.is_torn_down() {
            return Err(ChatError::TornDown);
        }
        f(&self.inner.live)
    }

    /// Load the next page of older history.
    ///
    /// Uses `messages_per_page` when `amount` is `None`. Does nothing while
    /// another load is running. With no cursor left, records
    /// [`ChatError::NoMoreMessages`] as the load error and issues no request.
    /// Returns the handle of the spawned load, if one was started.
    pub fn fetch_more_messages(&self, amount: Option<u32>) -> Option<JoinHandle<()>> {
        let amount = amount.unwrap_or(self.inner.config.messages_per_page);

        let cursor = self.inner.update(|state| {
            if state.loading_more {
                debug!("Load already in flight");
                return None;
            }
            match state.cursor.clone() {
                Some(cursor) => {
                    state.loading_more = true;
                    state.load_more_error = None;
                    Some(cursor)
                }
                None => {
                    state.load_more_error = Some(Arc::new(ChatError::NoMoreMessages));
                    None
                }
            }
        })??;

        let inner = self.inner.clone();
        Some(tokio::spawn(async move {
            let result = inner.session.fetch_messages(Some(&cursor), Some(amount)).await;
            let applied = inner.update(|state| {
                state.loading_more = false;
                match result {
                    Ok(page) => {
                        let added = state.window.merge_older(page.messages);
                        state.cursor = page.next_cursor;
                        debug!(added, has_more = state.cursor.is_some(), "Merged older page");
                    }
                    Err(e) => {
                        warn!(error = %e, "Loading older messages failed");
                        state.load_more_error = Some(Arc::new(e));
                    }
                }
            });
            if applied.is_none() {
                debug!("Discarded page loaded after teardown");
            }
        }))
    }

    /// Refresh the session credential.
    ///
    /// # Errors
    ///
    /// Returns the token supplier's error.
    pub async fn refresh_token(&self) -> Result<Option<String>> {
        self.inner.session.refresh_token().await
    }

    /// Stop the feed: close the live channel and freeze the view.
    ///
    /// Results that arrive afterwards are discarded. Safe to call repeatedly.
    pub fn teardown(&self) {
        {
            let _state = lock(&self.inner.state);
            if self.inner.torn_down.swap(true, Ordering::SeqCst) {
                return;
            }
        }

        if let Some(task) = lock(&self.inner.init).take() {
            task.abort();
        }
        self.inner.session.shutdown();

        info!(room = self.inner.session.room_id(), "Feed torn down");
    }

    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.inner.is_torn_down()
    }
}

impl Drop for RoomFeed {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for RoomFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomFeed")
            .field("session", &self.inner.session)
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

async fn initialize(inner: Arc<FeedInner>) {
    let room = inner.session.room_id();
    let page_size = inner.session.config().history.page_size;

    let page = match inner.session.fetch_messages(None, page_size).await {
        Ok(page) => page,
        Err(e) => {
            warn!(room, error = %e, "Initial history fetch failed");
            inner.fail(e);
            return;
        }
    };

    let installed = inner.update(|state| {
        state.window.install(page.messages);
        state.cursor = page.next_cursor;
    });
    if installed.is_none() {
        return;
    }

    let events = Arc::new(FeedEvents {
        feed: Arc::downgrade(&inner),
    });
    match inner.session.connect_websocket(events).await {
        // Sends go through the session-wide handle taken at start
        Ok(_) => {
            if inner.is_torn_down() {
                inner.session.shutdown();
            }
        }
        Err(e) => {
            warn!(room, error = %e, "Could not open live channel");
            inner.fail(e);
        }
    }
}
