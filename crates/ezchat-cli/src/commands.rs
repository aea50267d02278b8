//! Interactive room client.
//!
//! Reads commands from stdin and prints feed changes to stdout.

use anyhow::Result;
use async_trait::async_trait;
use ezchat_core::{
    ChatError, FeedItem, FeedSnapshot, LiveEvent, MessageId, RoomFeed, RoomId, RoomSession,
    TokenSupplier,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::config::Config;

/// Token supplier that runs a shell command and uses its trimmed stdout.
pub struct CommandTokenSupplier {
    command: String,
}

impl CommandTokenSupplier {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl TokenSupplier for CommandTokenSupplier {
    async fn fetch_token(&self) -> ezchat_core::Result<String> {
        debug!(command = %self.command, "Running token command");
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .output()
            .await
            .map_err(|e| ChatError::TokenSupplier(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ChatError::TokenSupplier(format!(
                "token command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(ChatError::TokenSupplier(
                "token command printed nothing".into(),
            ));
        }
        Ok(token)
    }
}

/// A line typed by the user.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Send(String),
    More(Option<u32>),
    Delete(MessageId),
    Refresh,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

/// Parse one line of input.
pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Send(line.to_string());
    };

    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("quit" | "q"), None) => Input::Quit,
        (Some("help"), None) => Input::Help,
        (Some("refresh"), None) => Input::Refresh,
        (Some("more"), None) => Input::More(None),
        (Some("more"), Some(n)) => match n.parse() {
            Ok(n) => Input::More(Some(n)),
            Err(_) => Input::Invalid(format!("not a page size: {}", n)),
        },
        (Some("delete"), Some(id)) => match id.parse() {
            Ok(id) => Input::Delete(id),
            Err(_) => Input::Invalid(format!("not a message id: {}", id)),
        },
        _ => Input::Invalid(format!("unknown command: /{}", command)),
    }
}

const HELP: &str = "commands: /more [n], /delete <id>, /refresh, /quit; anything else is sent";

/// Turns successive snapshots into printable lines.
#[derive(Default)]
pub struct Renderer {
    seen: HashSet<MessageId>,
    notices: usize,
    connected: bool,
    error: Option<String>,
    load_more_error: Option<String>,
}

impl Renderer {
    pub fn render(&mut self, snapshot: &FeedSnapshot, reverse_order: bool) -> Vec<String> {
        let mut lines = Vec::new();

        if snapshot.connected != self.connected {
            self.connected = snapshot.connected;
            lines.push(if snapshot.connected {
                "* connected".to_string()
            } else {
                "* disconnected".to_string()
            });
        }

        let error = snapshot.error.as_ref().map(|e| e.to_string());
        if error != self.error {
            if let Some(error) = &error {
                lines.push(format!("! {}", error));
            }
            self.error = error;
        }

        let load_more_error = snapshot.load_more_error.as_ref().map(|e| e.to_string());
        if load_more_error != self.load_more_error {
            if let Some(error) = &load_more_error {
                lines.push(format!("! {}", error));
            }
            self.load_more_error = load_more_error;
        }

        // Print oldest first regardless of the feed's order
        let ordered: Vec<&FeedItem> = if reverse_order {
            snapshot.messages.iter().collect()
        } else {
            snapshot.messages.iter().rev().collect()
        };

        let notices: Vec<&LiveEvent> = ordered
            .iter()
            .filter_map(|item| match item {
                FeedItem::Notice(event) => Some(event),
                FeedItem::Message(_) => None,
            })
            .collect();
        let fresh_notices = notices.len().saturating_sub(self.notices);
        for event in &notices[notices.len() - fresh_notices..] {
            if let Some(chatter) = event.chatter() {
                lines.push(format!("* {} {}", chatter.name, event.kind()));
            }
        }
        self.notices = notices.len();

        for message in ordered.iter().filter_map(|item| item.as_message()) {
            if self.seen.insert(message.id) {
                lines.push(format!("[{}] {}: {}", message.id, message.author.name, message.text));
            }
        }

        lines
    }
}

/// Build the room session from configuration.
pub fn build_session(room: RoomId, config: &Config) -> RoomSession {
    let mut builder = RoomSession::builder(room).config(config.client.clone());
    if let Some(token) = &config.auth.token {
        builder = builder.auth_token(token.clone());
    }
    if let Some(command) = &config.auth.token_command {
        builder = builder.token_supplier(Arc::new(CommandTokenSupplier::new(command.clone())));
    }
    builder.build()
}

/// Join a room and run until the user quits or stdin closes.
///
/// # Errors
///
/// Returns an error if stdin cannot be read.
pub async fn run(room: RoomId, config: Config) -> Result<()> {
    let session = build_session(room, &config);
    for warning in session.warnings() {
        eprintln!("warning: {}", warning);
    }

    let reverse_order = config.client.feed.reverse_order;
    let feed = RoomFeed::start(session);
    let mut updates = feed.subscribe();

    let printer = tokio::spawn(async move {
        let mut renderer = Renderer::default();
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            for line in renderer.render(&snapshot, reverse_order) {
                println!("{}", line);
            }
        }
    });

    info!(room, "Joined room");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_input(&line) {
            Input::Send(text) => {
                if let Err(e) = feed.send_message(&text) {
                    eprintln!("! {}", e);
                }
            }
            Input::More(amount) => {
                feed.fetch_more_messages(amount);
            }
            Input::Delete(id) => {
                if let Err(e) = feed.delete_message(id) {
                    eprintln!("! {}", e);
                }
            }
            Input::Refresh => {
                if let Err(e) = feed.refresh_token().await {
                    warn!(error = %e, "Token refresh failed");
                }
            }
            Input::Help => eprintln!("{}", HELP),
            Input::Quit => break,
            Input::Empty => {}
            Input::Invalid(reason) => eprintln!("! {}", reason),
        }
    }

    feed.teardown();
    printer.abort();
    info!(room, "Left room");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ezchat_core::{ChatMessage, Chatter};

    fn snapshot(items: Vec<FeedItem>) -> FeedSnapshot {
        FeedSnapshot {
            messages: items,
            loading: false,
            error: None,
            connected: true,
            has_more_messages: false,
            is_loading_more_messages: false,
            load_more_error: None,
        }
    }

    fn item(id: MessageId, text: &str) -> FeedItem {
        FeedItem::Message(ChatMessage::new(id, Chatter::new(1, "ada"), text, id))
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("  hello there "), Input::Send("hello there".into()));
        assert_eq!(parse_input(""), Input::Empty);
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("/more"), Input::More(None));
        assert_eq!(parse_input("/more 50"), Input::More(Some(50)));
        assert_eq!(parse_input("/delete 12"), Input::Delete(12));
        assert!(matches!(parse_input("/delete x"), Input::Invalid(_)));
        assert!(matches!(parse_input("/dance"), Input::Invalid(_)));
    }

    #[test]
    fn test_renderer_prints_only_new_lines() {
        let mut renderer = Renderer::default();

        let lines = renderer.render(&snapshot(vec![item(2, "b"), item(1, "a")]), false);
        assert_eq!(lines, vec!["* connected", "[1] ada: a", "[2] ada: b"]);

        let lines = renderer.render(
            &snapshot(vec![
                FeedItem::Notice(LiveEvent::join(3, "bob")),
                item(2, "b"),
                item(1, "a"),
            ]),
            false,
        );
        assert_eq!(lines, vec!["* bob join"]);

        let mut closed = snapshot(vec![item(2, "b"), item(1, "a")]);
        closed.connected = false;
        closed.error = Some(Arc::new(ChatError::Server("kicked".into())));
        assert_eq!(renderer.render(&closed, false), vec!["* disconnected", "! kicked"]);
    }

    #[tokio::test]
    async fn test_command_token_supplier() {
        let token = CommandTokenSupplier::new("echo '  tok-123 '")
            .fetch_token()
            .await
            .unwrap();
        assert_eq!(token, "tok-123");

        let err = CommandTokenSupplier::new("exit 3").fetch_token().await.unwrap_err();
        assert!(matches!(err, ChatError::TokenSupplier(_)));

        let err = CommandTokenSupplier::new("true").fetch_token().await.unwrap_err();
        assert!(err.to_string().contains("printed nothing"));
    }
}
