//! Paginated history retrieval.
//!
//! Each attempt refreshes the credential and only then builds the request,
//! so a request never carries a token older than a refresh that started
//! before it. Failures are retried up to [`MAX_FETCH_ATTEMPTS`] times.

use ezchat_protocol::{codec, Page, Version, PROTOCOL_VERSION, PROTOCOL_VERSION_HEADER};
use ezchat_transport::{HttpClient, HttpRequest, HttpResponse};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::TokenManager;
use crate::config::{ClientConfig, HistoryEndpoint, RoomId};
use crate::error::{ChatError, Result};
use crate::metrics;

/// Attempts per fetch, including the first.
pub const MAX_FETCH_ATTEMPTS: usize = 2;

/// Status the server uses for an expired credential.
pub const CREDENTIAL_EXPIRED_STATUS: u16 = 419;

/// Fetches pages of message history for one room.
#[derive(Clone)]
pub struct HistoryFetcher {
    room: RoomId,
    config: Arc<ClientConfig>,
    http: Arc<dyn HttpClient>,
    tokens: Arc<TokenManager>,
}

impl HistoryFetcher {
    /// Create a fetcher.
    #[must_use]
    pub fn new(
        room: RoomId,
        config: Arc<ClientConfig>,
        http: Arc<dyn HttpClient>,
        tokens: Arc<TokenManager>,
    ) -> Self {
        Self {
            room,
            config,
            http,
            tokens,
        }
    }

    /// Fetch one page, starting at `cursor` (newest page when `None`).
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt once all attempts have failed.
    pub async fn fetch_page(&self, cursor: Option<&str>, page_size: Option<u32>) -> Result<Page> {
        let mut attempt = 1;
        let mut fresh_after_expiry = None;

        loop {
            let result = match fresh_after_expiry.take() {
                Some(token) => self.attempt(cursor, page_size, token).await,
                None => match self.tokens.refresh().await {
                    Ok(token) => self.attempt(cursor, page_size, token).await,
                    Err(e) => Err(e),
                },
            };

            let error = match result {
                Ok(page) => return Ok(page),
                Err(e) => e,
            };

            metrics::record_history_failure(error.kind());
            if attempt >= MAX_FETCH_ATTEMPTS {
                warn!(room = self.room, attempt, error = %error, "History fetch failed");
                return Err(error);
            }

            warn!(room = self.room, attempt, error = %error, "History fetch attempt failed, retrying");
            if matches!(error, ChatError::CredentialExpired) {
                // Refresh right away; the next attempt reuses this token
                match self.tokens.refresh().await {
                    Ok(token) => fresh_after_expiry = Some(token),
                    Err(e) => warn!(room = self.room, error = %e, "Token refresh after expiry failed"),
                }
            }
            attempt += 1;
        }
    }

    async fn attempt(
        &self,
        cursor: Option<&str>,
        page_size: Option<u32>,
        token: Option<String>,
    ) -> Result<Page> {
        let request = self.build_request(cursor, page_size, token.as_deref());
        debug!(room = self.room, url = %request.url, cursor = ?cursor, "Fetching history");
        metrics::record_history_request();

        let response = self.http.get(request).await?;
        self.check_version(&response);

        if response.is_success() {
            let page = match self.config.history.endpoint {
                HistoryEndpoint::Current => codec::decode_page(&response.body),
                HistoryEndpoint::Legacy => codec::decode_legacy_history(&response.body),
            }
            .map_err(ChatError::Validation)?;

            debug!(
                room = self.room,
                messages = page.messages.len(),
                has_more = page.has_more(),
                "History page received"
            );
            Ok(page)
        } else if response.status == CREDENTIAL_EXPIRED_STATUS {
            Err(ChatError::CredentialExpired)
        } else {
            Err(ChatError::request(response.status, response.body))
        }
    }

    fn build_request(
        &self,
        cursor: Option<&str>,
        page_size: Option<u32>,
        token: Option<&str>,
    ) -> HttpRequest {
        let mut request = HttpRequest::get(self.config.history_url(self.room))
            .with_header("Content-Type", "application/json")
            .with_header(PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION.to_string());

        if let Some(token) = token {
            request = request.with_header("Authorization", format!("Bearer {}", token));
        }

        if self.config.history.endpoint == HistoryEndpoint::Current {
            if let Some(cursor) = cursor {
                request = request.with_query("cursor", cursor);
            }
            if let Some(size) = page_size {
                request = request.with_query("size", size.to_string());
            }
        }

        request
    }

    fn check_version(&self, response: &HttpResponse) {
        if let Some(value) = response.header(PROTOCOL_VERSION_HEADER) {
            match value.parse::<Version>() {
                Ok(server) if PROTOCOL_VERSION.compare(&server).is_compatible() => {}
                Ok(server) => warn!(
                    room = self.room,
                    server = %server,
                    client = %PROTOCOL_VERSION,
                    "Server speaks an incompatible protocol version"
                ),
                Err(e) => debug!(room = self.room, error = %e, "Ignoring protocol version header"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token_fn;
    use crate::testing::{page_body, ScriptedHttp};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fetcher(http: Arc<ScriptedHttp>, tokens: TokenManager) -> HistoryFetcher {
        HistoryFetcher::new(
            7,
            Arc::new(ClientConfig::for_host("chat.test")),
            http,
            Arc::new(tokens),
        )
    }

    fn counting_tokens() -> (TokenManager, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let supplier = token_fn(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(format!("tok-{}", n)) }
        });
        (TokenManager::new(None, Some(supplier)), calls)
    }

    #[tokio::test]
    async fn test_request_shape() {
        let http = ScriptedHttp::new();
        http.push(200, page_body(&[2, 1], Some("c1")));
        let (tokens, _) = counting_tokens();

        let page = fetcher(http.clone(), tokens)
            .fetch_page(Some("c0"), Some(10))
            .await
            .unwrap();
        assert_eq!(page.messages.len(), 2);
        assert_eq!(page.next_cursor.as_deref(), Some("c1"));

        let request = &http.requests()[0];
        assert_eq!(request.url, "http://chat.test/c/rooms/7/messages");
        assert_eq!(request.query_param("cursor"), Some("c0"));
        assert_eq!(request.query_param("size"), Some("10"));
        assert_eq!(request.header("authorization"), Some("Bearer tok-1"));
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.header(PROTOCOL_VERSION_HEADER), Some("1.0"));
    }

    #[tokio::test]
    async fn test_omits_absent_parameters_and_token() {
        let http = ScriptedHttp::new();
        http.push(200, page_body(&[], None));

        fetcher(http.clone(), TokenManager::new(None, None))
            .fetch_page(None, None)
            .await
            .unwrap();

        let request = &http.requests()[0];
        assert!(request.query.is_empty());
        assert_eq!(request.header("authorization"), None);
    }

    #[tokio::test]
    async fn test_two_server_errors_surface_last_body() {
        let http = ScriptedHttp::new();
        http.push(500, "first failure");
        http.push(500, "second failure");
        http.push(200, page_body(&[1], None));
        let (tokens, _) = counting_tokens();

        let err = fetcher(http.clone(), tokens)
            .fetch_page(None, None)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "second failure");
        assert!(matches!(err, ChatError::Request { status: 500, .. }));
        assert_eq!(http.request_count(), 2);
    }

    #[tokio::test]
    async fn test_expired_credential_then_success() {
        let http = ScriptedHttp::new();
        http.push(CREDENTIAL_EXPIRED_STATUS, "");
        http.push(200, page_body(&[3, 2, 1], Some("next")));
        let (tokens, calls) = counting_tokens();

        let page = fetcher(http.clone(), tokens)
            .fetch_page(None, None)
            .await
            .unwrap();
        assert_eq!(page.messages.len(), 3);

        let requests = http.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].header("authorization"), Some("Bearer tok-1"));
        assert_eq!(requests[1].header("authorization"), Some("Bearer tok-2"));
        // One refresh per attempt, none wasted
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_twice_is_credential_error() {
        let http = ScriptedHttp::new();
        http.push(CREDENTIAL_EXPIRED_STATUS, "");
        http.push(CREDENTIAL_EXPIRED_STATUS, "");
        let (tokens, _) = counting_tokens();

        let err = fetcher(http, tokens).fetch_page(None, None).await.unwrap_err();
        assert!(matches!(err, ChatError::CredentialExpired));
    }

    #[tokio::test]
    async fn test_invalid_body_is_validation_failure() {
        let http = ScriptedHttp::new();
        http.push(200, r#"{"unexpected": true}"#);
        http.push(200, "[]");

        let err = fetcher(http.clone(), TokenManager::new(None, None))
            .fetch_page(None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
        assert_eq!(http.request_count(), 2);
    }

    #[tokio::test]
    async fn test_transport_failure_is_retried() {
        // An empty script fails every request at the transport level
        let http = ScriptedHttp::new();
        let fetch = fetcher(http.clone(), TokenManager::new(None, None));
        let err = fetch.fetch_page(None, None).await.unwrap_err();
        assert!(matches!(err, ChatError::Transport(_)));
        assert_eq!(http.request_count(), 2);
    }

    #[tokio::test]
    async fn test_legacy_endpoint() {
        let http = ScriptedHttp::new();
        http.push(200, serde_json::to_string(&[crate::testing::message(4)]).unwrap());

        let mut config = ClientConfig::for_host("chat.test");
        config.history.endpoint = HistoryEndpoint::Legacy;
        let fetch = HistoryFetcher::new(
            7,
            Arc::new(config),
            http.clone(),
            Arc::new(TokenManager::new(Some("static".into()), None)),
        );

        let page = fetch.fetch_page(Some("ignored"), Some(5)).await.unwrap();
        assert_eq!(page.messages.len(), 1);
        assert!(!page.has_more());

        let request = &http.requests()[0];
        assert_eq!(request.url, "http://chat.test/join/7/init");
        assert!(request.query.is_empty());
        assert_eq!(request.header("authorization"), Some("Bearer static"));
    }
}
