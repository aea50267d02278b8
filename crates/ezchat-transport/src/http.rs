//! HTTP client implementation using reqwest.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

use crate::traits::{HttpClient, HttpRequest, HttpResponse, TransportError};

/// [`HttpClient`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a client with reqwest defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.get(&request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::RequestFailed(e.to_string()))?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::RequestFailed(e.to_string()))?;

        debug!(url = %request.url, status, bytes = body.len(), "HTTP response");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
