//! HTTP client for reaching a bot's own REST API.

use std::time::Duration;

use serde_json::Value;

use crate::error::{ErrorKind, RuntimeError};

/// Default per-request timeout when the backend does not supply one.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin JSON client bound to one bot's resolved base URL.
///
/// Produced by [`Runtime::bot_api_client`](crate::Runtime::bot_api_client)
/// after the backend has decided which of the bot's addresses is
/// reachable. Requests carry a per-call timeout so a wedged bot cannot
/// stall its caller.
#[derive(Debug, Clone)]
pub struct BotApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl BotApiClient {
    /// Build a client for `base_url` with the given request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RuntimeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                RuntimeError::internal("bot_api_client", "failed to build HTTP client")
                    .with_source(e)
            })?;

        let base_url = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build a client with the default timeout.
    pub fn with_default_timeout(base_url: impl Into<String>) -> Result<Self, RuntimeError> {
        Self::new(base_url, DEFAULT_TIMEOUT)
    }

    /// The resolved base URL this client targets.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET` a JSON document from the bot's API.
    pub async fn get_json(&self, path: &str) -> Result<Value, RuntimeError> {
        let url = self.url(path);
        tracing::debug!(url = %url, "bot API GET");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| map_transport_error("bot_api_get", e))?;
        Self::handle_json(response).await
    }

    /// `POST` a JSON document to the bot's API.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, RuntimeError> {
        let url = self.url(path);
        tracing::debug!(url = %url, "bot API POST");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| map_transport_error("bot_api_post", e))?;
        Self::handle_json(response).await
    }

    /// Probe the bot's ping endpoint.
    pub async fn ping(&self) -> Result<(), RuntimeError> {
        self.get_json("/api/v1/ping").await.map(|_| ())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn handle_json(response: reqwest::Response) -> Result<Value, RuntimeError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RuntimeError::new("bot_api", ErrorKind::Internal)
                .with_message(format!("bot API returned {}: {}", status.as_u16(), body))
                .with_retryable(status.is_server_error()));
        }

        response.json().await.map_err(|e| {
            RuntimeError::internal("bot_api", "failed to parse bot API response").with_source(e)
        })
    }
}

fn map_transport_error(op: &'static str, err: reqwest::Error) -> RuntimeError {
    let kind = if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_connect() {
        ErrorKind::Connection
    } else {
        ErrorKind::Internal
    };
    RuntimeError::new(op, kind).with_source(err)
}
