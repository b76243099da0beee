//! OpenAI-compatible streaming completion client.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::Client;
use tracing::{debug, warn};

use super::error::{CompletionError, CompletionResult};
use super::provider::{CompletionProvider, CompletionStream};
use super::types::{ChatCompletionPayload, CompletionRequest, UpstreamConfig};

/// Upper bound on how much of an error body is kept for diagnostics.
const MAX_ERROR_BODY: usize = 512;

/// Client for an OpenAI-compatible `/chat/completions` endpoint (Groq by default).
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    /// HTTP client.
    client: Client,
    /// Base URL (e.g., "https://api.groq.com/openai/v1").
    base_url: String,
    /// Bearer token.
    api_key: String,
    /// Model identifier sent with every request.
    model: String,
    /// Deadline for the provider to start answering.
    request_timeout: Duration,
}

impl OpenAiCompatClient {
    /// Create a client from configuration. Fails when no API key is available.
    pub fn new(config: &UpstreamConfig) -> CompletionResult<Self> {
        let api_key = config
            .resolve_api_key()
            .ok_or(CompletionError::MissingApiKey)?;
        Self::with_api_key(config, api_key)
    }

    /// Create a client with an explicit API key.
    pub fn with_api_key(
        config: &UpstreamConfig,
        api_key: impl Into<String>,
    ) -> CompletionResult<Self> {
        // Connect deadline only. Reads are bounded by the relay's idle timeout.
        let client = Client::builder()
            .connect_timeout(config.request_timeout())
            .build()
            .map_err(|e| CompletionError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
            request_timeout: config.request_timeout(),
        })
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatClient {
    async fn stream_complete(&self, request: CompletionRequest) -> CompletionResult<CompletionStream> {
        let url = self.completions_url();
        let payload = ChatCompletionPayload::streaming(&self.model, &request);
        debug!(
            url = %url,
            model = %self.model,
            messages = payload.messages.len(),
            "Opening completion stream"
        );

        let send = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Accept", "text/event-stream")
            .json(&payload)
            .send();

        let response = tokio::time::timeout(self.request_timeout, send)
            .await
            .map_err(|_| CompletionError::Timeout(self.request_timeout))?
            .map_err(|e| CompletionError::ConnectionFailed {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY).collect();
            warn!(status = %status, "Completion provider rejected request");
            return Err(CompletionError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let stream: CompletionStream =
            Box::pin(response.bytes_stream().map_err(CompletionError::from));
        Ok(stream)
    }
}
