//! Completion request types and upstream configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::conversation::ConversationMessage;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama3-70b-8192";
pub const API_KEY_ENV: &str = "GROQ_API_KEY";

/// Upstream completion provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    pub base_url: String,
    pub model: String,
    /// API key. Falls back to `GROQ_API_KEY` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Deadline for the provider to start answering.
    pub request_timeout_secs: u64,
    /// Longest silence tolerated between stream reads.
    pub idle_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            request_timeout_secs: 30,
            idle_timeout_secs: 60,
        }
    }
}

impl UpstreamConfig {
    /// Configured key, else the provider's conventional environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| {
                std::env::var(API_KEY_ENV)
                    .ok()
                    .filter(|key| !key.trim().is_empty())
            })
    }

    /// At least one second; zero would fail every call.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// At least one second; zero would cut off every stream.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.max(1))
    }
}

/// A provider-neutral completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    /// Recent conversation history, oldest first.
    pub messages: Vec<ConversationMessage>,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, messages: Vec<ConversationMessage>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages,
        }
    }

    /// System prompt followed by the conversation history.
    pub fn wire_messages(&self) -> Vec<ConversationMessage> {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        messages.push(ConversationMessage::system(self.system_prompt.clone()));
        messages.extend(self.messages.iter().cloned());
        messages
    }
}

/// Body of a streamed `/chat/completions` call.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionPayload<'a> {
    pub model: &'a str,
    pub messages: Vec<ConversationMessage>,
    pub stream: bool,
}

impl<'a> ChatCompletionPayload<'a> {
    pub fn streaming(model: &'a str, request: &CompletionRequest) -> Self {
        Self {
            model,
            messages: request.wire_messages(),
            stream: true,
        }
    }
}
