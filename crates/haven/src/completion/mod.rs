//! Upstream chat-completion client.
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint with streaming
//! enabled and hands the raw event-stream bytes to the relay.

mod client;
mod error;
mod provider;
mod types;

pub use client::OpenAiCompatClient;
pub use error::{CompletionError, CompletionResult};
pub use provider::{CompletionProvider, CompletionStream};
pub use types::{ChatCompletionPayload, CompletionRequest, UpstreamConfig};
