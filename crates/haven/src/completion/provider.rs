//! Completion provider trait.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use super::{CompletionRequest, CompletionResult};

/// Raw event-stream bytes as they arrive from the provider.
pub type CompletionStream = Pin<Box<dyn Stream<Item = CompletionResult<Bytes>> + Send>>;

/// A backend that streams chat completions.
///
/// Returning `Ok` means the provider accepted the request and the body is
/// ready to be read; everything that can fail before that point is an `Err`.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn stream_complete(&self, request: CompletionRequest) -> CompletionResult<CompletionStream>;
}
