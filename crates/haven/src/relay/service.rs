//! Chat relay service.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use super::pump::{StreamEnd, pump};
use crate::completion::{CompletionError, CompletionProvider, CompletionRequest, UpstreamConfig};
use crate::conversation::{
    ConversationConfig, ConversationMessage, PromptPolicy, Role, context_window,
    user_message_count,
};
use crate::limiter::{DEFAULT_THROTTLE_MESSAGE, RateLimitConfig, RateLimiter, now_millis};
use crate::store::MessageStore;

/// Deltas buffered between the upstream reader and the response body.
const DELTA_CHANNEL_CAPACITY: usize = 64;

/// Body of `POST /chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(alias = "sessionId")]
    pub conversation_id: String,
    pub messages: Vec<ConversationMessage>,
    /// Rate-limit key. Older clients send `userId` or nothing at all.
    #[serde(default, alias = "userId")]
    pub identity: Option<String>,
}

impl ChatRequest {
    pub fn new(
        conversation_id: impl Into<String>,
        messages: Vec<ConversationMessage>,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages,
            identity: Some(identity.into()),
        }
    }

    /// Identity used for admission; falls back to the conversation id.
    pub fn admission_key(&self) -> &str {
        self.identity
            .as_deref()
            .map(str::trim)
            .filter(|identity| !identity.is_empty())
            .unwrap_or(&self.conversation_id)
    }

    fn validate(&self) -> Result<(), RelayError> {
        if self.conversation_id.trim().is_empty() {
            return Err(RelayError::InvalidRequest(
                "conversationId must not be empty".to_string(),
            ));
        }
        if self.messages.is_empty() {
            return Err(RelayError::InvalidRequest(
                "messages must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Response sent instead of a stream when a caller is throttled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleNotice {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

impl ThrottleNotice {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: "throttle".to_string(),
            message: message.into(),
        }
    }
}

/// Errors that end a relay before streaming starts.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid chat request: {0}")]
    InvalidRequest(String),

    #[error("Completion provider unavailable: {0}")]
    Upstream(#[from] CompletionError),
}

/// A live reply.
#[derive(Debug)]
pub struct RelayStream {
    /// Text deltas in upstream order. Ends when the upstream stream ends.
    pub deltas: ReceiverStream<Bytes>,
    /// Resolves after the stream ended and the reply (if any) was stored.
    pub completion: JoinHandle<StreamEnd>,
}

impl RelayStream {
    /// Response body stream. The background task keeps running detached.
    pub fn into_body_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
        self.deltas.map(Ok)
    }
}

/// Result of a chat turn.
#[derive(Debug)]
pub enum RelayOutcome {
    Throttled(ThrottleNotice),
    Streaming(RelayStream),
}

/// Tunables for the relay.
#[derive(Debug, Clone)]
pub struct RelayPolicy {
    pub prompts: PromptPolicy,
    /// Trailing messages sent upstream.
    pub context_messages: usize,
    pub throttle_message: String,
    /// Longest silence tolerated between upstream reads.
    pub idle_timeout: Duration,
}

impl RelayPolicy {
    pub fn from_config(
        conversation: &ConversationConfig,
        rate_limit: &RateLimitConfig,
        upstream: &UpstreamConfig,
    ) -> Result<Self> {
        Ok(Self {
            prompts: PromptPolicy::from_config(conversation)?,
            context_messages: conversation.context_messages,
            throttle_message: rate_limit.throttle_message.clone(),
            idle_timeout: upstream.idle_timeout(),
        })
    }
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self {
            prompts: PromptPolicy::default(),
            context_messages: ConversationConfig::default().context_messages,
            throttle_message: DEFAULT_THROTTLE_MESSAGE.to_string(),
            idle_timeout: UpstreamConfig::default().idle_timeout(),
        }
    }
}

/// Relays chat turns to the completion provider.
pub struct ChatRelay {
    limiter: Arc<RateLimiter>,
    provider: Arc<dyn CompletionProvider>,
    store: Arc<dyn MessageStore>,
    policy: RelayPolicy,
}

impl ChatRelay {
    pub fn new(
        limiter: Arc<RateLimiter>,
        provider: Arc<dyn CompletionProvider>,
        store: Arc<dyn MessageStore>,
        policy: RelayPolicy,
    ) -> Self {
        Self {
            limiter,
            provider,
            store,
            policy,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Relay a chat turn using the wall clock for admission.
    pub async fn relay(&self, request: ChatRequest) -> Result<RelayOutcome, RelayError> {
        self.relay_at(request, now_millis()).await
    }

    /// Relay a chat turn admitted at `now_ms`.
    pub async fn relay_at(
        &self,
        request: ChatRequest,
        now_ms: u64,
    ) -> Result<RelayOutcome, RelayError> {
        request.validate()?;

        let identity = request.admission_key();
        if !self.limiter.check_admission(identity, now_ms).is_admitted() {
            info!(
                identity = %identity,
                conversation_id = %request.conversation_id,
                "Chat turn throttled"
            );
            return Ok(RelayOutcome::Throttled(ThrottleNotice::new(
                self.policy.throttle_message.clone(),
            )));
        }

        // Written in the background; the reply task waits for it so the
        // transcript stays ordered.
        let user_write = request
            .messages
            .last()
            .filter(|m| m.role == Role::User)
            .map(|last| {
                let store = Arc::clone(&self.store);
                let conversation_id = request.conversation_id.clone();
                let content = last.content.clone();
                tokio::spawn(async move {
                    persist(store.as_ref(), &conversation_id, Role::User, &content).await;
                })
            });

        let user_messages = user_message_count(&request.messages);
        let system_prompt = self.policy.prompts.select(user_messages);
        let history = context_window(&request.messages, self.policy.context_messages).to_vec();
        debug!(
            conversation_id = %request.conversation_id,
            user_messages,
            context = history.len(),
            "Opening upstream stream"
        );

        let upstream = self
            .provider
            .stream_complete(CompletionRequest::new(system_prompt, history))
            .await?;

        let (tx, rx) = mpsc::channel(DELTA_CHANNEL_CAPACITY);
        let store = Arc::clone(&self.store);
        let conversation_id = request.conversation_id;
        let idle_timeout = self.policy.idle_timeout;

        let completion = tokio::spawn(async move {
            let end = pump(upstream, tx, idle_timeout).await;
            if let Some(user_write) = user_write {
                if let Err(err) = user_write.await {
                    warn!(conversation_id = %conversation_id, error = %err, "User message write task failed");
                }
            }
            match &end {
                StreamEnd::Completed { content } if !content.is_empty() => {
                    persist(store.as_ref(), &conversation_id, Role::Assistant, content).await;
                }
                StreamEnd::Completed { .. } => {
                    debug!(conversation_id = %conversation_id, "Completion was empty");
                }
                StreamEnd::Truncated { delivered } => {
                    warn!(
                        conversation_id = %conversation_id,
                        delivered = delivered.len(),
                        "Discarding truncated reply"
                    );
                }
                StreamEnd::Cancelled => {
                    info!(conversation_id = %conversation_id, "Chat stream cancelled by caller");
                }
            }
            end
        });

        Ok(RelayOutcome::Streaming(RelayStream {
            deltas: ReceiverStream::new(rx),
            completion,
        }))
    }
}

/// Store a message; failures are logged and never reach the caller.
async fn persist(store: &dyn MessageStore, conversation_id: &str, role: Role, content: &str) {
    if let Err(err) = store.insert_message(conversation_id, role, content).await {
        warn!(
            conversation_id = %conversation_id,
            role = %role,
            backend = store.backend_name(),
            error = %err,
            "Failed to persist chat message"
        );
    }
}
