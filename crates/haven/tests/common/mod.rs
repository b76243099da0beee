//! Test utilities and common setup.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use futures::stream::{self, StreamExt};

use haven::api;
use haven::completion::{
    CompletionError, CompletionProvider, CompletionRequest, CompletionResult, CompletionStream,
};
use haven::conversation::Role;
use haven::limiter::{RateLimitConfig, RateLimiter};
use haven::relay::{ChatRelay, RelayPolicy};
use haven::store::{MessageStore, SessionAnalytics, StoreError, StoreResult};

/// One `data:` line carrying a text delta.
pub fn delta_frame(text: &str) -> Bytes {
    Bytes::from(format!(
        "data: {}\n\n",
        serde_json::json!({ "choices": [{ "index": 0, "delta": { "content": text } }] })
    ))
}

pub fn done_frame() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

/// What the scripted provider does when called.
#[derive(Debug, Clone)]
pub enum Script {
    /// Yield these chunks, then end.
    Chunks(Vec<Bytes>),
    /// Yield these chunks, then fail the read.
    ChunksThenError(Vec<Bytes>),
    /// Yield these chunks, then never produce another.
    ChunksThenPending(Vec<Bytes>),
    /// Refuse to open a stream.
    Unavailable,
}

/// Completion provider that replays a fixed script.
pub struct ScriptedProvider {
    script: Script,
    calls: AtomicUsize,
    last_request: Mutex<Option<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    /// Stream the given deltas followed by `[DONE]`.
    pub fn replying(deltas: &[&str]) -> Arc<Self> {
        let mut chunks: Vec<Bytes> = deltas.iter().map(|d| delta_frame(d)).collect();
        chunks.push(done_frame());
        Self::new(Script::Chunks(chunks))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn stream_complete(&self, request: CompletionRequest) -> CompletionResult<CompletionStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);

        let stream: CompletionStream = match &self.script {
            Script::Chunks(chunks) => Box::pin(stream::iter(chunks.clone().into_iter().map(Ok))),
            Script::ChunksThenError(chunks) => Box::pin(
                stream::iter(chunks.clone().into_iter().map(Ok)).chain(stream::once(async {
                    Err(CompletionError::Client("connection reset".to_string()))
                })),
            ),
            Script::ChunksThenPending(chunks) => Box::pin(
                stream::iter(chunks.clone().into_iter().map(Ok)).chain(stream::pending()),
            ),
            Script::Unavailable => {
                return Err(CompletionError::ConnectionFailed {
                    url: "http://127.0.0.1:9/chat/completions".to_string(),
                    message: "connection refused".to_string(),
                });
            }
        };
        Ok(stream)
    }
}

/// In-memory store that records every write.
#[derive(Default)]
pub struct RecordingStore {
    messages: Mutex<Vec<(String, Role, String)>>,
    sessions: Mutex<Vec<SessionAnalytics>>,
    fail: AtomicBool,
    write_delay: Duration,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store whose message writes each take `delay`.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            write_delay: delay,
            ..Self::default()
        })
    }

    /// Make every write fail from now on.
    pub fn fail_writes(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<(String, Role, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn sessions(&self) -> Vec<SessionAnalytics> {
        self.sessions.lock().unwrap().clone()
    }

    /// Poll until at least `count` messages are recorded or five seconds pass.
    pub async fn wait_for_messages(&self, count: usize) -> Vec<(String, Role, String)> {
        for _ in 0..500 {
            let messages = self.messages();
            if messages.len() >= count {
                return messages;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.messages()
    }
}

#[async_trait]
impl MessageStore for RecordingStore {
    async fn insert_message(&self, conversation_id: &str, role: Role, content: &str) -> StoreResult<()> {
        if !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Config("store offline".to_string()));
        }
        self.messages
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), role, content.to_string()));
        Ok(())
    }

    async fn record_session(&self, analytics: &SessionAnalytics) -> StoreResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Config("store offline".to_string()));
        }
        self.sessions.lock().unwrap().push(analytics.clone());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}

/// Relay wired to the given fakes with default limits.
pub fn test_relay(provider: Arc<ScriptedProvider>, store: Arc<RecordingStore>) -> ChatRelay {
    let limiter = Arc::new(RateLimiter::new(&RateLimitConfig::default()));
    ChatRelay::new(limiter, provider, store, RelayPolicy::default())
}

/// Create a test application backed by the given fakes.
pub fn test_app_with(provider: Arc<ScriptedProvider>, store: Arc<RecordingStore>) -> Router {
    let relay = test_relay(provider, store.clone());
    let state = api::AppState::new(relay, store);
    api::create_router(state)
}

/// Create a test application whose provider answers "Hello world".
pub fn test_app() -> (Router, Arc<ScriptedProvider>, Arc<RecordingStore>) {
    let provider = ScriptedProvider::replying(&["Hel", "lo", " wor", "ld"]);
    let store = RecordingStore::new();
    let app = test_app_with(provider.clone(), store.clone());
    (app, provider, store)
}
