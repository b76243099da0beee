//! Application state shared across handlers.

use std::sync::Arc;

use crate::relay::ChatRelay;
use crate::store::MessageStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Chat relay (admission, upstream streaming, transcript persistence).
    pub relay: Arc<ChatRelay>,
    /// Store for session analytics.
    pub store: Arc<dyn MessageStore>,
    /// Origins allowed to call the API from a browser.
    pub allowed_origins: Vec<String>,
}

impl AppState {
    /// Create new application state.
    pub fn new(relay: ChatRelay, store: Arc<dyn MessageStore>) -> Self {
        Self {
            relay: Arc::new(relay),
            store,
            allowed_origins: Vec::new(),
        }
    }

    /// Set the CORS allow-list.
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }
}
