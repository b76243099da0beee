//! Store trait definitions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::StoreResult;
use crate::conversation::Role;

/// Usage summary for one finished chat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAnalytics {
    pub user_id: String,
    /// Session length as reported by the client.
    pub duration: i64,
    pub message_count: i64,
    /// Client timestamp for the session, stored verbatim.
    pub session_date: String,
}

/// Write-only persistence for chat transcripts and session analytics.
///
/// Implementations must be safe to call concurrently; every call is a single
/// insert.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append one message to a conversation.
    async fn insert_message(&self, conversation_id: &str, role: Role, content: &str) -> StoreResult<()>;

    /// Record a finished session.
    async fn record_session(&self, analytics: &SessionAnalytics) -> StoreResult<()>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}
