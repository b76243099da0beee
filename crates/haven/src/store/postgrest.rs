//! PostgREST-backed message store.
//!
//! Inserts rows into the `chat_messages` and `session_analytics` tables of a
//! hosted backend-as-a-service through its REST interface.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::error::{StoreError, StoreResult};
use super::traits::{MessageStore, SessionAnalytics};
use crate::conversation::Role;

const MESSAGES_TABLE: &str = "chat_messages";
const ANALYTICS_TABLE: &str = "session_analytics";

#[derive(Debug, Serialize)]
struct MessageRow<'a> {
    session_id: &'a str,
    role: Role,
    content: &'a str,
}

/// Message store writing to PostgREST tables.
#[derive(Debug, Clone)]
pub struct PostgrestMessageStore {
    /// HTTP client.
    client: Client,
    /// Project URL (e.g., "https://abc.supabase.co").
    base_url: String,
    /// Key sent as both `apikey` and bearer token.
    api_key: String,
}

impl PostgrestMessageStore {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn insert<T: Serialize + ?Sized>(&self, table: &'static str, rows: &T) -> StoreResult<()> {
        let response = self
            .client
            .post(self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(table, "Inserted row");
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(StoreError::Rejected {
            table,
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl MessageStore for PostgrestMessageStore {
    async fn insert_message(&self, conversation_id: &str, role: Role, content: &str) -> StoreResult<()> {
        let rows = [MessageRow {
            session_id: conversation_id,
            role,
            content,
        }];
        self.insert(MESSAGES_TABLE, &rows).await
    }

    async fn record_session(&self, analytics: &SessionAnalytics) -> StoreResult<()> {
        self.insert(ANALYTICS_TABLE, std::slice::from_ref(analytics)).await
    }

    fn backend_name(&self) -> &'static str {
        "postgrest"
    }
}
