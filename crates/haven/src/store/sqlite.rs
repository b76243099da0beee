//! SQLite-backed message store.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::error::StoreResult;
use super::traits::{MessageStore, SessionAnalytics};
use crate::conversation::Role;
use crate::db::Database;

/// A stored chat message.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PersistedMessage {
    pub id: i64,
    #[sqlx(rename = "session_id")]
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

/// Message store over a local SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteMessageStore {
    db: Database,
}

impl SqliteMessageStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Messages of a conversation in insertion order.
    pub async fn list_messages(&self, conversation_id: &str) -> StoreResult<Vec<PersistedMessage>> {
        let rows = sqlx::query_as::<_, PersistedMessage>(
            r#"
            SELECT id, session_id, role, content, created_at
            FROM chat_messages
            WHERE session_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows)
    }

    /// Count recorded sessions for a user.
    pub async fn count_sessions(&self, user_id: &str) -> StoreResult<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM session_analytics WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(self.db.pool())
                .await?;
        Ok(count)
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn insert_message(&self, conversation_id: &str, role: Role, content: &str) -> StoreResult<()> {
        let created_at = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO chat_messages (session_id, role, content, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(conversation_id)
        .bind(role.as_str())
        .bind(content)
        .bind(&created_at)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    async fn record_session(&self, analytics: &SessionAnalytics) -> StoreResult<()> {
        let created_at = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO session_analytics (user_id, duration, message_count, session_date, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&analytics.user_id)
        .bind(analytics.duration)
        .bind(analytics.message_count)
        .bind(&analytics.session_date)
        .bind(&created_at)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
