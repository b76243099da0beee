//! Message persistence backends.
//!
//! The relay writes through the [`MessageStore`] trait and never reads back.
//! Two backends are provided:
//! - SQLite (default, local file)
//! - PostgREST (hosted backend-as-a-service tables)

mod error;
mod postgrest;
mod sqlite;
mod traits;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use error::{StoreError, StoreResult};
pub use postgrest::PostgrestMessageStore;
pub use sqlite::{PersistedMessage, SqliteMessageStore};
pub use traits::{MessageStore, SessionAnalytics};

use crate::db::Database;

pub const POSTGREST_URL_ENV: &str = "SUPABASE_URL";
pub const POSTGREST_KEY_ENV: &str = "SUPABASE_ANON_KEY";

/// Which backend to persist to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Postgrest,
}

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// SQLite database file. Defaults to `<data_dir>/haven.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<String>,
    /// PostgREST base URL. Falls back to `SUPABASE_URL`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgrest_url: Option<String>,
    /// PostgREST API key. Falls back to `SUPABASE_ANON_KEY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgrest_api_key: Option<String>,
    /// Per-request timeout for PostgREST writes.
    pub request_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            sqlite_path: None,
            postgrest_url: None,
            postgrest_api_key: None,
            request_timeout_secs: 10,
        }
    }
}

impl StoreConfig {
    fn postgrest_credentials(&self) -> StoreResult<(String, String)> {
        let url = setting_or_env(&self.postgrest_url, POSTGREST_URL_ENV).ok_or_else(|| {
            StoreError::Config(format!(
                "store.postgrest_url or {} must be set",
                POSTGREST_URL_ENV
            ))
        })?;
        let key = setting_or_env(&self.postgrest_api_key, POSTGREST_KEY_ENV).ok_or_else(|| {
            StoreError::Config(format!(
                "store.postgrest_api_key or {} must be set",
                POSTGREST_KEY_ENV
            ))
        })?;
        Ok((url.trim().to_string(), key))
    }
}

fn setting_or_env(value: &Option<String>, env_key: &str) -> Option<String> {
    value
        .clone()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| std::env::var(env_key).ok().filter(|v| !v.trim().is_empty()))
}

/// Open the configured store. `sqlite_path` is resolved by the caller.
pub async fn open_store(config: &StoreConfig, sqlite_path: &Path) -> Result<Arc<dyn MessageStore>> {
    match config.backend {
        StoreBackend::Sqlite => {
            let db = Database::new(sqlite_path)
                .await
                .with_context(|| format!("opening database {}", sqlite_path.display()))?;
            Ok(Arc::new(SqliteMessageStore::new(db)))
        }
        StoreBackend::Postgrest => {
            let (url, key) = config.postgrest_credentials()?;
            let store = PostgrestMessageStore::new(
                url,
                key,
                Duration::from_secs(config.request_timeout_secs),
            )?;
            Ok(Arc::new(store))
        }
    }
}
