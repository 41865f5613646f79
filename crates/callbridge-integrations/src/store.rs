use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use callbridge_core::error::{BridgeError, Result};
use callbridge_core::types::ChatId;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Entity kinds persisted per chat identity.
pub mod kinds {
    pub const SESSION: &str = "session";
    pub const PORTAL_CREDENTIAL: &str = "portal_credential";
    pub const PORTAL_COOKIES: &str = "portal_cookies";
    pub const GOOGLE_TOKEN: &str = "google_token";
    pub const SHEET_ID: &str = "sheet_id";
    pub const TELEGRAM_OFFSET: &str = "telegram_offset";
}

/// Durable JSON records keyed by (entity kind, chat identity).
/// `get` returns `Ok(None)` when nothing is stored.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, kind: &str, chat_id: ChatId) -> Result<Option<serde_json::Value>>;
    async fn set(&self, kind: &str, chat_id: ChatId, value: serde_json::Value) -> Result<()>;
    async fn delete(&self, kind: &str, chat_id: ChatId) -> Result<()>;
}

/// Load and decode a typed record.
pub async fn load<T: DeserializeOwned>(
    store: &dyn KvStore,
    kind: &str,
    chat_id: ChatId,
) -> Result<Option<T>> {
    match store.get(kind, chat_id).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| BridgeError::Database(format!("corrupt {kind} record: {e}"))),
        None => Ok(None),
    }
}

/// Encode and store a typed record.
pub async fn save<T: Serialize>(
    store: &dyn KvStore,
    kind: &str,
    chat_id: ChatId,
    value: &T,
) -> Result<()> {
    let value = serde_json::to_value(value)
        .map_err(|e| BridgeError::Database(format!("failed to encode {kind}: {e}")))?;
    store.set(kind, chat_id, value).await
}

/// Process-local store. Loses everything on restart.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<(String, ChatId), serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<(String, ChatId), serde_json::Value>> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, kind: &str, chat_id: ChatId) -> Result<Option<serde_json::Value>> {
        Ok(self.records().get(&(kind.to_string(), chat_id)).cloned())
    }

    async fn set(&self, kind: &str, chat_id: ChatId, value: serde_json::Value) -> Result<()> {
        self.records().insert((kind.to_string(), chat_id), value);
        Ok(())
    }

    async fn delete(&self, kind: &str, chat_id: ChatId) -> Result<()> {
        self.records().remove(&(kind.to_string(), chat_id));
        Ok(())
    }
}
