use async_trait::async_trait;
use callbridge_core::error::{BridgeError, Result};
use callbridge_core::types::{now_unix, ChatId};
use callbridge_integrations::store::KvStore;
use libsql::{Builder, Connection, Database};

/// `KvStore` over a single libsql table, local file or Turso.
pub struct LibsqlStore {
    db: Database,
}

fn map_err(e: libsql::Error) -> BridgeError {
    BridgeError::Database(e.to_string())
}

const MAX_DB_RETRIES: u32 = 3;

fn is_transient_db_error(err: &BridgeError) -> bool {
    match err {
        BridgeError::Database(msg) => {
            msg.contains("Bad Gateway")
                || msg.contains("Service Unavailable")
                || msg.contains("Gateway Timeout")
                || msg.contains("timed out")
                || msg.contains("connection")
                || msg.contains("STREAM_EXPIRED")
        }
        _ => false,
    }
}

/// Retry an async database operation with exponential backoff on transient errors.
async fn with_retry<F, Fut, T>(f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(val) => return Ok(val),
            Err(e) if is_transient_db_error(&e) && attempt < MAX_DB_RETRIES => {
                attempt += 1;
                let delay = std::time::Duration::from_secs(1 << (attempt - 1));
                tracing::warn!("[db] transient error, retry {attempt}/{MAX_DB_RETRIES} in {}s: {e}", delay.as_secs());
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

impl LibsqlStore {
    /// Open a local libsql database at the given file path.
    pub async fn new(path: &str) -> Result<Self> {
        let db = Builder::new_local(path).build().await.map_err(map_err)?;
        let store = Self { db };
        store.init_tables().await?;
        Ok(store)
    }

    /// Open a remote Turso database.
    pub async fn new_remote(url: &str, token: &str) -> Result<Self> {
        let db = Builder::new_remote(url.to_string(), token.to_string())
            .build()
            .await
            .map_err(map_err)?;
        let store = Self { db };
        store.init_tables().await?;
        Ok(store)
    }

    /// Fresh connection per operation. For remote databases this opens
    /// a new Hrana stream, avoiding STREAM_EXPIRED errors.
    fn conn(&self) -> Result<Connection> {
        self.db.connect().map_err(map_err)
    }

    async fn init_tables(&self) -> Result<()> {
        self.conn()?
            .execute(
                "CREATE TABLE IF NOT EXISTS kv (
                    kind TEXT NOT NULL,
                    chat_id INTEGER NOT NULL,
                    value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (kind, chat_id)
                )",
                (),
            )
            .await
            .map_err(map_err)?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for LibsqlStore {
    async fn get(&self, kind: &str, chat_id: ChatId) -> Result<Option<serde_json::Value>> {
        let raw = with_retry(|| async {
            let mut rows = self
                .conn()?
                .query(
                    "SELECT value FROM kv WHERE kind = ? AND chat_id = ?",
                    libsql::params![kind.to_string(), chat_id],
                )
                .await
                .map_err(map_err)?;

            match rows.next().await.map_err(map_err)? {
                Some(row) => Ok(Some(row.get::<String>(0).map_err(map_err)?)),
                None => Ok(None),
            }
        })
        .await?;

        raw.map(|text| {
            serde_json::from_str(&text)
                .map_err(|e| BridgeError::Database(format!("corrupt {kind} value: {e}")))
        })
        .transpose()
    }

    async fn set(&self, kind: &str, chat_id: ChatId, value: serde_json::Value) -> Result<()> {
        let text = value.to_string();
        with_retry(|| async {
            self.conn()?
                .execute(
                    "INSERT OR REPLACE INTO kv (kind, chat_id, value, updated_at) VALUES (?, ?, ?, ?)",
                    libsql::params![kind.to_string(), chat_id, text.clone(), now_unix()],
                )
                .await
                .map_err(map_err)?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, kind: &str, chat_id: ChatId) -> Result<()> {
        with_retry(|| async {
            self.conn()?
                .execute(
                    "DELETE FROM kv WHERE kind = ? AND chat_id = ?",
                    libsql::params![kind.to_string(), chat_id],
                )
                .await
                .map_err(map_err)?;
            Ok(())
        })
        .await
    }
}
