//! Scraping client for the call-center portal.
//!
//! The portal has no API: we replay a browser login (CSRF token + form post),
//! keep the session cookies per chat, and download the daily XLSX export.

pub mod client;
pub mod cookies;
pub mod export;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use callbridge_core::error::{BridgeError, Result};
use callbridge_core::types::{ChatId, RawRows};
use serde::{Deserialize, Serialize};

use crate::store::{kinds, load, save, KvStore};
use client::PortalClient;
use cookies::CookieJar;

#[derive(Clone, Serialize, Deserialize)]
pub struct PortalCredential {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for PortalCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalCredential")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// What the conversation layer needs from the portal.
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Make sure the chat holds a live portal session, logging in if needed.
    async fn ensure_logged_in(&self, chat_id: ChatId, email: &str, password: &str) -> Result<()>;

    /// Download one day's report (`YYYY-MM-DD`) using the chat's stored credential.
    async fn download_report(&self, chat_id: ChatId, date: &str) -> Result<RawRows>;
}

/// Portal access backed by per-chat cookies in the key-value store.
pub struct PortalSession {
    base_url: String,
    timeout: Duration,
    store: Arc<dyn KvStore>,
}

impl PortalSession {
    pub fn new(base_url: &str, timeout: Duration, store: Arc<dyn KvStore>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            store,
        }
    }

    /// Client rehydrated with whatever cookies the chat had last time.
    async fn client_for(&self, chat_id: ChatId) -> Result<PortalClient> {
        let snapshot: BTreeMap<String, String> =
            load(self.store.as_ref(), kinds::PORTAL_COOKIES, chat_id)
                .await?
                .unwrap_or_default();
        let jar = Arc::new(CookieJar::from_snapshot(snapshot));
        PortalClient::new(&self.base_url, jar, self.timeout)
    }

    /// Return a client whose cookies open the dashboard.
    async fn logged_in_client(
        &self,
        chat_id: ChatId,
        email: &str,
        password: &str,
    ) -> Result<PortalClient> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(BridgeError::Auth("email and password are required".to_string()));
        }

        let client = self.client_for(chat_id).await?;
        if client.probe().await? {
            tracing::debug!(chat_id, "[portal] session still valid");
            return Ok(client);
        }

        tracing::info!(chat_id, "[portal] logging in");
        let csrf = client.fetch_csrf_token().await?;
        client.submit_login(&csrf, email.trim(), password).await?;

        // The only place cookies are written back.
        save(
            self.store.as_ref(),
            kinds::PORTAL_COOKIES,
            chat_id,
            &client.jar().snapshot(),
        )
        .await?;
        tracing::info!(chat_id, "[portal] login ok");

        Ok(client)
    }
}

#[async_trait]
impl ReportSource for PortalSession {
    async fn ensure_logged_in(&self, chat_id: ChatId, email: &str, password: &str) -> Result<()> {
        self.logged_in_client(chat_id, email, password).await.map(|_| ())
    }

    async fn download_report(&self, chat_id: ChatId, date: &str) -> Result<RawRows> {
        let credential: PortalCredential =
            load(self.store.as_ref(), kinds::PORTAL_CREDENTIAL, chat_id)
                .await?
                .ok_or_else(|| BridgeError::Auth("no stored portal credentials".to_string()))?;

        let client = self
            .logged_in_client(chat_id, &credential.email, &credential.password)
            .await?;

        let bytes = client.export_voice(date).await?;
        tracing::info!(chat_id, date, bytes = bytes.len(), "[portal] report downloaded");
        export::parse_workbook(bytes)
    }
}
