use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use callbridge_core::error::{BridgeError, Result};
use callbridge_core::types::{now_unix, ChatId};
use serde::{Deserialize, Serialize};

use crate::store::{kinds, load, save, KvStore};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Scope requested for writing report rows.
const SCOPES: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Per-chat Google credential. The refresh token is the durable part.
#[derive(Clone, Serialize, Deserialize)]
pub struct GoogleToken {
    pub refresh_token: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// Opaque payload carried through the consent redirect.
#[derive(Debug, Serialize, Deserialize)]
struct ConsentState {
    chat_id: ChatId,
}

/// Manages per-chat Google OAuth tokens (access + refresh) via a KvStore.
pub struct GoogleAuth {
    client_id: String,
    client_secret: String,
    callback_url: String,
    token_url: String,
    store: Arc<dyn KvStore>,
    http: reqwest::Client,
}

impl GoogleAuth {
    pub fn new(
        client_id: String,
        client_secret: String,
        callback_url: String,
        store: Arc<dyn KvStore>,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            callback_url,
            token_url: TOKEN_URL.to_string(),
            store,
            http: reqwest::Client::new(),
        }
    }

    /// Exchange tokens against a different endpoint (tests).
    pub fn with_token_url(mut self, token_url: &str) -> Self {
        self.token_url = token_url.to_string();
        self
    }

    /// Consent URL for one chat. The chat id travels in `state`.
    pub fn auth_url(&self, chat_id: ChatId) -> String {
        let state = encode_state(chat_id);
        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.callback_url.as_str()),
            ("response_type", "code"),
            ("scope", SCOPES),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", state.as_str()),
        ];
        match url::Url::parse_with_params(AUTH_URL, &params) {
            Ok(url) => url.to_string(),
            Err(_) => AUTH_URL.to_string(),
        }
    }

    /// Exchange an authorization code for tokens and store them for the chat.
    pub async fn exchange_code(&self, chat_id: ChatId, code: &str) -> Result<()> {
        let params = [
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.callback_url.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let json = self.token_request(&params).await?;

        let access_token = json["access_token"]
            .as_str()
            .ok_or_else(|| BridgeError::Integration("missing access_token".to_string()))?;
        let expires_in = json["expires_in"].as_i64().unwrap_or(3600);

        // Google omits refresh_token on repeat consent; keep the one we have.
        let refresh_token = match json["refresh_token"].as_str() {
            Some(r) => r.to_string(),
            None => self
                .token(chat_id)
                .await?
                .map(|t| t.refresh_token)
                .ok_or_else(|| {
                    BridgeError::SheetAuth("Google did not return a refresh token".to_string())
                })?,
        };

        let token = GoogleToken {
            refresh_token,
            access_token: Some(access_token.to_string()),
            expires_at: Some(now_unix() + expires_in),
        };
        save(self.store.as_ref(), kinds::GOOGLE_TOKEN, chat_id, &token).await?;
        tracing::info!(chat_id, "[oauth] google token stored");
        Ok(())
    }

    /// Get a valid access token for the chat, refreshing if necessary.
    pub async fn access_token(&self, chat_id: ChatId) -> Result<String> {
        let token = self.token(chat_id).await?.ok_or_else(|| {
            BridgeError::SheetAuth("no Google authorization for this chat".to_string())
        })?;

        if let (Some(access), Some(expiry)) = (&token.access_token, token.expires_at) {
            // Refresh 60 seconds before actual expiry
            if now_unix() < expiry - 60 {
                return Ok(access.clone());
            }
        }

        self.refresh(chat_id, token).await
    }

    async fn refresh(&self, chat_id: ChatId, mut token: GoogleToken) -> Result<String> {
        let params = [
            ("refresh_token", token.refresh_token.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let json = match self.token_request(&params).await {
            Ok(json) => json,
            Err(BridgeError::Http { status: 400 | 401, body }) => {
                // invalid_grant: revoked or expired refresh token
                tracing::warn!(chat_id, "[oauth] refresh rejected, dropping token");
                self.revoke_local(chat_id).await?;
                return Err(BridgeError::SheetAuth(format!("Google authorization expired: {body}")));
            }
            Err(e) => return Err(e),
        };

        let access_token = json["access_token"]
            .as_str()
            .ok_or_else(|| BridgeError::Integration("missing access_token in refresh".to_string()))?
            .to_string();
        let expires_in = json["expires_in"].as_i64().unwrap_or(3600);

        token.access_token = Some(access_token.clone());
        token.expires_at = Some(now_unix() + expires_in);
        save(self.store.as_ref(), kinds::GOOGLE_TOKEN, chat_id, &token).await?;

        Ok(access_token)
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<serde_json::Value> {
        let resp = self
            .http
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| BridgeError::Integration(format!("google token request failed: {e}")))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| BridgeError::Integration(format!("google token read failed: {e}")))?;

        if status != 200 {
            return Err(BridgeError::Http { status, body: text });
        }

        serde_json::from_str(&text)
            .map_err(|e| BridgeError::Integration(format!("google token parse failed: {e}")))
    }

    async fn token(&self, chat_id: ChatId) -> Result<Option<GoogleToken>> {
        load(self.store.as_ref(), kinds::GOOGLE_TOKEN, chat_id).await
    }

    /// Check if the chat has a Google refresh token.
    pub async fn is_connected(&self, chat_id: ChatId) -> bool {
        matches!(self.token(chat_id).await, Ok(Some(_)))
    }

    /// Forget the chat's Google credential.
    pub async fn revoke_local(&self, chat_id: ChatId) -> Result<()> {
        self.store.delete(kinds::GOOGLE_TOKEN, chat_id).await
    }
}

pub fn encode_state(chat_id: ChatId) -> String {
    let json = serde_json::json!({ "chat_id": chat_id }).to_string();
    URL_SAFE_NO_PAD.encode(json)
}

/// Recover the chat id from a consent redirect's `state`.
pub fn decode_state(state: &str) -> Result<ChatId> {
    let bytes = URL_SAFE_NO_PAD
        .decode(state.trim())
        .map_err(|e| BridgeError::Integration(format!("invalid oauth state: {e}")))?;
    let parsed: ConsentState = serde_json::from_slice(&bytes)
        .map_err(|e| BridgeError::Integration(format!("invalid oauth state: {e}")))?;
    Ok(parsed.chat_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use httpmock::Method::POST;
    use httpmock::MockServer;

    fn auth(store: Arc<MemoryStore>, token_url: &str) -> GoogleAuth {
        GoogleAuth::new(
            "cid".into(),
            "secret".into(),
            "http://localhost:8080/oauth/callback".into(),
            store,
        )
        .with_token_url(token_url)
    }

    #[test]
    fn test_state_round_trip() {
        assert_eq!(decode_state(&encode_state(-100123)).unwrap(), -100123);
    }

    #[test]
    fn test_garbage_state_rejected() {
        assert!(decode_state("not base64 !!").is_err());
        assert!(decode_state(&URL_SAFE_NO_PAD.encode("{\"user\":1}")).is_err());
    }

    #[test]
    fn test_auth_url_carries_state_and_scope() {
        let auth = auth(Arc::new(MemoryStore::new()), TOKEN_URL);
        let url = url::Url::parse(&auth.auth_url(42)).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["scope"], SCOPES);
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(decode_state(&pairs["state"]).unwrap(), 42);
    }

    #[tokio::test]
    async fn test_exchange_then_cached_access_token() {
        let server = MockServer::start_async().await;
        let token_mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/token").body_contains("grant_type=authorization_code");
                then.status(200).json_body(serde_json::json!({
                    "access_token": "ya29.a",
                    "expires_in": 3600,
                    "refresh_token": "1//r"
                }));
            })
            .await;

        let store = Arc::new(MemoryStore::new());
        let auth = auth(Arc::clone(&store), &server.url("/token"));
        auth.exchange_code(7, "code").await.unwrap();

        assert!(auth.is_connected(7).await);
        assert!(!auth.is_connected(8).await);
        assert_eq!(auth.access_token(7).await.unwrap(), "ya29.a");
        token_mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_revoked_refresh_is_sheet_auth_and_clears_token() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token").body_contains("grant_type=refresh_token");
                then.status(400).body(r#"{"error":"invalid_grant"}"#);
            })
            .await;

        let store = Arc::new(MemoryStore::new());
        let expired = GoogleToken {
            refresh_token: "1//r".into(),
            access_token: Some("old".into()),
            expires_at: Some(0),
        };
        save(store.as_ref(), kinds::GOOGLE_TOKEN, 7, &expired).await.unwrap();

        let auth = auth(Arc::clone(&store), &server.url("/token"));
        let err = auth.access_token(7).await.unwrap_err();
        assert!(matches!(err, BridgeError::SheetAuth(_)));
        assert!(!auth.is_connected(7).await);
    }

    #[tokio::test]
    async fn test_missing_token_is_sheet_auth() {
        let auth = auth(Arc::new(MemoryStore::new()), TOKEN_URL);
        assert!(matches!(
            auth.access_token(1).await,
            Err(BridgeError::SheetAuth(_))
        ));
    }
}
