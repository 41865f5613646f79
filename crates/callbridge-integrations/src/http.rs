use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use callbridge_core::error::{BridgeError, Result};
use callbridge_core::types::ChatId;

use crate::google::oauth::decode_state;
use crate::google::GoogleAuth;

/// Told when a chat finished Google consent, so the conversation can move on.
#[async_trait]
pub trait ConsentListener: Send + Sync {
    async fn on_consent(&self, chat_id: ChatId);
}

#[derive(serde::Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

struct AppState {
    auth: Arc<GoogleAuth>,
    listener: Arc<dyn ConsentListener>,
}

async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<OAuthCallback>,
) -> Html<String> {
    if let Some(error) = params.error {
        tracing::warn!("[oauth] consent denied: {error}");
        return Html(format!("<h1>Authorization failed</h1><p>{}</p>", escape(&error)));
    }

    let chat_id = match params.state.as_deref().map(decode_state) {
        Some(Ok(id)) => id,
        _ => {
            return Html(
                "<h1>Error</h1><p>Invalid or missing state. Start again from the chat with /mode.</p>"
                    .to_string(),
            )
        }
    };

    let Some(code) = params.code else {
        return Html("<h1>Error</h1><p>No authorization code received.</p>".to_string());
    };

    match state.auth.exchange_code(chat_id, &code).await {
        Ok(()) => {
            state.listener.on_consent(chat_id).await;
            Html(
                "<h1>Connected!</h1><p>Google Sheets is linked. You can close this tab and go back to the chat.</p>"
                    .to_string(),
            )
        }
        Err(e) => {
            tracing::error!(chat_id, "[oauth] code exchange failed: {e}");
            Html("<h1>Error</h1><p>Failed to connect Google. Try again from the chat.</p>".to_string())
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub fn oauth_router(auth: Arc<GoogleAuth>, listener: Arc<dyn ConsentListener>) -> Router {
    let state = Arc::new(AppState { auth, listener });
    Router::new()
        .route("/oauth/callback", get(oauth_callback))
        .with_state(state)
}

/// Start the OAuth callback HTTP server. Runs until the listener fails.
pub async fn start_oauth_server(
    port: u16,
    auth: Arc<GoogleAuth>,
    listener: Arc<dyn ConsentListener>,
) -> Result<()> {
    let app = oauth_router(auth, listener);

    let tcp = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .map_err(|e| BridgeError::Integration(format!("failed to bind port {port}: {e}")))?;

    axum::serve(tcp, app)
        .await
        .map_err(|e| BridgeError::Integration(format!("oauth server error: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::oauth::encode_state;
    use crate::store::MemoryStore;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<ChatId>>,
    }

    #[async_trait]
    impl ConsentListener for Recorder {
        async fn on_consent(&self, chat_id: ChatId) {
            self.seen.lock().unwrap().push(chat_id);
        }
    }

    async fn serve(auth: Arc<GoogleAuth>, recorder: Arc<Recorder>) -> String {
        let tcp = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp.local_addr().unwrap();
        let app = oauth_router(auth, recorder);
        tokio::spawn(async move {
            axum::serve(tcp, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_callback_exchanges_and_notifies_chat() {
        let google = MockServer::start_async().await;
        google
            .mock_async(|when, then| {
                when.method(POST).path("/token").body_contains("code=abc");
                then.status(200).json_body(serde_json::json!({
                    "access_token": "a", "expires_in": 3600, "refresh_token": "r"
                }));
            })
            .await;

        let store = Arc::new(MemoryStore::new());
        let auth = Arc::new(
            GoogleAuth::new("c".into(), "s".into(), "cb".into(), store).with_token_url(&google.url("/token")),
        );
        let recorder = Arc::new(Recorder::default());
        let base = serve(Arc::clone(&auth), Arc::clone(&recorder)).await;

        let page = reqwest::get(format!(
            "{base}/oauth/callback?code=abc&state={}",
            encode_state(-55)
        ))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

        assert!(page.contains("Connected"));
        assert_eq!(*recorder.seen.lock().unwrap(), vec![-55]);
        assert!(auth.is_connected(-55).await);
    }

    #[tokio::test]
    async fn test_callback_with_bad_state_does_nothing() {
        let store = Arc::new(MemoryStore::new());
        let auth = Arc::new(GoogleAuth::new("c".into(), "s".into(), "cb".into(), store));
        let recorder = Arc::new(Recorder::default());
        let base = serve(auth, Arc::clone(&recorder)).await;

        let page = reqwest::get(format!("{base}/oauth/callback?code=abc&state=garbage"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert!(page.contains("Invalid or missing state"));
        assert!(recorder.seen.lock().unwrap().is_empty());
    }
}
