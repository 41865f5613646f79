use std::sync::{Arc, OnceLock};
use std::time::Duration;

use callbridge_core::error::{BridgeError, Result};
use regex::Regex;
use reqwest::redirect::Policy;
use reqwest::StatusCode;

use super::cookies::CookieJar;

/// Body text the portal renders on a rejected login.
pub const INVALID_LOGIN_MARKER: &str = "Invalid username or password";

const BROWSER_UA: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Raw HTTP conversation with the portal for one chat's cookie jar.
///
/// Redirects are never followed: a 3xx from `/dashboard` means "not logged in"
/// and a 3xx from `POST /login` means "logged in".
pub struct PortalClient {
    http: reqwest::Client,
    base_url: String,
    jar: Arc<CookieJar>,
}

impl PortalClient {
    pub fn new(base_url: &str, jar: Arc<CookieJar>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .redirect(Policy::none())
            .user_agent(BROWSER_UA)
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Integration(format!("failed to build portal client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            jar,
        })
    }

    pub fn jar(&self) -> &CookieJar {
        &self.jar
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// True when the current cookies open the authenticated dashboard.
    pub async fn probe(&self) -> Result<bool> {
        let resp = self
            .http
            .get(self.url("/dashboard"))
            .send()
            .await
            .map_err(|e| BridgeError::Export(format!("portal unreachable: {e}")))?;
        Ok(resp.status().is_success())
    }

    /// Fetch the login page and scrape the anti-forgery token.
    pub async fn fetch_csrf_token(&self) -> Result<String> {
        let resp = self
            .http
            .get(self.url("/login"))
            .send()
            .await
            .map_err(|e| BridgeError::Export(format!("portal login page failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| BridgeError::Export(format!("portal login page read failed: {e}")))?;

        if !status.is_success() {
            return Err(BridgeError::Protocol(format!(
                "login page returned status {}",
                status.as_u16()
            )));
        }

        extract_csrf_token(&body)
            .ok_or_else(|| BridgeError::Protocol("csrf_webcall token not found on login page".to_string()))
    }

    /// Submit the login form.
    pub async fn submit_login(&self, csrf: &str, email: &str, password: &str) -> Result<()> {
        let form = [
            ("csrf_webcall", csrf),
            ("username", email),
            ("password", password),
        ];

        let resp = self
            .http
            .post(self.url("/login"))
            .form(&form)
            .send()
            .await
            .map_err(|e| BridgeError::Export(format!("portal login request failed: {e}")))?;

        let status = resp.status();
        if status.is_redirection() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::OK && body.contains(INVALID_LOGIN_MARKER) {
            return Err(BridgeError::Auth("portal rejected the email or password".to_string()));
        }

        Err(BridgeError::Protocol(format!(
            "unexpected login response status {}",
            status.as_u16()
        )))
    }

    /// Download the voice-call export for a single day (`YYYY-MM-DD`).
    pub async fn export_voice(&self, date: &str) -> Result<Vec<u8>> {
        let query = [
            ("from_date", date),
            ("to_date", date),
            ("phone", ""),
            ("status", "0"),
            ("autodial_id", ""),
            ("team_id", "0"),
        ];

        let resp = self
            .http
            .get(self.url("/api/export/voice"))
            .query(&query)
            .header(reqwest::header::ACCEPT, XLSX_MIME)
            .send()
            .await
            .map_err(|e| BridgeError::Export(format!("report download failed: {e}")))?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(BridgeError::Export(format!(
                "report download returned status {}",
                status.as_u16()
            )));
        }

        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| BridgeError::Export(format!("report body read failed: {e}")))
    }
}

fn csrf_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"name="csrf_webcall"\s+value="([^"]*)""#).expect("static regex")
    })
}

pub fn extract_csrf_token(html: &str) -> Option<String> {
    csrf_pattern()
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|token| !token.is_empty())
}
