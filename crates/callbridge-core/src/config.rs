use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bot: BotConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: String,
    /// Chats allowed to talk to the bot. Empty means everyone.
    #[serde(default)]
    pub allowed_chat_ids: Vec<i64>,
}

impl TelegramConfig {
    pub fn is_allowed(&self, chat_id: i64) -> bool {
        self.allowed_chat_ids.is_empty() || self.allowed_chat_ids.contains(&chat_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default = "default_portal_url")]
    pub base_url: String,
    /// Failed password attempts before the session is dropped.
    #[serde(default = "default_max_login_attempts")]
    pub max_login_attempts: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_portal_url() -> String {
    "https://portal.example.com".to_string()
}

fn default_max_login_attempts() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: default_portal_url(),
            max_login_attempts: default_max_login_attempts(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default)]
    pub turso_url: String,
    #[serde(default)]
    pub turso_token: String,
}

fn default_db_path() -> String {
    "callbridge.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            turso_url: String::new(),
            turso_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_callback_url")]
    pub callback_url: String,
}

fn default_callback_url() -> String {
    "http://localhost:8080/oauth/callback".to_string()
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            callback_url: default_callback_url(),
        }
    }
}

impl GoogleConfig {
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// UTC offset in hours used to resolve "today" and "yesterday".
    #[serde(default = "default_timezone_offset")]
    pub timezone_offset: i32,
}

fn default_timezone_offset() -> i32 {
    7
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            timezone_offset: default_timezone_offset(),
        }
    }
}

impl Config {
    /// Load config: defaults → callbridge.toml → env vars (env wins).
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| BridgeError::Config(format!("failed to read config: {e}")))?;
            toml::from_str(&content)
                .map_err(|e| BridgeError::Config(format!("failed to parse config: {e}")))?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = var("CALLBRIDGE_TELEGRAM_TOKEN") {
            self.telegram.token = v;
        }
        if let Some(v) = var("CALLBRIDGE_PORTAL_URL") {
            self.portal.base_url = v;
        }
        if let Some(v) = var("CALLBRIDGE_TURSO_URL") {
            self.database.turso_url = v;
        }
        if let Some(v) = var("CALLBRIDGE_TURSO_TOKEN") {
            self.database.turso_token = v;
        }
        if let Some(v) = var("CALLBRIDGE_GOOGLE_CLIENT_ID") {
            self.google.client_id = v;
        }
        if let Some(v) = var("CALLBRIDGE_GOOGLE_CLIENT_SECRET") {
            self.google.client_secret = v;
        }
        if let Some(v) = var("CALLBRIDGE_SERVER_PORT") {
            self.server.port = v
                .parse()
                .map_err(|_| BridgeError::Config(format!("invalid CALLBRIDGE_SERVER_PORT: {v}")))?;
        }

        self.portal.base_url = self.portal.base_url.trim_end_matches('/').to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load(Path::new("/nonexistent/callbridge.toml")).unwrap();
        assert_eq!(config.portal.max_login_attempts, 3);
        assert_eq!(config.server.port, 8080);
        assert!(config.telegram.is_allowed(42));
    }

    #[test]
    fn test_toml_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[telegram]\nallowed_chat_ids = [1, 2]\n\n[portal]\nbase_url = \"https://pbx.test/\"\nmax_login_attempts = 5\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.portal.base_url, "https://pbx.test");
        assert_eq!(config.portal.max_login_attempts, 5);
        assert!(config.telegram.is_allowed(2));
        assert!(!config.telegram.is_allowed(3));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CALLBRIDGE_TELEGRAM_TOKEN", "123:abc"),
            ("CALLBRIDGE_SERVER_PORT", "9090"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.telegram.token, "123:abc");
        assert_eq!(config.server.port, 9090);
    }

    #[test]
    fn test_bad_port_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_env(|k| (k == "CALLBRIDGE_SERVER_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }
}
