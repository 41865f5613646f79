use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use callbridge_bot::bot::front::ChatFront;
use callbridge_bot::bot::router::Poller;
use callbridge_bot::bot::telegram::TelegramFront;
use callbridge_bot::service::store::LibsqlStore;
use callbridge_bot::service::sync::SheetSync;
use callbridge_bot::{Bridge, BridgeSettings, GoogleLink};
use callbridge_core::config::Config;
use callbridge_core::error::Result;
use callbridge_integrations::google::sheets::SheetsClient;
use callbridge_integrations::google::GoogleAuth;
use callbridge_integrations::http::{start_oauth_server, ConsentListener};
use callbridge_integrations::portal::PortalSession;
use callbridge_integrations::store::KvStore;
use callbridge_telegram::bot::TelegramBot;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path =
        std::env::var("CALLBRIDGE_CONFIG").unwrap_or_else(|_| "callbridge.toml".to_string());

    let config = Config::load(Path::new(&config_path)).unwrap_or_else(|e| {
        tracing::error!("fatal: failed to load config: {e}");
        std::process::exit(1);
    });

    if config.telegram.token.is_empty() {
        tracing::error!("fatal: CALLBRIDGE_TELEGRAM_TOKEN is not set");
        std::process::exit(1);
    }

    tracing::info!("callbridge: starting...");

    if let Err(e) = run(config).await {
        tracing::error!("fatal: {e}");
        std::process::exit(1);
    }
}

async fn open_store(config: &Config) -> Result<Arc<dyn KvStore>> {
    let store = if config.database.turso_url.is_empty() {
        LibsqlStore::new(&config.database.path).await?
    } else {
        LibsqlStore::new_remote(&config.database.turso_url, &config.database.turso_token).await?
    };
    Ok(Arc::new(store))
}

async fn run(config: Config) -> Result<()> {
    let store = open_store(&config).await?;

    let portal = Arc::new(PortalSession::new(
        &config.portal.base_url,
        Duration::from_secs(config.portal.timeout_secs),
        Arc::clone(&store),
    ));

    let google = if config.google.is_configured() {
        let auth = Arc::new(GoogleAuth::new(
            config.google.client_id.clone(),
            config.google.client_secret.clone(),
            config.google.callback_url.clone(),
            Arc::clone(&store),
        ));
        let sheets = SheetsClient::new(Arc::clone(&auth));
        Some(GoogleLink {
            auth,
            sync: SheetSync::new(Arc::new(sheets)),
        })
    } else {
        tracing::warn!("[oauth] google client not configured, sheet mode disabled");
        None
    };
    let consent_auth = google.as_ref().map(|g| Arc::clone(&g.auth));

    let bot = Arc::new(TelegramBot::new(&config.telegram.token));
    let front = Arc::new(TelegramFront::new(Arc::clone(&bot), config.bot.timezone_offset));

    let bridge = Arc::new(Bridge::new(
        store,
        portal,
        google,
        Arc::clone(&front) as Arc<dyn ChatFront>,
        BridgeSettings::from(&config),
    ));

    if let Some(auth) = consent_auth {
        let port = config.server.port;
        let listener: Arc<dyn ConsentListener> = bridge.clone();
        tokio::spawn(async move {
            if let Err(e) = start_oauth_server(port, auth, listener).await {
                tracing::error!("[oauth] callback server stopped: {e}");
            }
        });
    }

    Poller::new(bridge, bot, front, config.telegram.clone())
        .run()
        .await
}
