//! HUIBOT — rotating savings pot (hụi) manager.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the SQLite store (migrating when configured), and serves the
//! webhook gateway with graceful shutdown.

use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, warn};

use huibot::config;
use huibot::gateway::{self, telegram::TelegramClient, GatewayState};
use huibot::storage::SqliteStore;

const BANNER: &str = r#"
 _   _ _   _ ___ ____   ___ _____
| | | | | | |_ _| __ ) / _ \_   _|
| |_| | | | || ||  _ \| | | || |
|  _  | |_| || || |_) | |_| || |
|_| |_|\___/|___|____/ \___/ |_|

  Rotating Savings Pot Manager
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = config::AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        bot_name = %cfg.bot.name,
        currency = %cfg.bot.currency,
        port = cfg.gateway.port,
        db_path = %cfg.storage.db_path,
        "HUIBOT starting up"
    );

    // -- Storage ----------------------------------------------------------

    let store = SqliteStore::connect(&cfg.storage.db_path).await?;
    if cfg.storage.migrate_on_start {
        store.migrate().await?;
        info!("DB init & migrations completed");
    }

    // -- Secrets ----------------------------------------------------------

    let webhook_secret = config::AppConfig::resolve_env(&cfg.gateway.webhook_secret_env)
        .unwrap_or_else(|_| {
            warn!(
                env = %cfg.gateway.webhook_secret_env,
                "Webhook secret not set — falling back to \"dev\""
            );
            "dev".to_string()
        });

    let telegram = if cfg.telegram.enabled {
        match cfg
            .telegram
            .bot_token_env
            .as_deref()
            .map(config::AppConfig::resolve_env)
        {
            Some(Ok(token)) => {
                info!("Telegram delivery enabled");
                Some(TelegramClient::new(SecretString::new(token))?)
            }
            _ => {
                warn!("Telegram enabled but no bot token — replies stay in the webhook response");
                None
            }
        }
    } else {
        None
    };

    // -- Serve ------------------------------------------------------------

    let state = Arc::new(GatewayState {
        store: Arc::new(store),
        webhook_secret: SecretString::new(webhook_secret),
        telegram,
    });

    gateway::serve(state, cfg.gateway.port, shutdown_signal()).await?;

    info!("HUIBOT shut down cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received.");
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("huibot=info"));

    let json_logging = std::env::var("HUIBOT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
