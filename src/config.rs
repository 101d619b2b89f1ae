//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (webhook secret, Telegram bot token) are referenced by env-var
//! name in the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub gateway: GatewayConfig,
    pub telegram: TelegramConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    pub name: String,
    pub currency: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub webhook_secret_env: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    /// When false, replies are only returned in the webhook response.
    pub enabled: bool,
    #[serde(default)]
    pub bot_token_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub db_path: String,
    /// Create missing tables at startup. Disable once the schema is
    /// managed out of band.
    pub migrate_on_start: bool,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
