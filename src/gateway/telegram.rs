//! Telegram Bot API delivery.
//!
//! Minimal `sendMessage` client used to push command replies back to the
//! chat. Delivery is best-effort: the webhook response always carries the
//! reply text regardless, so a failed send loses nothing permanent.
//!
//! API docs: https://core.telegram.org/bots/api#sendmessage
//! Auth: bot token in the URL path.

use anyhow::{bail, Context, Result};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const BASE_URL: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
}

/// Subset of the Bot API envelope we care about.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramClient {
    http: Client,
    token: SecretString,
}

impl TelegramClient {
    pub fn new(token: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build Telegram HTTP client")?;
        Ok(Self { http, token })
    }

    /// Send a plain-text message to a chat.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let url = format!(
            "{BASE_URL}/bot{}/sendMessage",
            self.token.expose_secret()
        );
        let response = self
            .http
            .post(&url)
            .json(&SendMessageRequest { chat_id, text })
            .send()
            .await
            .context("Telegram sendMessage request failed")?;

        let body: ApiResponse = response
            .json()
            .await
            .context("Telegram sendMessage returned malformed JSON")?;

        if !body.ok {
            bail!(
                "Telegram rejected message: {}",
                body.description.unwrap_or_else(|| "no description".to_string())
            );
        }

        debug!(chat_id, chars = text.len(), "Reply delivered to Telegram");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builds() {
        assert!(TelegramClient::new(SecretString::new("123:abc".to_string())).is_ok());
    }

    #[test]
    fn test_send_message_payload_shape() {
        let req = SendMessageRequest {
            chat_id: 42,
            text: "k=1 | payout=53.000.000",
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["chat_id"], 42);
        assert_eq!(json["text"], "k=1 | payout=53.000.000");
    }

    #[test]
    fn test_api_response_parses_error_envelope() {
        let body = r#"{"ok": false, "description": "Bad Request: chat not found"}"#;
        let resp: ApiResponse = serde_json::from_str(body).unwrap();
        assert!(!resp.ok);
        assert!(resp.description.unwrap().contains("chat not found"));
    }

    #[test]
    fn test_api_response_tolerates_missing_description() {
        let body = r#"{"ok": true, "result": {"message_id": 7}}"#;
        let resp: ApiResponse = serde_json::from_str(body).unwrap();
        assert!(resp.ok);
        assert!(resp.description.is_none());
    }
}
