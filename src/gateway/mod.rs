//! Messaging gateway — Axum webhook server.
//!
//! One stateless endpoint receives updates with an already-tokenized
//! command, loads what it needs from the store, runs the pure core, and
//! answers with plain text. A health probe rides alongside for the
//! container platform.

pub mod commands;
pub mod telegram;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::storage::RecordStore;
use telegram::TelegramClient;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State shared by all route handlers.
pub struct GatewayState {
    pub store: Arc<dyn RecordStore>,
    pub webhook_secret: SecretString,
    /// Optional reply delivery; `None` means webhook-response only.
    pub telegram: Option<TelegramClient>,
}

pub type AppState = Arc<GatewayState>;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Incoming update: a chat id plus the tokenized command line.
#[derive(Debug, Deserialize)]
pub struct Update {
    pub chat_id: i64,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookReply {
    pub ok: bool,
    pub reply: String,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/webhook/:secret", post(webhook))
        .with_state(state)
}

/// Serve the gateway until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    port: u16,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(port, "Gateway listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /healthz
async fn healthz() -> &'static str {
    "ok"
}

/// POST /webhook/{secret}
async fn webhook(
    State(state): State<AppState>,
    Path(secret): Path<String>,
    Json(update): Json<Update>,
) -> Result<Json<WebhookReply>, StatusCode> {
    if secret != *state.webhook_secret.expose_secret() {
        warn!("Webhook called with bad secret");
        return Err(StatusCode::FORBIDDEN);
    }

    info!(
        chat_id = update.chat_id,
        command = %update.command,
        args = update.args.len(),
        "Update received"
    );
    let reply = commands::dispatch(state.store.clone(), &update.command, &update.args).await;

    if let Some(tg) = &state.telegram {
        // Best-effort: the reply still goes back in the response body.
        if let Err(e) = tg.send_message(update.chat_id, &reply).await {
            warn!(error = %e, chat_id = update.chat_id, "Telegram delivery failed");
        }
    }

    Ok(Json(WebhookReply { ok: true, reply }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
