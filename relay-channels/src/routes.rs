//! HTTP routes for the relay webhook endpoints.
//!
//! - `GET /` — health/status
//! - `GET /webhook` — Meta webhook verification handshake
//! - `POST /webhook` — inbound message callback, acknowledged immediately

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::pipeline::MessagePipeline;
use crate::session::SessionStore;
use crate::whatsapp::WhatsAppClient;

// ============================================================================
// State
// ============================================================================

/// Shared state for the relay HTTP server.
pub struct AppState {
    /// Per-message reply pipeline
    pub pipeline: Arc<MessagePipeline>,
    /// WhatsApp client (webhook verification token lives here)
    pub whatsapp: Arc<WhatsAppClient>,
    /// Session store (health reporting)
    pub sessions: Arc<SessionStore>,
    /// App secret for X-Hub-Signature-256 verification (optional)
    pub app_secret: Option<String>,
    /// Candidate model count (health reporting)
    pub active_models: usize,
    /// Process start time (health reporting)
    pub started_at: Instant,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    uptime_secs: u64,
    active_models: usize,
    sessions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct WebhookResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

// ============================================================================
// Router
// ============================================================================

/// Build the relay router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/webhook", get(webhook_verify).post(webhook_receive))
        .with_state(state)
}

// ============================================================================
// Health
// ============================================================================

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(StatusResponse {
        status: "online",
        service: "relay-channels",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        active_models: state.active_models,
        sessions: state.sessions.len().await,
    })
}

// ============================================================================
// Webhook Verification (GET)
// ============================================================================

/// Meta webhook verification query params.
#[derive(Debug, Deserialize)]
struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// GET /webhook — one-time external handshake: echo the challenge back
/// only when the shared verification token matches.
async fn webhook_verify(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VerifyQuery>,
) -> impl IntoResponse {
    // Constant-time comparison to prevent timing attacks
    let token_matches = params.verify_token.as_deref().is_some_and(|t| {
        let expected = state.whatsapp.verify_token();
        t.len() == expected.len()
            && t.as_bytes()
                .iter()
                .zip(expected.as_bytes())
                .all(|(a, b)| a == b)
    });

    if params.mode.as_deref() == Some("subscribe") && token_matches {
        if let Some(challenge) = params.challenge {
            tracing::info!("Webhook verified successfully");
            return (StatusCode::OK, challenge);
        }
        return (StatusCode::BAD_REQUEST, "Missing hub.challenge".to_string());
    }

    tracing::warn!("Webhook verification failed: token mismatch");
    (StatusCode::FORBIDDEN, "Forbidden".to_string())
}

// ============================================================================
// Webhook Receive (POST)
// ============================================================================

/// Verify the Meta webhook signature (X-Hub-Signature-256).
/// See: <https://developers.facebook.com/docs/graph-api/webhooks/getting-started#verification-requests>
fn verify_signature(app_secret: &str, body: &[u8], signature_header: &str) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    // Signature format: "sha256=<hex_signature>"
    let Some(hex_sig) = signature_header.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    // Constant-time comparison
    mac.verify_slice(&expected).is_ok()
}

/// POST /webhook — inbound message callback.
///
/// Acknowledged with 200 immediately for any payload shape; the platform's
/// retry policy requires a sub-second reply independent of downstream
/// latency. Processing runs in a detached task and its failures never
/// reach the caller.
async fn webhook_receive(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    // Signature verification, only when an app secret is configured.
    if let Some(ref app_secret) = state.app_secret {
        let signature = headers
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if !verify_signature(app_secret, &body, signature) {
            tracing::warn!(
                signature = if signature.is_empty() { "missing" } else { "invalid" },
                "Webhook signature verification failed"
            );
            return (
                StatusCode::UNAUTHORIZED,
                Json(WebhookResponse {
                    success: false,
                    message: Some("Invalid signature".to_string()),
                }),
            );
        }
    }

    // Malformed JSON is acknowledged and dropped: the platform sends
    // event types we never asked for, and none of them may crash us.
    let messages = match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(payload) => state.whatsapp.parse_webhook_payload(&payload),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring non-JSON webhook body");
            Vec::new()
        }
    };

    for msg in messages {
        let pipeline = state.pipeline.clone();
        tokio::spawn(async move {
            pipeline.handle(msg).await;
        });
    }

    (
        StatusCode::OK,
        Json(WebhookResponse {
            success: true,
            message: None,
        }),
    )
}
