//! WhatsApp webhook relay service.
//!
//! Receives inbound WhatsApp Cloud API messages via a Meta webhook,
//! forwards the conversation (persona + a bounded recent-history window)
//! to the Gemini completion API with ordered model failover, and relays
//! the reply back to the originating chat.
//!
//! ```text
//! WhatsApp → POST /webhook → SessionStore → FailoverClient (Gemini)
//!                                 ↓               ↓
//! User ←──── send_text ←──── MessagePipeline ← reply
//! ```
//!
//! All session state is memory-resident and lost on restart.

#![warn(clippy::all)]

pub mod message;
pub mod persona;
pub mod pipeline;
pub mod routes;
pub mod session;
pub mod whatsapp;

// Re-export commonly used types
pub use message::InboundMessage;
pub use pipeline::MessagePipeline;
pub use routes::{build_router, AppState};
pub use session::{spawn_sweeper, Session, SessionStore};
pub use whatsapp::{ChannelError, WhatsAppClient};

use relay_common::Config;
use relay_gateway::{FailoverClient, GeminiClient};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

/// Assemble the application state from configuration.
///
/// Performs startup model discovery when no candidate list is configured.
pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let request_timeout = Duration::from_secs(config.llm.request_timeout_secs);

    let persona = persona::load(config.llm.persona_file.as_deref())?;

    let whatsapp = Arc::new(WhatsAppClient::new(
        config.whatsapp.access_token.clone(),
        config.whatsapp.phone_number_id.clone(),
        config.whatsapp.verify_token.clone(),
        request_timeout,
    ));

    let gemini = GeminiClient::new(config.llm.api_key.clone(), request_timeout);
    let models = if config.llm.models.is_empty() {
        gemini.discover_models().await
    } else {
        config.llm.models.clone()
    };
    tracing::info!(candidates = models.len(), priority = %models.join(", "), "Candidate models");

    let completion = Arc::new(FailoverClient::new(Arc::new(gemini), models));
    let sessions = Arc::new(SessionStore::new(config.session.max_history));

    let pipeline = Arc::new(MessagePipeline::new(
        sessions.clone(),
        completion.clone(),
        whatsapp.clone(),
        persona,
    ));

    Ok(Arc::new(AppState {
        pipeline,
        whatsapp,
        sessions: sessions.clone(),
        app_secret: config.whatsapp.app_secret.clone(),
        active_models: completion.models().len(),
        started_at: std::time::Instant::now(),
    }))
}

/// Start the relay HTTP server.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.server.bind.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    let state = build_state(config).await?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = build_router(state.clone()).layer(cors);

    // Eviction sweeper, owned by the server lifecycle.
    let sweeper = spawn_sweeper(
        state.sessions.clone(),
        Duration::from_secs(config.session.sweep_interval_secs),
        Duration::from_secs(config.session.ttl_secs),
    );

    tracing::info!("Starting relay on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    sweeper.abort();

    Ok(())
}
