//! Reply pipeline: inbound message to outbound reply.
//!
//! Runs after the webhook has already been acknowledged, so every failure
//! here is logged and swallowed. Outbound delivery is best-effort and
//! never rolls back session state: the turn counts as delivered once it
//! is handed to the dispatcher.

use crate::message::InboundMessage;
use crate::session::SessionStore;
use crate::whatsapp::WhatsAppClient;
use relay_gateway::{FailoverClient, Role};
use std::sync::Arc;

/// Wires the session store, completion client, and WhatsApp dispatcher
/// into the per-message flow.
pub struct MessagePipeline {
    sessions: Arc<SessionStore>,
    completion: Arc<FailoverClient>,
    whatsapp: Arc<WhatsAppClient>,
    persona: String,
}

impl MessagePipeline {
    pub fn new(
        sessions: Arc<SessionStore>,
        completion: Arc<FailoverClient>,
        whatsapp: Arc<WhatsAppClient>,
        persona: String,
    ) -> Self {
        Self {
            sessions,
            completion,
            whatsapp,
            persona,
        }
    }

    /// Process one inbound message end to end.
    pub async fn handle(&self, msg: InboundMessage) {
        tracing::info!(
            from = %msg.from,
            preview = %msg.text.chars().take(50).collect::<String>(),
            "Inbound message"
        );

        // Read receipt first, best-effort.
        if let Err(e) = self.whatsapp.mark_read(&msg.id).await {
            tracing::debug!(message_id = %msg.id, error = %e, "mark_read failed");
        }

        let history = self
            .sessions
            .append_turn(&msg.from, Role::User, &msg.text)
            .await;

        // Never fails: degraded outcomes are fixed reply strings.
        let reply = self.completion.generate(&self.persona, &history).await;

        self.sessions
            .append_turn(&msg.from, Role::Assistant, &reply)
            .await;

        if let Err(e) = self.whatsapp.send_text(&msg.from, &reply).await {
            tracing::warn!(to = %msg.from, error = %e, "Outbound send failed");
        }
    }
}
