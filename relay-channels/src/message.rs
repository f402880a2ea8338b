//! Inbound message types.

use serde::{Deserialize, Serialize};

/// A text message extracted from a webhook callback.
///
/// Transient value object: lives for the duration of one request and is
/// never persisted beyond the session history it gets appended to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform message ID (used for the read receipt)
    pub id: String,
    /// Sender identifier (phone number), also the session key
    pub from: String,
    /// Message text
    pub text: String,
    /// Timestamp (Unix millis)
    pub timestamp: i64,
}
