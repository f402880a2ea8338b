//! Completion layer for the relay.
//!
//! Provides a Gemini `generateContent` client and an ordered failover
//! wrapper that walks a static candidate-model list, returning the first
//! successful completion. Failure handling is deliberately simple: a
//! terminal credential error short-circuits the chain, a rate limit gets a
//! single bounded retry, everything else moves on to the next candidate.

#![warn(clippy::all)]

pub mod failover;
pub mod gemini;

pub use failover::{FailoverClient, FailoverConfig, CONFIG_ERROR_REPLY, FALLBACK_REPLY};
pub use gemini::GeminiClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Conversation Types
// ============================================================================

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End-user message
    User,
    /// Generated reply
    Assistant,
    /// Pinned instruction (retained through history trimming)
    System,
}

impl Role {
    /// String representation used in logs and serialized history.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    /// Role name on the Gemini wire, which only knows "user" and "model".
    pub const fn gemini_role(self) -> &'static str {
        match self {
            Self::Assistant => "model",
            Self::User | Self::System => "user",
        }
    }
}

/// A single conversational turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

// ============================================================================
// Backend Seam
// ============================================================================

/// Error from a completion backend.
#[derive(Debug, Clone)]
pub struct CompletionError {
    /// Candidate model the call was made against.
    pub model: String,
    pub message: String,
    /// HTTP status, when the failure came from an API response.
    pub status_code: Option<u16>,
    /// Terminal errors (missing/invalid credential) stop the failover
    /// chain instead of advancing to the next candidate.
    pub terminal: bool,
}

impl CompletionError {
    /// Rate-limit failures get one bounded retry before failing over.
    pub fn is_rate_limited(&self) -> bool {
        self.status_code == Some(429)
    }
}

impl std::fmt::Display for CompletionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.model, self.message)
    }
}

impl std::error::Error for CompletionError {}

/// Interface to a text-generation endpoint for one candidate model.
///
/// The failover client is generic over this seam so tests can inject
/// scripted backends.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Generate a reply for `history` under the `system` persona using
    /// the given candidate model.
    async fn complete(
        &self,
        model: &str,
        system: &str,
        history: &[Turn],
    ) -> Result<String, CompletionError>;
}
