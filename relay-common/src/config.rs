//! Configuration for the relay services.
//!
//! All settings are environment-provided (no CLI surface, no config file).
//! `Config::from_env` reads the process environment once at startup; the
//! resulting struct is passed explicitly into every component instead of
//! living in ambient global state.
//!
//! # Environment Variable Mapping
//!
//! ## WhatsApp Cloud API
//! - `WHATSAPP_TOKEN` → whatsapp.access_token
//! - `WHATSAPP_PHONE_NUMBER_ID` → whatsapp.phone_number_id
//! - `WHATSAPP_VERIFY_TOKEN` → whatsapp.verify_token
//! - `WHATSAPP_APP_SECRET` → whatsapp.app_secret (optional, enables
//!   webhook signature verification)
//!
//! ## Completion API
//! - `GOOGLE_API_KEY` → llm.api_key (optional; absence degrades to a fixed
//!   user-visible error reply, never a crash)
//! - `RELAY_MODELS` → llm.models (comma-separated, ordered; empty means
//!   discover at startup)
//! - `RELAY_PERSONA_FILE` → llm.persona_file
//!
//! ## Server / sessions / observability
//! - `RELAY_BIND`, `RELAY_PORT`
//! - `RELAY_SESSION_TTL_SECS`, `RELAY_SWEEP_INTERVAL_SECS`, `RELAY_MAX_HISTORY`
//! - `RELAY_REQUEST_TIMEOUT_SECS`
//! - `RELAY_LOG_LEVEL`, `RELAY_LOG_FORMAT`

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub whatsapp: WhatsAppConfig,
    pub llm: LlmConfig,
    pub session: SessionConfig,
    pub observability: ObservabilityConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address. Default: "127.0.0.1" (local only).
    pub bind: String,
    /// Listen port. Default: 3000.
    pub port: u16,
}

/// WhatsApp Cloud API credentials and webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// Bearer credential for the Graph API.
    pub access_token: String,
    /// Sender phone number ID.
    pub phone_number_id: String,
    /// Shared token for Meta webhook verification (GET handshake).
    pub verify_token: String,
    /// App secret for X-Hub-Signature-256 verification (optional).
    #[serde(default)]
    pub app_secret: Option<String>,
}

/// Completion API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Google API key. `None` degrades every completion to a fixed
    /// configuration-error reply instead of crashing the process.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Ordered candidate model list. Empty means discover at startup.
    #[serde(default)]
    pub models: Vec<String>,
    /// Path to a persona text file. `None` uses the built-in persona.
    #[serde(default)]
    pub persona_file: Option<String>,
    /// Per-call HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

/// Session store tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle time after which a session is evicted. Default: 2 hours.
    pub ttl_secs: u64,
    /// Sweeper period. Default: 1 hour.
    pub sweep_interval_secs: u64,
    /// Retained history window per session. Default: 10 turns.
    pub max_history: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// The seam lets tests supply variables without mutating the process
    /// environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            get(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::Config(format!("missing required variable: {key}")))
        };

        // Parses at the field's own width, so an out-of-range value (a
        // five-digit RELAY_PORT, say) is rejected rather than truncated.
        fn parsed<T: std::str::FromStr>(
            get: &impl Fn(&str) -> Option<String>,
            key: &str,
            default: T,
        ) -> Result<T> {
            match get(key) {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| Error::Config(format!("{key} is not a valid number: {raw}"))),
                None => Ok(default),
            }
        }

        let models = get("RELAY_MODELS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            server: ServerConfig {
                bind: get("RELAY_BIND").unwrap_or_else(|| "127.0.0.1".into()),
                port: parsed(&get, "RELAY_PORT", 3000)?,
            },
            whatsapp: WhatsAppConfig {
                access_token: required("WHATSAPP_TOKEN")?,
                phone_number_id: required("WHATSAPP_PHONE_NUMBER_ID")?,
                verify_token: required("WHATSAPP_VERIFY_TOKEN")?,
                app_secret: get("WHATSAPP_APP_SECRET").filter(|v| !v.is_empty()),
            },
            llm: LlmConfig {
                api_key: get("GOOGLE_API_KEY").filter(|v| !v.is_empty()),
                models,
                persona_file: get("RELAY_PERSONA_FILE").filter(|v| !v.is_empty()),
                request_timeout_secs: parsed(&get, "RELAY_REQUEST_TIMEOUT_SECS", 30)?,
            },
            session: SessionConfig {
                ttl_secs: parsed(&get, "RELAY_SESSION_TTL_SECS", 2 * 60 * 60)?,
                sweep_interval_secs: parsed(&get, "RELAY_SWEEP_INTERVAL_SECS", 60 * 60)?,
                max_history: parsed(&get, "RELAY_MAX_HISTORY", 10)?,
            },
            observability: ObservabilityConfig {
                log_level: get("RELAY_LOG_LEVEL").unwrap_or_else(|| "info".into()),
                log_format: get("RELAY_LOG_FORMAT").unwrap_or_else(|| "pretty".into()),
            },
        })
    }
}
