//! Ordered model failover.
//!
//! Walks a static candidate list top-to-bottom on every request and
//! returns the first successful completion. Degraded outcomes are plain
//! reply strings, never errors: the chat user always gets text back.

use crate::{CompletionBackend, Turn};
use std::sync::Arc;
use std::time::Duration;

/// Reply sent when every candidate fails transiently.
pub const FALLBACK_REPLY: &str =
    "I am currently overloaded. Please try again in a moment.";

/// Reply sent when the completion credential is missing or rejected.
pub const CONFIG_ERROR_REPLY: &str = "System Error: API Key missing.";

/// Configuration for failover behavior.
#[derive(Debug, Clone)]
pub struct FailoverConfig {
    /// Fixed delay before the single rate-limit retry.
    pub rate_limit_backoff: Duration,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            rate_limit_backoff: Duration::from_secs(1),
        }
    }
}

/// Completion client with ordered candidate failover.
///
/// Total blocking time is bounded by
/// `candidates x (per-call timeout + backoff)`; the per-call timeout lives
/// in the backend's HTTP client.
pub struct FailoverClient {
    backend: Arc<dyn CompletionBackend>,
    models: Vec<String>,
    config: FailoverConfig,
}

impl FailoverClient {
    /// Create a failover client over an ordered candidate list.
    pub fn new(backend: Arc<dyn CompletionBackend>, models: Vec<String>) -> Self {
        Self::with_config(backend, models, FailoverConfig::default())
    }

    /// Create with explicit failover configuration.
    pub fn with_config(
        backend: Arc<dyn CompletionBackend>,
        models: Vec<String>,
        config: FailoverConfig,
    ) -> Self {
        Self {
            backend,
            models,
            config,
        }
    }

    /// The candidate list, in consultation order.
    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Generate a reply for `history` under the `persona` instruction.
    ///
    /// Never fails from the caller's perspective:
    /// - first successful candidate wins, none after it are tried;
    /// - a terminal (credential) error stops the chain and yields
    ///   [`CONFIG_ERROR_REPLY`];
    /// - a rate-limited candidate is retried once after a fixed backoff,
    ///   then skipped;
    /// - exhausting the list yields [`FALLBACK_REPLY`].
    pub async fn generate(&self, persona: &str, history: &[Turn]) -> String {
        if self.models.is_empty() {
            tracing::error!("No candidate models configured");
            return FALLBACK_REPLY.to_string();
        }

        for model in &self.models {
            let mut retried_rate_limit = false;

            loop {
                tracing::debug!(model = %model, turns = history.len(), "Generating");

                match self.backend.complete(model, persona, history).await {
                    Ok(text) => {
                        tracing::info!(model = %model, "Completion succeeded");
                        return text;
                    }
                    Err(e) if e.terminal => {
                        tracing::error!(
                            model = %model,
                            error = %e,
                            "Terminal completion error, check GOOGLE_API_KEY"
                        );
                        return CONFIG_ERROR_REPLY.to_string();
                    }
                    Err(e) if e.is_rate_limited() && !retried_rate_limit => {
                        tracing::warn!(
                            model = %model,
                            backoff_ms = self.config.rate_limit_backoff.as_millis() as u64,
                            "Rate limited, cooling down before one retry"
                        );
                        tokio::time::sleep(self.config.rate_limit_backoff).await;
                        retried_rate_limit = true;
                    }
                    Err(e) => {
                        tracing::warn!(
                            model = %model,
                            status = ?e.status_code,
                            error = %e,
                            "Candidate failed, trying next"
                        );
                        break;
                    }
                }
            }
        }

        tracing::error!(candidates = self.models.len(), "All candidate models failed");
        FALLBACK_REPLY.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CompletionBackend, CompletionError, Role};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted backend: per-model outcome plus a call counter.
    struct ScriptedBackend {
        outcomes: Mutex<HashMap<String, Outcome>>,
        calls: Mutex<Vec<String>>,
        rate_limit_hits: AtomicUsize,
    }

    #[derive(Clone)]
    enum Outcome {
        Reply(&'static str),
        Fail {
            status: Option<u16>,
            terminal: bool,
        },
        /// Rate-limited for the first N calls, then replies.
        RateLimitedUntil(usize, &'static str),
    }

    impl ScriptedBackend {
        fn new(outcomes: &[(&str, Outcome)]) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(
                    outcomes
                        .iter()
                        .map(|(m, o)| ((*m).to_string(), o.clone()))
                        .collect(),
                ),
                calls: Mutex::new(Vec::new()),
                rate_limit_hits: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(
            &self,
            model: &str,
            _system: &str,
            _history: &[Turn],
        ) -> Result<String, CompletionError> {
            self.calls.lock().unwrap().push(model.to_string());

            let outcome = self
                .outcomes
                .lock()
                .unwrap()
                .get(model)
                .cloned()
                .unwrap_or(Outcome::Fail {
                    status: Some(500),
                    terminal: false,
                });

            match outcome {
                Outcome::Reply(text) => Ok(text.to_string()),
                Outcome::Fail { status, terminal } => Err(CompletionError {
                    model: model.to_string(),
                    message: "scripted failure".into(),
                    status_code: status,
                    terminal,
                }),
                Outcome::RateLimitedUntil(n, text) => {
                    if self.rate_limit_hits.fetch_add(1, Ordering::SeqCst) < n {
                        Err(CompletionError {
                            model: model.to_string(),
                            message: "too many requests".into(),
                            status_code: Some(429),
                            terminal: false,
                        })
                    } else {
                        Ok(text.to_string())
                    }
                }
            }
        }
    }

    fn fast_config() -> FailoverConfig {
        FailoverConfig {
            rate_limit_backoff: Duration::from_millis(1),
        }
    }

    fn history() -> Vec<Turn> {
        vec![Turn::new(Role::User, "hello")]
    }

    #[tokio::test]
    async fn first_success_wins_and_stops() {
        let backend = ScriptedBackend::new(&[
            ("a", Outcome::Fail { status: Some(500), terminal: false }),
            ("b", Outcome::Fail { status: None, terminal: false }),
            ("c", Outcome::Reply("from c")),
            ("d", Outcome::Reply("from d")),
        ]);
        let client = FailoverClient::with_config(
            backend.clone(),
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
            fast_config(),
        );

        let reply = client.generate("persona", &history()).await;
        assert_eq!(reply, "from c");
        // d is never attempted
        assert_eq!(backend.calls(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn terminal_error_short_circuits() {
        let backend = ScriptedBackend::new(&[
            ("a", Outcome::Fail { status: Some(401), terminal: true }),
            ("b", Outcome::Reply("never")),
        ]);
        let client = FailoverClient::with_config(
            backend.clone(),
            vec!["a".into(), "b".into()],
            fast_config(),
        );

        let reply = client.generate("persona", &history()).await;
        assert_eq!(reply, CONFIG_ERROR_REPLY);
        assert_eq!(backend.calls(), vec!["a"]);
    }

    #[tokio::test]
    async fn all_transient_failures_yield_fallback() {
        let backend = ScriptedBackend::new(&[
            ("a", Outcome::Fail { status: Some(503), terminal: false }),
            ("b", Outcome::Fail { status: None, terminal: false }),
        ]);
        let client = FailoverClient::with_config(
            backend,
            vec!["a".into(), "b".into()],
            fast_config(),
        );

        let reply = client.generate("persona", &history()).await;
        assert_eq!(reply, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn rate_limit_gets_exactly_one_retry() {
        let backend = ScriptedBackend::new(&[
            ("a", Outcome::RateLimitedUntil(1, "recovered")),
        ]);
        let client =
            FailoverClient::with_config(backend.clone(), vec!["a".into()], fast_config());

        let reply = client.generate("persona", &history()).await;
        assert_eq!(reply, "recovered");
        assert_eq!(backend.calls(), vec!["a", "a"]);
    }

    #[tokio::test]
    async fn persistent_rate_limit_moves_to_next_candidate() {
        let backend = ScriptedBackend::new(&[
            ("a", Outcome::RateLimitedUntil(usize::MAX, "never")),
            ("b", Outcome::Reply("from b")),
        ]);
        let client = FailoverClient::with_config(
            backend.clone(),
            vec!["a".into(), "b".into()],
            fast_config(),
        );

        let reply = client.generate("persona", &history()).await;
        assert_eq!(reply, "from b");
        // a tried twice (initial + single bounded retry), then b
        assert_eq!(backend.calls(), vec!["a", "a", "b"]);
    }

    #[tokio::test]
    async fn empty_candidate_list_yields_fallback() {
        let backend = ScriptedBackend::new(&[]);
        let client = FailoverClient::with_config(backend.clone(), vec![], fast_config());

        let reply = client.generate("persona", &history()).await;
        assert_eq!(reply, FALLBACK_REPLY);
        assert!(backend.calls().is_empty());
    }
}
