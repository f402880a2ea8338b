//! Google Gemini client for the relay.
//!
//! Wraps the `generateContent` REST endpoint with typed request/response
//! structs, plus startup model discovery against `/v1beta/models` so the
//! candidate list never has to be guessed.

use crate::{CompletionBackend, CompletionError, Turn};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Production API base. Tests point the client at a local mock server.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Fallback candidate list used when discovery fails.
pub const SAFE_MODELS: &[&str] = &["gemini-pro", "gemini-1.5-flash"];

/// Gemini completion client.
pub struct GeminiClient {
    api_key: Option<String>,
    api_base: String,
    client: Client,
}

// ============================================================================
// API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Option<Vec<ModelInfo>>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
    #[serde(rename = "supportedGenerationMethods", default)]
    supported_generation_methods: Vec<String>,
}

// ============================================================================
// Client
// ============================================================================

impl GeminiClient {
    /// Create a new client.
    ///
    /// A missing API key does not fail construction: every call then
    /// returns a terminal error, which the failover layer turns into the
    /// fixed configuration-error reply.
    pub fn new(api_key: Option<String>, request_timeout: Duration) -> Self {
        Self {
            api_key,
            api_base: DEFAULT_API_BASE.to_string(),
            client: Client::builder()
                .timeout(request_timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Override the API base URL (test hook).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Whether a credential is configured.
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    fn key_for(&self, model: &str) -> Result<&str, CompletionError> {
        self.api_key.as_deref().ok_or_else(|| CompletionError {
            model: model.to_string(),
            message: "GOOGLE_API_KEY not configured".into(),
            status_code: None,
            terminal: true,
        })
    }

    /// Discover models usable for text generation, ranked fastest-first.
    ///
    /// Keeps only models advertising `generateContent`, strips the
    /// `models/` prefix, and prefers flash over pro over legacy names.
    pub async fn list_models(&self) -> Result<Vec<String>, CompletionError> {
        let api_key = self.key_for("discovery")?;
        let url = format!("{}/v1beta/models?key={api_key}", self.api_base);

        let response = self.client.get(&url).send().await.map_err(|e| {
            CompletionError {
                model: "discovery".into(),
                message: format!("Request failed: {e}"),
                status_code: None,
                terminal: false,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError {
                model: "discovery".into(),
                message: format!("API error ({}): {body}", status.as_u16()),
                status_code: Some(status.as_u16()),
                terminal: matches!(status.as_u16(), 401 | 403),
            });
        }

        let result: ModelsResponse = response.json().await.map_err(|e| CompletionError {
            model: "discovery".into(),
            message: format!("Failed to parse response: {e}"),
            status_code: None,
            terminal: false,
        })?;

        let mut models: Vec<String> = result
            .models
            .unwrap_or_default()
            .into_iter()
            .filter(|m| {
                m.supported_generation_methods
                    .iter()
                    .any(|method| method == "generateContent")
            })
            .map(|m| m.name.trim_start_matches("models/").to_string())
            .collect();

        models.sort_by_key(|name| rank_model(name));
        Ok(models)
    }

    /// Discovery with the safe fallback applied.
    ///
    /// Never fails: any discovery error (including a missing key) degrades
    /// to [`SAFE_MODELS`] so the process still starts.
    pub async fn discover_models(&self) -> Vec<String> {
        match self.list_models().await {
            Ok(models) if !models.is_empty() => {
                tracing::info!(
                    count = models.len(),
                    priority = %models.iter().take(3).cloned().collect::<Vec<_>>().join(", "),
                    "Model discovery complete"
                );
                models
            }
            Ok(_) => {
                tracing::warn!("Model discovery returned no usable models, using safe list");
                SAFE_MODELS.iter().map(|m| (*m).to_string()).collect()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Model discovery failed, using safe list");
                SAFE_MODELS.iter().map(|m| (*m).to_string()).collect()
            }
        }
    }
}

/// Priority rank for discovered models: lower sorts first.
fn rank_model(name: &str) -> u8 {
    if name.contains("flash") {
        1
    } else if name.contains("pro") && !name.starts_with("gemini-pro") {
        2
    } else if name.starts_with("gemini-pro") {
        3
    } else {
        4
    }
}

#[async_trait]
impl CompletionBackend for GeminiClient {
    async fn complete(
        &self,
        model: &str,
        system: &str,
        history: &[Turn],
    ) -> Result<String, CompletionError> {
        let api_key = self.key_for(model)?;

        let contents: Vec<Content> = history
            .iter()
            .map(|turn| Content {
                role: Some(turn.role.gemini_role().to_string()),
                parts: vec![Part {
                    text: turn.text.clone(),
                }],
            })
            .collect();

        let request = GenerateContentRequest {
            contents,
            system_instruction: (!system.is_empty()).then(|| Content {
                role: None,
                parts: vec![Part {
                    text: system.to_string(),
                }],
            }),
        };

        let url = format!(
            "{}/v1beta/models/{model}:generateContent?key={api_key}",
            self.api_base
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CompletionError {
                model: model.to_string(),
                message: format!("Request failed: {e}"),
                status_code: None,
                terminal: false,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError {
                model: model.to_string(),
                message: format!("API error ({}): {body}", status.as_u16()),
                status_code: Some(status.as_u16()),
                // Invalid credentials fail every candidate identically, so
                // trying the rest of the list would only burn the quota.
                terminal: matches!(status.as_u16(), 401 | 403),
            });
        }

        let result: GenerateContentResponse =
            response.json().await.map_err(|e| CompletionError {
                model: model.to_string(),
                message: format!("Failed to parse response: {e}"),
                status_code: None,
                terminal: false,
            })?;

        if let Some(err) = result.error {
            return Err(CompletionError {
                model: model.to_string(),
                message: format!("API error: {}", err.message),
                status_code: None,
                terminal: false,
            });
        }

        let text = result
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content.parts.into_iter().next())
            .and_then(|p| p.text)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CompletionError {
                model: model.to_string(),
                message: "Empty response from model".into(),
                status_code: None,
                terminal: false,
            })?;

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GeminiClient {
        GeminiClient::new(Some("test-key".into()), Duration::from_secs(5))
            .with_api_base(server.uri())
    }

    #[test]
    fn flash_models_rank_first() {
        let mut models = vec![
            "gemini-pro".to_string(),
            "gemini-1.5-pro".to_string(),
            "gemini-1.5-flash".to_string(),
            "embedding-001".to_string(),
        ];
        models.sort_by_key(|m| rank_model(m));
        assert_eq!(
            models,
            vec!["gemini-1.5-flash", "gemini-1.5-pro", "gemini-pro", "embedding-001"]
        );
    }

    #[test]
    fn missing_key_is_terminal_without_io() {
        let client = GeminiClient::new(None, Duration::from_secs(5));
        assert!(!client.has_credentials());

        let err = tokio_test::block_on(client.complete("gemini-pro", "persona", &[]))
            .unwrap_err();
        assert!(err.terminal);
        assert!(err.status_code.is_none());
    }

    #[tokio::test]
    async fn complete_extracts_reply_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
            .and(body_partial_json(json!({
                "system_instruction": { "parts": [{ "text": "persona" }] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "Hello there" }] }
                }]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let history = vec![Turn::new(Role::User, "Hi")];
        let reply = client
            .complete("gemini-1.5-flash", "persona", &history)
            .await
            .unwrap();
        assert_eq!(reply, "Hello there");
    }

    #[tokio::test]
    async fn auth_failure_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.complete("gemini-pro", "", &[]).await.unwrap_err();
        assert!(err.terminal);
        assert_eq!(err.status_code, Some(403));
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.complete("gemini-pro", "", &[]).await.unwrap_err();
        assert!(!err.terminal);
        assert_eq!(err.status_code, Some(500));
    }

    #[tokio::test]
    async fn empty_candidates_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.complete("gemini-pro", "", &[]).await.unwrap_err();
        assert!(!err.terminal);
        assert!(err.message.contains("Empty response"));
    }

    #[tokio::test]
    async fn discovery_filters_and_ranks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [
                    { "name": "models/gemini-pro", "supportedGenerationMethods": ["generateContent"] },
                    { "name": "models/embedding-001", "supportedGenerationMethods": ["embedContent"] },
                    { "name": "models/gemini-1.5-flash", "supportedGenerationMethods": ["generateContent", "countTokens"] }
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let models = client.list_models().await.unwrap();
        assert_eq!(models, vec!["gemini-1.5-flash", "gemini-pro"]);
    }

    #[tokio::test]
    async fn discovery_failure_degrades_to_safe_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let models = client.discover_models().await;
        assert_eq!(models, SAFE_MODELS);
    }
}
