//! WhatsApp Business Cloud API adapter.
//!
//! Messages arrive via webhook (push-based); replies and read receipts go
//! out through the Graph API send endpoint.

use crate::message::InboundMessage;
use reqwest::Client;
use std::time::Duration;

/// Production Graph API base (includes the API version).
pub const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v18.0";

/// Error from a Cloud API call.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("WhatsApp API error ({status}): {body}")]
    Api { status: u16, body: String },
}

/// WhatsApp channel using the Business Cloud API.
pub struct WhatsAppClient {
    access_token: String,
    phone_number_id: String,
    verify_token: String,
    api_base: String,
    client: Client,
}

impl WhatsAppClient {
    /// Create a new WhatsApp client.
    pub fn new(
        access_token: String,
        phone_number_id: String,
        verify_token: String,
        request_timeout: Duration,
    ) -> Self {
        Self {
            access_token,
            phone_number_id,
            verify_token,
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

    /// Shared token for Meta webhook verification.
    pub fn verify_token(&self) -> &str {
        &self.verify_token
    }

    /// Parse an incoming webhook payload and extract text messages.
    ///
    /// Fully defensive: any missing nested field skips the entry instead
    /// of failing, and non-text message types are ignored. Status-update
    /// callbacks therefore parse to an empty list.
    pub fn parse_webhook_payload(&self, payload: &serde_json::Value) -> Vec<InboundMessage> {
        let mut messages = Vec::new();

        let Some(entries) = payload.get("entry").and_then(|e| e.as_array()) else {
            return messages;
        };

        for entry in entries {
            let Some(changes) = entry.get("changes").and_then(|c| c.as_array()) else {
                continue;
            };

            for change in changes {
                let Some(msgs) = change
                    .get("value")
                    .and_then(|v| v.get("messages"))
                    .and_then(|m| m.as_array())
                else {
                    continue;
                };

                for msg in msgs {
                    let Some(from) = msg.get("from").and_then(|f| f.as_str()) else {
                        continue;
                    };

                    // Only text messages trigger the reply pipeline.
                    let Some(text) = msg
                        .get("text")
                        .and_then(|t| t.get("body"))
                        .and_then(|b| b.as_str())
                    else {
                        tracing::debug!(from = %from, "Skipping non-text message");
                        continue;
                    };

                    if text.is_empty() {
                        continue;
                    }

                    let timestamp = msg
                        .get("timestamp")
                        .and_then(|t| t.as_str())
                        .and_then(|t| t.parse::<i64>().ok())
                        .map(|ts| ts * 1000)
                        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

                    let id = msg
                        .get("id")
                        .and_then(|i| i.as_str())
                        .unwrap_or("unknown")
                        .to_string();

                    messages.push(InboundMessage {
                        id,
                        from: from.to_string(),
                        text: text.to_string(),
                        timestamp,
                    });
                }
            }
        }

        messages
    }

    /// Send a text message to a recipient.
    pub async fn send_text(&self, to: &str, text: &str) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": {
                "preview_url": false,
                "body": text
            }
        });

        self.post_messages(&body).await?;
        tracing::info!(to = %to, "WhatsApp message sent");
        Ok(())
    }

    /// Mark an inbound message as read (delivery receipt).
    pub async fn mark_read(&self, message_id: &str) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "status": "read",
            "message_id": message_id
        });

        self.post_messages(&body).await
    }

    async fn post_messages(&self, body: &serde_json::Value) -> Result<(), ChannelError> {
        let url = format!("{}/{}/messages", self.api_base, self.phone_number_id);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(format!("WhatsApp request error: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChannelError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_client() -> WhatsAppClient {
        WhatsAppClient::new(
            "test-token".into(),
            "123456789".into(),
            "verify-me".into(),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn verify_token_is_exposed() {
        assert_eq!(make_client().verify_token(), "verify-me");
    }

    #[test]
    fn parse_empty_payload() {
        let msgs = make_client().parse_webhook_payload(&json!({}));
        assert!(msgs.is_empty());
    }

    #[test]
    fn parse_valid_text_message() {
        let payload = json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "changes": [{
                    "value": {
                        "messages": [{
                            "from": "1234567890",
                            "id": "wamid.xxx",
                            "timestamp": "1699999999",
                            "type": "text",
                            "text": { "body": "Hello!" }
                        }]
                    }
                }]
            }]
        });

        let msgs = make_client().parse_webhook_payload(&payload);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].from, "1234567890");
        assert_eq!(msgs[0].text, "Hello!");
        assert_eq!(msgs[0].id, "wamid.xxx");
        assert_eq!(msgs[0].timestamp, 1_699_999_999_000);
    }

    #[test]
    fn parse_skips_non_text_messages() {
        let payload = json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "messages": [{
                            "from": "1234567890",
                            "id": "wamid.img",
                            "type": "image",
                            "image": { "id": "media-id" }
                        }]
                    }
                }]
            }]
        });

        assert!(make_client().parse_webhook_payload(&payload).is_empty());
    }

    #[test]
    fn parse_skips_status_only_callbacks() {
        let payload = json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "statuses": [{ "id": "wamid.xxx", "status": "delivered" }]
                    }
                }]
            }]
        });

        assert!(make_client().parse_webhook_payload(&payload).is_empty());
    }

    #[tokio::test]
    async fn send_text_posts_to_messages_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/123456789/messages"))
            .and(header("Authorization", "Bearer test-token"))
            .and(body_partial_json(json!({
                "messaging_product": "whatsapp",
                "to": "1234567890",
                "type": "text",
                "text": { "body": "hi" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{ "id": "wamid.out" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client().with_api_base(server.uri());
        client.send_text("1234567890", "hi").await.unwrap();
    }

    #[tokio::test]
    async fn send_failure_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let client = make_client().with_api_base(server.uri());
        let err = client.send_text("1234567890", "hi").await.unwrap_err();
        assert!(matches!(err, ChannelError::Api { status: 400, .. }));
    }

    #[tokio::test]
    async fn mark_read_posts_read_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/123456789/messages"))
            .and(body_partial_json(json!({
                "status": "read",
                "message_id": "wamid.xxx"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client().with_api_base(server.uri());
        client.mark_read("wamid.xxx").await.unwrap();
    }
}
