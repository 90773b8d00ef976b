//! Discord-compatible webhook channel.
//!
//! Messages are POSTed as JSON to `{base}/api/webhooks/{id}/{token}`:
//! embeds as `{"embeds":[{title, description, color}]}`, plain text as
//! `{"content": ...}`.

use std::fmt;

use serde_json::json;
use storywatch_core::WebhookCredentials;

use crate::traits::{Message, MessageChannel, NotifyError};

/// Seconds to back off when a 429 carries no parseable `retry_after`.
const DEFAULT_RETRY_AFTER_SECS: f64 = 5.0;

/// Delivers messages to one Discord webhook.
pub struct DiscordWebhook {
    name: String,
    /// Full webhook URL. Contains the token, never logged.
    url: String,
    client: reqwest::Client,
}

impl DiscordWebhook {
    /// Create a webhook channel named `name` (used in logs only).
    ///
    /// Empty credentials produce a [`NotifyError::Config`] error.
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        credentials: &WebhookCredentials,
        client: reqwest::Client,
    ) -> Result<Self, NotifyError> {
        let name = name.into();
        if credentials.id.trim().is_empty() || credentials.token.trim().is_empty() {
            return Err(NotifyError::Config(format!(
                "webhook credentials for '{name}' must not be empty"
            )));
        }

        let url = format!(
            "{}/api/webhooks/{}/{}",
            base_url.trim_end_matches('/'),
            credentials.id,
            credentials.token
        );

        Ok(Self { name, url, client })
    }

    fn payload(message: &Message) -> serde_json::Value {
        match message {
            Message::Embed {
                title,
                description,
                color,
            } => json!({
                "embeds": [{
                    "title": title,
                    "description": description,
                    "color": color,
                }]
            }),
            Message::Text(content) => json!({ "content": content }),
        }
    }
}

impl fmt::Debug for DiscordWebhook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordWebhook")
            .field("name", &self.name)
            .field("url", &"<redacted>")
            .finish()
    }
}

#[async_trait::async_trait]
impl MessageChannel for DiscordWebhook {
    async fn send(&self, message: &Message) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&Self::payload(message))
            .send()
            .await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let header_hint = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<f64>().ok());
            let body_hint = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|b| b.get("retry_after").and_then(|v| v.as_f64()));
            let retry_after_secs = body_hint
                .or(header_hint)
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

            tracing::warn!(
                channel = %self.name,
                retry_after_secs,
                "webhook rate limited"
            );
            return Err(NotifyError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(
                channel = %self.name,
                %status,
                body = %body,
                "webhook returned non-2xx status"
            );
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(channel = %self.name, %status, "webhook message delivered");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::POST;
    use httpmock::MockServer;

    fn webhook(server: &MockServer) -> DiscordWebhook {
        DiscordWebhook::new(
            "mula",
            &server.base_url(),
            &WebhookCredentials::new("123", "tok"),
            reqwest::Client::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn embed_is_posted_as_embeds_array() {
        let server = MockServer::start();
        let hook = server.mock(|when, then| {
            when.method(POST)
                .path("/api/webhooks/123/tok")
                .json_body(json!({
                    "embeds": [{"title": "T", "description": "D", "color": 16768954}]
                }));
            then.status(204);
        });

        webhook(&server)
            .send(&Message::embed("T", "D", 0xFFDFBA))
            .await
            .unwrap();
        hook.assert();
    }

    #[tokio::test]
    async fn text_is_posted_as_content() {
        let server = MockServer::start();
        let hook = server.mock(|when, then| {
            when.method(POST)
                .path("/api/webhooks/123/tok")
                .json_body(json!({"content": "hello"}));
            then.status(200).body("{}");
        });

        webhook(&server)
            .send(&Message::Text("hello".into()))
            .await
            .unwrap();
        hook.assert();
    }

    #[tokio::test]
    async fn rate_limit_reports_retry_after() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(429)
                .header("content-type", "application/json")
                .body(r#"{"message":"You are being rate limited.","retry_after":1.5,"global":false}"#);
        });

        let err = webhook(&server)
            .send(&Message::Text("x".into()))
            .await
            .unwrap_err();
        match err {
            NotifyError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 1.5),
            other => panic!("expected RateLimited, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_success_includes_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(400).body(r#"{"code":50006,"message":"Cannot send an empty message"}"#);
        });

        let err = webhook(&server)
            .send(&Message::Text(String::new()))
            .await
            .unwrap_err();
        match err {
            NotifyError::Rejected { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("empty message"));
            }
            other => panic!("expected Rejected, got: {other:?}"),
        }
    }

    #[test]
    fn empty_credentials_are_rejected() {
        let result = DiscordWebhook::new(
            "alerts",
            "https://discord.com",
            &WebhookCredentials::new("", "tok"),
            reqwest::Client::new(),
        );
        assert!(matches!(result, Err(NotifyError::Config(_))));
    }

    #[test]
    fn debug_redacts_url() {
        let hook = DiscordWebhook::new(
            "alerts",
            "https://discord.com/",
            &WebhookCredentials::new("1", "very-secret"),
            reqwest::Client::new(),
        )
        .unwrap();
        assert_eq!(hook.url, "https://discord.com/api/webhooks/1/very-secret");
        assert!(!format!("{hook:?}").contains("very-secret"));
    }
}
