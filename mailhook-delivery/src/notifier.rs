use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use mailhook_common::internal;
use serde::Deserialize;

use crate::error::{NotifyError, SystemError};

/// Something that can carry a one-line notification to an endpoint
#[async_trait]
pub trait Notifier: Send + Sync + Debug {
    /// Deliver `text` to `endpoint`. A single attempt, no retries.
    ///
    /// # Errors
    /// If the endpoint could not be reached or refused the notification.
    async fn notify(&self, endpoint: &str, text: &str) -> Result<(), NotifyError>;
}

fn default_username() -> String {
    String::from("mailhook")
}

fn default_icon_emoji() -> String {
    String::from(":email:")
}

/// Presentation and transport settings for incoming-webhook notifications
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Name the message is posted as
    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default = "default_icon_emoji")]
    pub icon_emoji: String,

    /// Whole-request timeout in seconds. `None` waits as long as the endpoint takes.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            icon_emoji: default_icon_emoji(),
            timeout_secs: None,
        }
    }
}

/// Posts Slack/Mattermost compatible JSON payloads
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookNotifier {
    /// Build the notifier and its HTTP client
    ///
    /// # Errors
    /// If the HTTP client cannot be constructed (e.g. the TLS backend fails to load).
    pub fn new(config: WebhookConfig) -> Result<Self, SystemError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let client = builder
            .build()
            .map_err(|e| SystemError::HttpClient(e.to_string()))?;

        Ok(Self { client, config })
    }

    #[must_use]
    pub const fn config(&self) -> &WebhookConfig {
        &self.config
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[tracing::instrument(level = "trace", skip(self))]
    async fn notify(&self, endpoint: &str, text: &str) -> Result<(), NotifyError> {
        let payload = serde_json::json!({
            "text": text,
            "username": self.config.username,
            "icon_emoji": self.config.icon_emoji,
        });

        let response = self.client.post(endpoint).json(&payload).send().await?;
        let status = response.status();

        if status.is_success() {
            internal!("Webhook {endpoint} accepted notification ({status})");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn config_defaults() {
        let config: WebhookConfig = ron::from_str("()").unwrap();
        assert_eq!(config.username, "mailhook");
        assert_eq!(config.icon_emoji, ":email:");
        assert_eq!(config.timeout_secs, None);

        let config: WebhookConfig =
            ron::from_str(r#"(username: "alertbot", timeout_secs: Some(3))"#).unwrap();
        assert_eq!(config.username, "alertbot");
        assert_eq!(config.icon_emoji, ":email:");
        assert_eq!(config.timeout_secs, Some(3));
    }

    #[tokio::test]
    async fn posts_payload() {
        let server = MockServer::start_async().await;
        let hook = server
            .mock_async(|when, then| {
                when.method(POST).path("/hooks/ops").json_body(json!({
                    "text": "Disk full",
                    "username": "mailhook",
                    "icon_emoji": ":email:",
                }));
                then.status(200).body("ok");
            })
            .await;

        let notifier = WebhookNotifier::new(WebhookConfig::default()).unwrap();
        notifier
            .notify(&server.url("/hooks/ops"), "Disk full")
            .await
            .unwrap();

        hook.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn non_success_is_rejected() {
        let server = MockServer::start_async().await;
        let hook = server
            .mock_async(|when, then| {
                when.method(POST).path("/hooks/gone");
                then.status(404).body("no such hook");
            })
            .await;

        let notifier = WebhookNotifier::new(WebhookConfig::default()).unwrap();
        let err = notifier
            .notify(&server.url("/hooks/gone"), "Disk full")
            .await
            .unwrap_err();

        assert!(
            matches!(&err, NotifyError::Rejected { status: 404, body } if body == "no such hook"),
            "unexpected error: {err:?}"
        );
        hook.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        // Bind then drop to get a port nothing listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let notifier = WebhookNotifier::new(WebhookConfig {
            timeout_secs: Some(5),
            ..WebhookConfig::default()
        })
        .unwrap();
        let err = notifier
            .notify(&format!("http://127.0.0.1:{port}/hook"), "Disk full")
            .await
            .unwrap_err();

        assert!(matches!(err, NotifyError::Transport(_)), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn custom_identity() {
        let server = MockServer::start_async().await;
        let hook = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/hook")
                    .json_body(json!({"text": "Backup done", "username": "alertbot", "icon_emoji": ":robot:"}));
                then.status(204);
            })
            .await;

        let notifier = WebhookNotifier::new(WebhookConfig {
            username: String::from("alertbot"),
            icon_emoji: String::from(":robot:"),
            timeout_secs: None,
        })
        .unwrap();
        notifier.notify(&server.url("/hook"), "Backup done").await.unwrap();

        hook.assert_hits_async(1).await;
    }
}
