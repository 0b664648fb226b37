use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};
use url::form_urlencoded;

/// Resolved configuration for one notifier instance. Built by
/// [`crate::config::NotifierSettings::resolve`] and immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct NotifierConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub secret: Option<String>,
}

/// What a send attempt did.
#[derive(Debug, PartialEq, Eq)]
pub enum Dispatch {
    Sent,
    /// The notifier is disabled; no request was made.
    Skipped,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("no chat webhook URL configured")]
    MissingWebhookUrl,
    #[error("chat webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("chat webhook answered {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("chat webhook rejected the message: {reply}")]
    Rejected { reply: String },
}

/// A chat message. The webhook only understands these two shapes; anything
/// else is unrepresentable by construction.
#[derive(Debug)]
pub enum Message<'a> {
    Text { content: &'a str },
    Markdown { title: &'a str, content: &'a str },
}

impl Message<'_> {
    fn payload(&self) -> Value {
        match self {
            Message::Text { content } => json!({
                "msg_type": "text",
                "content": { "text": content },
            }),
            Message::Markdown { title, content } => json!({
                "msg_type": "interactive",
                "card": {
                    "schema": "2.0",
                    "config": {
                        "update_multi": true,
                        "style": {
                            "text_size": {
                                "normal_v2": {
                                    "default": "normal",
                                    "pc": "normal",
                                    "mobile": "heading",
                                },
                            },
                        },
                    },
                    "body": {
                        "direction": "vertical",
                        "padding": "12px 12px 12px 12px",
                        "elements": [
                            {
                                "tag": "markdown",
                                "content": content,
                                "text_align": "left",
                                "text_size": "normal_v2",
                                "margin": "0px 0px 0px 0px",
                            },
                        ],
                    },
                    "header": {
                        "title": { "tag": "plain_text", "content": title },
                        "template": "blue",
                        "padding": "12px 12px 12px 12px",
                    },
                },
            }),
        }
    }
}

/// Best-effort chat delivery over a signed webhook.
///
/// Every failure mode is reported back as a [`NotifyError`] instead of being
/// swallowed here; the caller decides whether a failed notification is worth
/// more than a log line. Nothing in here panics on a failed send.
pub struct ChatNotifier {
    http: Client,
    config: NotifierConfig,
}

impl ChatNotifier {
    pub fn new(config: NotifierConfig, http: Client) -> Self {
        ChatNotifier { http, config }
    }

    pub async fn send(&self, message: &Message<'_>) -> Result<Dispatch, NotifyError> {
        if !self.config.enabled {
            info!("chat notifications are disabled, skipping");
            return Ok(Dispatch::Skipped);
        }

        let webhook_url = self
            .config
            .webhook_url
            .as_deref()
            .ok_or(NotifyError::MissingWebhookUrl)?;
        let url = match self.config.secret.as_deref() {
            // the timestamp is regenerated for every send
            Some(secret) => signed_url(webhook_url, secret, unix_timestamp()),
            None => webhook_url.to_owned(),
        };

        debug!("posting chat notification to {}", url);
        let response = self.http.post(&url).json(&message.payload()).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(NotifyError::Status { status, body });
        }

        let reply: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        if reply.get("msg").and_then(Value::as_str) != Some("success") {
            return Err(NotifyError::Rejected { reply: body });
        }

        Ok(Dispatch::Sent)
    }
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn signed_url(webhook_url: &str, secret: &str, timestamp: u64) -> String {
    format!(
        "{}?timestamp={}&sign={}",
        webhook_url,
        timestamp,
        gen_sign(timestamp, secret)
    )
}

/// Computes the webhook signature for one timestamp.
///
/// The chat platform derives the HMAC key from the timestamp and the secret
/// and signs an empty message; the digest is base64- then percent-encoded.
fn gen_sign(timestamp: u64, secret: &str) -> String {
    use hmac::{Hmac, Mac, NewMac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let string_to_sign = format!("{}\n{}", timestamp, secret);
    let mac =
        HmacSha256::new_from_slice(string_to_sign.as_bytes()).expect("this should never fail");

    let sign = base64::encode(mac.finalize().into_bytes());
    form_urlencoded::byte_serialize(sign.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn enabled_config(webhook_url: &str) -> NotifierConfig {
        NotifierConfig {
            enabled: true,
            webhook_url: Some(webhook_url.to_owned()),
            secret: None,
        }
    }

    #[test]
    fn signatures_match_the_golden_vectors() {
        assert_eq!(
            gen_sign(1700000000, "s"),
            "%2Bz1fiKH1w9xoRwSUZju5W5ZBj%2Fd5cwS4H%2B5mTClDOl4%3D"
        );
        assert_eq!(
            gen_sign(1609459200, "super-secret"),
            "O90qstp5loK8R0Exo0yeI4x6uIYOOGlDhDD3hbP7Z3s%3D"
        );
    }

    #[test]
    fn signed_urls_carry_timestamp_and_signature() {
        assert_eq!(
            signed_url("https://chat.example.com/hook", "s", 1700000000),
            "https://chat.example.com/hook?timestamp=1700000000&sign=%2Bz1fiKH1w9xoRwSUZju5W5ZBj%2Fd5cwS4H%2B5mTClDOl4%3D"
        );
    }

    #[test]
    fn text_messages_use_the_plain_shape() {
        let payload = Message::Text { content: "hello" }.payload();

        assert_eq!(payload["msg_type"], "text");
        assert_eq!(payload["content"]["text"], "hello");
    }

    #[test]
    fn markdown_messages_render_a_card() {
        let payload = Message::Markdown {
            title: "Review",
            content: "**done**",
        }
        .payload();

        assert_eq!(payload["msg_type"], "interactive");
        assert_eq!(payload["card"]["header"]["title"]["content"], "Review");
        assert_eq!(payload["card"]["body"]["elements"][0]["content"], "**done**");
    }

    #[tokio::test]
    async fn disabled_notifier_skips_without_a_network_call() {
        let notifier = ChatNotifier::new(
            NotifierConfig {
                enabled: false,
                webhook_url: Some("http://127.0.0.1:1/unroutable".to_owned()),
                secret: Some("s".to_owned()),
            },
            Client::new(),
        );

        let outcome = notifier
            .send(&Message::Text { content: "hello" })
            .await
            .unwrap();
        assert_eq!(outcome, Dispatch::Skipped);
    }

    #[tokio::test]
    async fn missing_webhook_url_is_an_error() {
        let notifier = ChatNotifier::new(
            NotifierConfig {
                enabled: true,
                webhook_url: None,
                secret: None,
            },
            Client::new(),
        );

        let outcome = notifier.send(&Message::Text { content: "hello" }).await;
        assert!(matches!(outcome, Err(NotifyError::MissingWebhookUrl)));
    }

    #[tokio::test]
    async fn successful_sends_require_the_success_marker() {
        let server = MockServer::start();
        let hook = server.mock(|when, then| {
            when.method(POST).path("/hook");
            then.status(200).json_body(json!({ "msg": "success" }));
        });

        let notifier = ChatNotifier::new(enabled_config(&server.url("/hook")), Client::new());
        let outcome = notifier
            .send(&Message::Text { content: "hello" })
            .await
            .unwrap();

        assert_eq!(outcome, Dispatch::Sent);
        hook.assert_hits(1);
    }

    #[tokio::test]
    async fn signed_sends_append_query_parameters() {
        let server = MockServer::start();
        let hook = server.mock(|when, then| {
            when.method(POST)
                .path("/hook")
                .query_param_exists("timestamp")
                .query_param_exists("sign");
            then.status(200).json_body(json!({ "msg": "success" }));
        });

        let mut config = enabled_config(&server.url("/hook"));
        config.secret = Some("s".to_owned());
        let notifier = ChatNotifier::new(config, Client::new());
        let outcome = notifier
            .send(&Message::Text { content: "hello" })
            .await
            .unwrap();

        assert_eq!(outcome, Dispatch::Sent);
        hook.assert_hits(1);
    }

    #[tokio::test]
    async fn a_200_without_the_marker_is_rejected() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/hook");
            then.status(200)
                .json_body(json!({ "code": 19001, "msg": "sign mismatch" }));
        });

        let notifier = ChatNotifier::new(enabled_config(&server.url("/hook")), Client::new());
        let outcome = notifier.send(&Message::Text { content: "hello" }).await;

        assert!(matches!(outcome, Err(NotifyError::Rejected { .. })));
    }

    #[tokio::test]
    async fn non_200_answers_are_reported_with_their_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/hook");
            then.status(500).body("internal error");
        });

        let notifier = ChatNotifier::new(enabled_config(&server.url("/hook")), Client::new());
        let outcome = notifier.send(&Message::Text { content: "hello" }).await;

        match outcome {
            Err(NotifyError::Status { status, body }) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "internal error");
            }
            other => panic!("expected a status error, got {:?}", other),
        }
    }
}
