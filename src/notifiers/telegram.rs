use crate::formatter::{format_ad, largest_image_url, Flavor};
use crate::http_client::{HttpReply, HttpTransport};
use crate::models::ChatId;
use crate::notifier_trait::{Notifier, Payload};
use crate::retry::{run_with_retry, AttemptError, DeliveryOutcome, RetryPolicy};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Pushes ads to Telegram chats through the Bot API, as a photo with an HTML caption
/// when the ad has pictures and as a plain HTML message otherwise.
pub struct TelegramNotifier {
    transport: Arc<dyn HttpTransport>,
    bot_token: String,
    chat_ids: Vec<ChatId>,
    policy: RetryPolicy,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        bot_token: &str,
        chat_ids: Vec<ChatId>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            bot_token: bot_token.to_string(),
            chat_ids,
            policy,
            api_base: TELEGRAM_API_BASE.to_string(),
        }
    }

    /// Point the notifier at another Bot API server (e.g. a self-hosted one)
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// Ready-made text goes out once, without retries.
    async fn send_text(&self, chat_id: &ChatId, text: &str) {
        let body = json!({
            "chat_id": chat_id.to_string(),
            "text": text,
            "parse_mode": "HTML",
        });

        match self.transport.post_json(&self.method_url("sendMessage"), &body, REQUEST_TIMEOUT).await {
            Ok(reply) if reply.is_success() => {
                tracing::debug!("Text message sent to Telegram chat {}", chat_id);
            }
            Ok(reply) => {
                tracing::warn!(
                    "Telegram refused text message for chat {}: HTTP {} {}",
                    chat_id, reply.status, reply.body
                );
            }
            Err(e) => {
                tracing::error!("Failed to send text message to Telegram chat {}: {:#}", chat_id, e);
            }
        }
    }

    /// Deliver an already rendered ad to one chat, retrying on network failures.
    pub(crate) async fn deliver_to(
        &self,
        chat_id: &ChatId,
        message: &str,
        image_url: Option<&str>,
    ) -> DeliveryOutcome {
        let recipient = chat_id.to_string();
        let recipient = recipient.as_str();

        let outcome = run_with_retry(self.policy, self.name(), recipient, move |_| {
            self.attempt(recipient, message, image_url)
        })
        .await;

        if outcome.is_delivered() {
            tracing::info!("Telegram chat {}: {}", chat_id, outcome);
        } else {
            tracing::debug!("Telegram chat {}: {}", chat_id, outcome);
        }
        outcome
    }

    async fn attempt(&self, chat_id: &str, message: &str, image_url: Option<&str>) -> Result<(), AttemptError> {
        let (method, body) = match image_url {
            Some(photo) => (
                "sendPhoto",
                json!({
                    "chat_id": chat_id,
                    "caption": message,
                    "photo": photo,
                    "parse_mode": "HTML",
                    "disable_web_page_preview": true,
                }),
            ),
            None => (
                "sendMessage",
                json!({
                    "chat_id": chat_id,
                    "text": message,
                    "parse_mode": "HTML",
                    "disable_web_page_preview": true,
                }),
            ),
        };

        let reply = self.transport
            .post_json(&self.method_url(method), &body, REQUEST_TIMEOUT)
            .await
            .map_err(AttemptError::Retryable)?;

        let result = classify_reply(&reply);
        if matches!(result, Err(AttemptError::Rejected(_))) {
            tracing::debug!("Rejected Telegram request: {}", body);
        }
        result
    }
}

/// 400 means the payload itself is bad; any other failure status is worth retrying.
fn classify_reply(reply: &HttpReply) -> Result<(), AttemptError> {
    if reply.status == 400 {
        let description = serde_json::from_str::<serde_json::Value>(&reply.body)
            .ok()
            .and_then(|v| v.get("description").and_then(|d| d.as_str()).map(str::to_string))
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(AttemptError::Rejected(format!("HTTP 400: {}", description)));
    }

    if !reply.is_success() {
        return Err(AttemptError::Retryable(anyhow::anyhow!(
            "HTTP {}: {}",
            reply.status,
            reply.body
        )));
    }

    Ok(())
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "Telegram"
    }

    async fn deliver(&self, payload: Payload<'_>) {
        match payload {
            Payload::Text(text) => {
                for chat_id in &self.chat_ids {
                    self.send_text(chat_id, text).await;
                }
            }
            Payload::Ad(ad) => {
                let message = format_ad(ad, Flavor::Html);
                let image_url = largest_image_url(ad);

                for chat_id in &self.chat_ids {
                    self.deliver_to(chat_id, &message, image_url.as_deref()).await;
                }
            }
        }
    }

    fn is_enabled(&self) -> bool {
        !self.chat_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::testing::{ScriptedTransport, Step};
    use crate::models::{Ad, Image};

    fn notifier(transport: Arc<ScriptedTransport>, chat_ids: &[i64]) -> TelegramNotifier {
        TelegramNotifier::new(
            transport,
            "123:SECRET",
            chat_ids.iter().map(|id| ChatId::Numeric(*id)).collect(),
            RetryPolicy::new(5, Duration::ZERO),
        )
    }

    fn ad_with_photo() -> Ad {
        Ad {
            title: Some("Холодильник".to_string()),
            images: vec![Image::new([("100x100", "https://img/small"), ("640x480", "https://img/big")])],
            ..Ad::default()
        }
    }

    #[tokio::test]
    async fn test_photo_with_caption() {
        let transport = Arc::new(ScriptedTransport::new());
        notifier(transport.clone(), &[42]).deliver(Payload::Ad(&ad_with_photo())).await;

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url(), "https://api.telegram.org/bot123:SECRET/sendPhoto");

        let body = requests[0].json();
        assert_eq!(body["chat_id"], "42");
        assert_eq!(body["caption"], "<b>Холодильник</b>");
        assert_eq!(body["photo"], "https://img/big");
        assert_eq!(body["parse_mode"], "HTML");
        assert_eq!(body["disable_web_page_preview"], true);
        assert_eq!(requests[0].timeout(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_text_only_without_images() {
        let transport = Arc::new(ScriptedTransport::new());
        let ad = Ad {
            title: Some("Без фото".to_string()),
            ..Ad::default()
        };
        notifier(transport.clone(), &[42]).deliver(Payload::Ad(&ad)).await;

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].url().ends_with("/sendMessage"));
        assert_eq!(requests[0].json()["text"], "<b>Без фото</b>");
        assert!(requests[0].json().get("photo").is_none());
    }

    #[tokio::test]
    async fn test_retries_until_fifth_attempt_succeeds() {
        let transport = Arc::new(ScriptedTransport::new().script(
            "42",
            vec![
                Step::Fail("connection reset"),
                Step::Fail("connection reset"),
                Step::Fail("timed out"),
                Step::Fail("timed out"),
                Step::Reply(200, r#"{"ok":true}"#),
            ],
        ));
        let notifier = notifier(transport.clone(), &[42]);

        let outcome = notifier
            .deliver_to(&ChatId::Numeric(42), "msg", None)
            .await;

        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 5 });
        assert_eq!(transport.requests().len(), 5);
    }

    #[tokio::test]
    async fn test_gives_up_after_all_attempts() {
        let transport = Arc::new(ScriptedTransport::new().script(
            "42",
            (0..5).map(|_| Step::Fail("connection refused")).collect(),
        ));
        let notifier = notifier(transport.clone(), &[42]);

        let outcome = notifier
            .deliver_to(&ChatId::Numeric(42), "msg", None)
            .await;

        assert_eq!(outcome, DeliveryOutcome::Exhausted { attempts: 5 });
        assert_eq!(transport.requests().len(), 5);
    }

    #[tokio::test]
    async fn test_bad_request_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new().script(
            "42",
            vec![Step::Reply(400, r#"{"ok":false,"description":"Bad Request: wrong file identifier"}"#)],
        ));
        let notifier = notifier(transport.clone(), &[42]);

        let outcome = notifier
            .deliver_to(&ChatId::Numeric(42), "msg", Some("https://img/broken"))
            .await;

        assert_eq!(
            outcome,
            DeliveryOutcome::Rejected {
                attempts: 1,
                reason: "HTTP 400: Bad Request: wrong file identifier".to_string()
            }
        );
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let transport = Arc::new(ScriptedTransport::new().script(
            "42",
            vec![Step::Reply(502, "Bad Gateway"), Step::Reply(200, r#"{"ok":true}"#)],
        ));
        let notifier = notifier(transport.clone(), &[42]);

        let outcome = notifier.deliver_to(&ChatId::Numeric(42), "msg", None).await;

        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 2 });
    }

    #[tokio::test]
    async fn test_failing_recipient_does_not_block_others() {
        let transport = Arc::new(ScriptedTransport::new().script(
            "111",
            (0..5).map(|_| Step::Fail("connection refused")).collect(),
        ));

        notifier(transport.clone(), &[111, 222])
            .deliver(Payload::Ad(&ad_with_photo()))
            .await;

        let chats: Vec<String> = transport
            .requests()
            .iter()
            .map(|r| r.json()["chat_id"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(chats, vec!["111", "111", "111", "111", "111", "222"]);
    }

    #[tokio::test]
    async fn test_raw_text_is_sent_once() {
        let transport = Arc::new(ScriptedTransport::new().script("7", vec![Step::Fail("timed out")]));

        notifier(transport.clone(), &[7, 8])
            .deliver(Payload::Text("<b>Бот запущен</b>"))
            .await;

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].url().ends_with("/sendMessage"));
        assert_eq!(requests[0].json()["text"], "<b>Бот запущен</b>");
        assert_eq!(requests[1].json()["chat_id"], "8");
    }

    #[test]
    fn test_custom_api_base() {
        let transport = Arc::new(ScriptedTransport::new());
        let notifier = notifier(transport, &[1]).with_api_base("http://localhost:8081/");
        assert_eq!(notifier.method_url("sendPhoto"), "http://localhost:8081/bot123:SECRET/sendPhoto");
    }

    #[test]
    fn test_disabled_without_chats() {
        let transport = Arc::new(ScriptedTransport::new());
        assert!(!notifier(transport, &[]).is_enabled());
    }
}
