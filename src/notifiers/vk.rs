use crate::formatter::{format_ad, Flavor};
use crate::http_client::{HttpReply, HttpTransport};
use crate::models::ChatId;
use crate::notifier_trait::{Notifier, Payload};
use crate::retry::{run_with_retry, AttemptError, DeliveryOutcome, RetryPolicy};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub const VK_API_URL: &str = "https://api.vk.com/method/messages.send";
pub const DEFAULT_API_VERSION: &str = "5.199";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Sends ads to VK conversations with `messages.send`. VK bots get plain text only.
pub struct VkNotifier {
    transport: Arc<dyn HttpTransport>,
    access_token: String,
    peer_ids: Vec<ChatId>,
    api_version: String,
    policy: RetryPolicy,
    api_url: String,
}

impl VkNotifier {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        access_token: &str,
        peer_ids: Vec<ChatId>,
        api_version: &str,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            access_token: access_token.to_string(),
            peer_ids,
            api_version: api_version.to_string(),
            policy,
            api_url: VK_API_URL.to_string(),
        }
    }

    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.to_string();
        self
    }

    pub(crate) async fn deliver_to(&self, peer_id: &ChatId, message: &str) -> DeliveryOutcome {
        let recipient = peer_id.to_string();
        let recipient = recipient.as_str();

        let outcome = run_with_retry(self.policy, self.name(), recipient, move |_| {
            self.attempt(recipient, message)
        })
        .await;

        if outcome.is_delivered() {
            tracing::info!("VK peer {}: {}", peer_id, outcome);
        } else {
            tracing::debug!("VK peer {}: {}", peer_id, outcome);
        }
        outcome
    }

    async fn attempt(&self, peer_id: &str, message: &str) -> Result<(), AttemptError> {
        let form = [
            ("access_token", self.access_token.clone()),
            ("v", self.api_version.clone()),
            ("peer_id", peer_id.to_string()),
            ("random_id", chrono::Utc::now().timestamp_millis().to_string()),
            ("message", message.to_string()),
        ];

        let reply = self.transport
            .post_form(&self.api_url, &form, REQUEST_TIMEOUT)
            .await
            .map_err(AttemptError::Retryable)?;

        classify_reply(&reply)
    }
}

/// Server faults are retried. Other HTTP errors and API-level `error` objects are final.
fn classify_reply(reply: &HttpReply) -> Result<(), AttemptError> {
    if reply.status != 200 {
        if reply.status >= 500 {
            return Err(AttemptError::Retryable(anyhow::anyhow!(
                "VK server error HTTP {}: {}",
                reply.status,
                reply.body
            )));
        }
        return Err(AttemptError::Rejected(format!("HTTP {}: {}", reply.status, reply.body)));
    }

    let data: serde_json::Value = serde_json::from_str(&reply.body)
        .map_err(|e| AttemptError::Rejected(format!("unreadable VK response: {}", e)))?;

    if let Some(error) = data.get("error") {
        let code = error.get("error_code").and_then(|c| c.as_i64()).unwrap_or_default();
        let message = error.get("error_msg").and_then(|m| m.as_str()).unwrap_or("unknown error");
        return Err(AttemptError::Rejected(format!("VK API error {} - {}", code, message)));
    }

    Ok(())
}

#[async_trait]
impl Notifier for VkNotifier {
    fn name(&self) -> &str {
        "VK"
    }

    async fn deliver(&self, payload: Payload<'_>) {
        let message = match payload {
            Payload::Ad(ad) => format_ad(ad, Flavor::Plain),
            Payload::Text(text) => text.to_string(),
        };

        for peer_id in &self.peer_ids {
            self.deliver_to(peer_id, &message).await;
        }
    }

    fn is_enabled(&self) -> bool {
        !self.peer_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::testing::{ScriptedTransport, Step};
    use crate::models::{Ad, Price};

    fn notifier(transport: Arc<ScriptedTransport>, peer_ids: &[i64]) -> VkNotifier {
        VkNotifier::new(
            transport,
            "vk1.a.token",
            peer_ids.iter().map(|id| ChatId::Numeric(*id)).collect(),
            DEFAULT_API_VERSION,
            RetryPolicy::new(5, Duration::ZERO),
        )
    }

    #[tokio::test]
    async fn test_sends_plain_text_form() {
        let transport = Arc::new(ScriptedTransport::new());
        let ad = Ad {
            title: Some("Самокат".to_string()),
            price: Some(Price::Text("1234567".to_string())),
            ..Ad::default()
        };

        notifier(transport.clone(), &[2000000001]).deliver(Payload::Ad(&ad)).await;

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.url(), VK_API_URL);
        assert_eq!(request.timeout(), Duration::from_secs(15));
        assert_eq!(request.form_value("access_token"), Some("vk1.a.token"));
        assert_eq!(request.form_value("v"), Some("5.199"));
        assert_eq!(request.form_value("peer_id"), Some("2000000001"));
        assert_eq!(request.form_value("message"), Some("Самокат\n💰 1 234 567 ₽"));
        assert!(request
            .form_value("random_id")
            .and_then(|id| id.parse::<i64>().ok())
            .is_some());
    }

    #[tokio::test]
    async fn test_raw_text_goes_through_retry() {
        let transport = Arc::new(ScriptedTransport::new().script(
            "5",
            vec![Step::Fail("timed out"), Step::Reply(200, r#"{"response":1}"#)],
        ));

        notifier(transport.clone(), &[5]).deliver(Payload::Text("Проверка связи")).await;

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].form_value("message"), Some("Проверка связи"));
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let transport = Arc::new(ScriptedTransport::new().script(
            "5",
            vec![
                Step::Reply(503, "Service Unavailable"),
                Step::Reply(500, "Internal Server Error"),
                Step::Reply(200, r#"{"response":77}"#),
            ],
        ));

        let outcome = notifier(transport.clone(), &[5])
            .deliver_to(&ChatId::Numeric(5), "msg")
            .await;

        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 3 });
    }

    #[tokio::test]
    async fn test_client_error_is_final() {
        let transport = Arc::new(ScriptedTransport::new().script("5", vec![Step::Reply(404, "Not Found")]));

        let outcome = notifier(transport.clone(), &[5])
            .deliver_to(&ChatId::Numeric(5), "msg")
            .await;

        assert_eq!(
            outcome,
            DeliveryOutcome::Rejected { attempts: 1, reason: "HTTP 404: Not Found".to_string() }
        );
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_api_error_object_is_final() {
        let transport = Arc::new(ScriptedTransport::new().script(
            "5",
            vec![Step::Reply(200, r#"{"error":{"error_code":901,"error_msg":"Can't send messages for users without permission"}}"#)],
        ));

        let outcome = notifier(transport.clone(), &[5])
            .deliver_to(&ChatId::Numeric(5), "msg")
            .await;

        assert_eq!(
            outcome,
            DeliveryOutcome::Rejected {
                attempts: 1,
                reason: "VK API error 901 - Can't send messages for users without permission".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_exhausted_recipient_does_not_block_others() {
        let transport = Arc::new(ScriptedTransport::new().script(
            "1",
            (0..5).map(|_| Step::Fail("connection refused")).collect(),
        ));

        notifier(transport.clone(), &[1, 2]).deliver(Payload::Text("hi")).await;

        let peers: Vec<String> = transport
            .requests()
            .iter()
            .filter_map(|r| r.form_value("peer_id").map(str::to_string))
            .collect();
        assert_eq!(peers, vec!["1", "1", "1", "1", "1", "2"]);
    }

    #[test]
    fn test_garbled_body_is_rejected() {
        let reply = HttpReply { status: 200, body: "<html>".to_string() };
        assert!(matches!(classify_reply(&reply), Err(AttemptError::Rejected(_))));
    }
}
