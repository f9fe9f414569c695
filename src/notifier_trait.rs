use crate::models::Ad;
use async_trait::async_trait;

/// What to deliver: an ad that still has to be rendered, or ready-made text.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    Ad(&'a Ad),
    Text(&'a str),
}

/// Trait that all messaging platforms must implement
///
/// Delivery is best effort: `deliver` never fails, every problem is logged and the
/// remaining recipients are still served.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns the name of the platform
    fn name(&self) -> &str;

    /// Sends the payload to every configured recipient, one after another
    async fn deliver(&self, payload: Payload<'_>);

    /// Returns whether this notifier is enabled
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Registry to manage all notifiers
pub struct NotifierRegistry {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotifierRegistry {
    pub fn new() -> Self {
        Self {
            notifiers: Vec::new(),
        }
    }

    pub fn register(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub async fn deliver_all(&self, payload: Payload<'_>) {
        for notifier in &self.notifiers {
            if !notifier.is_enabled() {
                continue;
            }

            tracing::info!("Delivering to {}", notifier.name());
            notifier.deliver(payload).await;
        }
    }

    pub fn list_notifiers(&self) -> Vec<String> {
        self.notifiers.iter()
            .map(|n| n.name().to_string())
            .collect()
    }
}

impl Default for NotifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}
