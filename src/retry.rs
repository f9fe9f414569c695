use std::fmt;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self { max_retries, retry_delay }
    }

    fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY)
    }
}

/// Why a single delivery attempt failed
#[derive(Debug)]
pub enum AttemptError {
    /// Network trouble or a server-side fault; worth another try
    Retryable(anyhow::Error),
    /// The platform refused the payload; trying again would not help
    Rejected(String),
}

/// What happened to one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Rejected { attempts: u32, reason: String },
    Exhausted { attempts: u32 },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryOutcome::Delivered { attempts } => write!(f, "delivered after {} attempt(s)", attempts),
            DeliveryOutcome::Rejected { attempts, reason } => {
                write!(f, "rejected after {} attempt(s): {}", attempts, reason)
            }
            DeliveryOutcome::Exhausted { attempts } => write!(f, "gave up after {} attempt(s)", attempts),
        }
    }
}

/// Run `attempt` until it succeeds, is rejected, or the policy runs out of attempts,
/// sleeping `retry_delay` between tries. Every failure is logged here; nothing is returned
/// as an error.
pub async fn run_with_retry<F, Fut>(
    policy: RetryPolicy,
    platform: &str,
    recipient: &str,
    mut attempt: F,
) -> DeliveryOutcome
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(), AttemptError>>,
{
    let max_attempts = policy.attempts();

    for n in 1..=max_attempts {
        tracing::debug!("Sending to {} (attempt {}): recipient={}", platform, n, recipient);

        match attempt(n).await {
            Ok(()) => {
                tracing::debug!("Message sent to {} recipient {} (attempt {})", platform, recipient, n);
                return DeliveryOutcome::Delivered { attempts: n };
            }
            Err(AttemptError::Rejected(reason)) => {
                tracing::warn!("{} rejected message for {}: {}", platform, recipient, reason);
                return DeliveryOutcome::Rejected { attempts: n, reason };
            }
            Err(AttemptError::Retryable(e)) => {
                tracing::warn!(
                    "Failed to send to {} recipient {} (attempt {}/{}): {:#}",
                    platform, recipient, n, max_attempts, e
                );
                if n < max_attempts {
                    tokio::time::sleep(policy.retry_delay).await;
                }
            }
        }
    }

    tracing::error!(
        "Giving up on {} recipient {} after {} attempts",
        platform, recipient, max_attempts
    );
    DeliveryOutcome::Exhausted { attempts: max_attempts }
}
