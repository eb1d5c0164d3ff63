//! Retry policy for provider calls.
//!
//! Only transient failures (rate limiting, server unavailable) are retried.
//! The delay starts at `base_delay` and doubles on every retry. Permanent
//! errors surface on the first attempt; running out of attempts yields
//! `ProviderError::RetriesExhausted`.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::ProviderError;
use crate::provider::{FullMessage, Label, MailProvider, MessageList};

/// Attempt budget and backoff for one class of remote call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }

    /// Run `call` until it succeeds, fails permanently, or the budget runs out.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 1;
        let mut waited = Duration::ZERO;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) if attempt >= self.max_attempts => {
                    return Err(ProviderError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        waited,
                        last: Box::new(err),
                    });
                }
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient provider error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    waited += delay;
                    attempt += 1;
                }
            }
        }
    }
}

/// A `MailProvider` whose every call goes through a `RetryPolicy`.
pub struct RetryingProvider<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: MailProvider> RetryingProvider<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<P: MailProvider> MailProvider for RetryingProvider<P> {
    async fn list_messages(
        &self,
        query: Option<&str>,
        page_token: Option<&str>,
        max_results: usize,
    ) -> Result<MessageList, ProviderError> {
        self.policy
            .run("list_messages", move || {
                self.inner.list_messages(query, page_token, max_results)
            })
            .await
    }

    async fn get_message(&self, id: &str) -> Result<FullMessage, ProviderError> {
        self.policy
            .run("get_message", move || self.inner.get_message(id))
            .await
    }

    async fn modify_labels(
        &self,
        id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<bool, ProviderError> {
        self.policy
            .run("modify_labels", move || self.inner.modify_labels(id, add, remove))
            .await
    }

    async fn list_labels(&self) -> Result<Vec<Label>, ProviderError> {
        self.policy
            .run("list_labels", move || self.inner.list_labels())
            .await
    }

    async fn create_label(&self, name: &str) -> Result<Label, ProviderError> {
        self.policy
            .run("create_label", move || self.inner.create_label(name))
            .await
    }
}
