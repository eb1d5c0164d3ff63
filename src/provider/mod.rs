//! Remote mail provider integration.
//!
//! - `MailProvider`: the five calls the engine needs from a provider
//! - `GmailClient`: Gmail REST implementation over reqwest
//! - `RetryingProvider`: wraps any provider with the transient-retry policy
//! - `LabelCache`: run-scoped label name → id lookup

pub mod gmail;
pub mod labels;
pub mod model;
pub mod retry;

pub use gmail::GmailClient;
pub use labels::LabelCache;
pub use model::{FullMessage, Label, MessageList, MessageRef};
pub use retry::{RetryPolicy, RetryingProvider};

use async_trait::async_trait;

use crate::error::ProviderError;

/// Provider calls consumed by ingestion, rule loading and actions.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// One page of message references, optionally filtered by a search query.
    async fn list_messages(
        &self,
        query: Option<&str>,
        page_token: Option<&str>,
        max_results: usize,
    ) -> Result<MessageList, ProviderError>;

    /// Full message including headers, body parts and label ids.
    async fn get_message(&self, id: &str) -> Result<FullMessage, ProviderError>;

    /// Add and/or remove label ids on a message. `Ok(true)` means the
    /// provider acknowledged the change.
    async fn modify_labels(
        &self,
        id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<bool, ProviderError>;

    async fn list_labels(&self) -> Result<Vec<Label>, ProviderError>;

    async fn create_label(&self, name: &str) -> Result<Label, ProviderError>;
}
