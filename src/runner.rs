//! Entry points used by the binary: schema setup, fetch step, process step.

use tracing::info;

use crate::actions::{ActionContext, ActionRegistry};
use crate::config::{Config, FetchConfig};
use crate::error::Result;
use crate::pipeline::{FetchReport, IngestionPipeline, ProcessingStats, RuleProcessor};
use crate::provider::{GmailClient, LabelCache, MailProvider, RetryPolicy, RetryingProvider};
use crate::rules::RuleLoader;
use crate::store::MailStore;

/// Gmail client wrapped in the configured retry policy.
pub fn gmail_provider(config: &Config) -> RetryingProvider<GmailClient> {
    let client = GmailClient::new(config.api_base.clone(), config.access_token.clone());
    RetryingProvider::new(client, RetryPolicy::from(config.retry.clone()))
}

pub async fn init_schema(store: &dyn MailStore) -> Result<()> {
    store.init_schema().await?;
    store.health_check().await?;
    info!("Database schema ready");
    Ok(())
}

/// Fetch new messages into the mirror.
pub async fn fetch_step(
    provider: &dyn MailProvider,
    store: &dyn MailStore,
    config: &FetchConfig,
) -> Result<FetchReport> {
    IngestionPipeline::new(provider, store, config.clone())
        .run()
        .await
}

/// Apply the rule set to unprocessed messages. Rules and labels are loaded
/// fresh for every call.
pub async fn process_step(
    provider: &dyn MailProvider,
    store: &dyn MailStore,
    rules: RuleLoader,
    batch_size: usize,
) -> Result<ProcessingStats> {
    let labels = LabelCache::new();
    let registry = ActionRegistry::with_builtins();
    let ctx = ActionContext {
        provider,
        labels: &labels,
    };

    RuleProcessor::new(store, &registry, ctx, rules, batch_size)
        .run()
        .await
}
