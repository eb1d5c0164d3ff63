//! Incremental fetch from the provider into the local mirror.
//!
//! The watermark is the newest `received_at` already stored. References are
//! listed page by page up to the configured cap, fetched in batches, and each
//! batch is committed in its own transaction.

use tracing::{debug, info, warn};

use crate::config::FetchConfig;
use crate::error::{ProviderError, Result};
use crate::provider::{FullMessage, MailProvider, MessageRef};
use crate::store::{MailStore, Message};

/// Provider limit for one `messages.list` page.
const MAX_PAGE_SIZE: usize = 500;

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// Map a provider message onto the mirrored record.
pub fn to_message(full: &FullMessage) -> Message {
    Message::new(
        full.id.clone(),
        full.header("From").unwrap_or_default(),
        full.header("Subject").unwrap_or_default(),
        full.plain_text_body(),
        full.received_at(),
        full.is_read(),
    )
}

pub struct IngestionPipeline<'a> {
    provider: &'a dyn MailProvider,
    store: &'a dyn MailStore,
    config: FetchConfig,
}

impl<'a> IngestionPipeline<'a> {
    pub fn new(provider: &'a dyn MailProvider, store: &'a dyn MailStore, config: FetchConfig) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    /// Fetch everything newer than the watermark. A listing failure aborts
    /// the run; per-message and per-batch failures are counted and skipped.
    pub async fn run(&self) -> Result<FetchReport> {
        let query = self
            .store
            .latest_received_at()
            .await?
            .map(|watermark| format!("after:{}", watermark.timestamp()));

        let refs = self.list_refs(query.as_deref()).await?;
        info!(count = refs.len(), query = ?query, "Listed messages to fetch");

        let mut report = FetchReport::default();
        let batch_size = self.config.batch_size.max(1);

        for (batch_idx, batch) in refs.chunks(batch_size).enumerate() {
            let mut messages = Vec::with_capacity(batch.len());
            for r in batch {
                match self.provider.get_message(&r.id).await {
                    Ok(full) => messages.push(to_message(&full)),
                    Err(e) => {
                        warn!(message_id = %r.id, error = %e, "Failed to fetch message, skipping");
                        report.failed += 1;
                    }
                }
            }

            if messages.is_empty() {
                continue;
            }

            match self.store.upsert_messages(&messages).await {
                Ok(()) => {
                    debug!(batch = batch_idx, count = messages.len(), "Committed batch");
                    report.succeeded += messages.len();
                }
                Err(e) => {
                    warn!(batch = batch_idx, count = messages.len(), error = %e, "Batch commit failed");
                    report.failed += messages.len();
                }
            }
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "Fetch complete"
        );
        Ok(report)
    }

    async fn list_refs(&self, query: Option<&str>) -> std::result::Result<Vec<MessageRef>, ProviderError> {
        let cap = self.config.max_results;
        let mut refs: Vec<MessageRef> = Vec::new();
        let mut page_token: Option<String> = None;

        while refs.len() < cap {
            let page_size = (cap - refs.len()).min(MAX_PAGE_SIZE);
            let page = self
                .provider
                .list_messages(query, page_token.as_deref(), page_size)
                .await?;

            refs.extend(page.messages);
            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        refs.truncate(cap);
        Ok(refs)
    }
}
