//! Run-scoped label cache.
//!
//! Maps the uppercased label name to the provider's label id. The map is
//! fetched lazily on first use and is not invalidated during a run unless
//! `refresh` is called, so labels created by another process mid-run may
//! not be visible.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::ProviderError;
use crate::provider::MailProvider;

#[derive(Default)]
pub struct LabelCache {
    labels: Mutex<Option<HashMap<String, String>>>,
}

fn cache_key(name: &str) -> String {
    name.trim().to_uppercase()
}

impl LabelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-list labels from the provider and replace the cached map.
    pub async fn refresh(&self, provider: &dyn MailProvider) -> Result<(), ProviderError> {
        let fresh = fetch_labels(provider).await?;
        *self.labels.lock().await = Some(fresh);
        Ok(())
    }

    /// Resolve a label id by name (case-insensitive). `None` if the provider
    /// had no such label when the cache was populated.
    pub async fn label_id(
        &self,
        provider: &dyn MailProvider,
        name: &str,
    ) -> Result<Option<String>, ProviderError> {
        let mut guard = self.labels.lock().await;
        if guard.is_none() {
            *guard = Some(fetch_labels(provider).await?);
        }
        Ok(guard
            .as_ref()
            .and_then(|labels| labels.get(&cache_key(name)).cloned()))
    }

    /// Resolve a label id, creating the label on the provider if it is missing.
    pub async fn get_or_create(
        &self,
        provider: &dyn MailProvider,
        name: &str,
    ) -> Result<String, ProviderError> {
        let mut guard = self.labels.lock().await;
        if guard.is_none() {
            *guard = Some(fetch_labels(provider).await?);
        }
        let labels = guard.get_or_insert_with(HashMap::new);

        if let Some(id) = labels.get(&cache_key(name)) {
            return Ok(id.clone());
        }

        let created = provider.create_label(name.trim()).await?;
        info!(label = %created.name, id = %created.id, "Created label");
        labels.insert(cache_key(&created.name), created.id.clone());
        Ok(created.id)
    }
}

async fn fetch_labels(
    provider: &dyn MailProvider,
) -> Result<HashMap<String, String>, ProviderError> {
    let labels = provider.list_labels().await?;
    debug!(count = labels.len(), "Label cache populated");
    Ok(labels
        .into_iter()
        .map(|label| (cache_key(&label.name), label.id))
        .collect())
}
