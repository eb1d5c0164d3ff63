//! Rule processing over unprocessed mirrored messages.
//!
//! Each message is checked against every rule in document order and all
//! matching rules' actions run. The message is then marked processed, unless
//! evaluation panicked, in which case it stays unprocessed for the next run.
//! Actions already executed for such a message are not undone. The whole
//! pass is persisted in one transaction at the end.

use std::fmt;
use std::panic::AssertUnwindSafe;

use chrono::Utc;
use futures::FutureExt;
use tracing::{error, info, warn};

use crate::actions::{ActionContext, ActionDispatcher, ActionRegistry};
use crate::error::Result;
use crate::rules::{Rule, RuleLoader};
use crate::store::{MailStore, Message};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingStats {
    pub processed: usize,
    pub matched: usize,
    pub actions_executed: usize,
    pub actions_succeeded: usize,
    pub actions_failed: usize,
}

impl fmt::Display for ProcessingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} matched={} actions_executed={} succeeded={} failed={}",
            self.processed,
            self.matched,
            self.actions_executed,
            self.actions_succeeded,
            self.actions_failed
        )
    }
}

pub struct RuleProcessor<'a> {
    store: &'a dyn MailStore,
    registry: &'a ActionRegistry,
    ctx: ActionContext<'a>,
    loader: RuleLoader,
    batch_size: usize,
}

impl<'a> RuleProcessor<'a> {
    pub fn new(
        store: &'a dyn MailStore,
        registry: &'a ActionRegistry,
        ctx: ActionContext<'a>,
        loader: RuleLoader,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            registry,
            ctx,
            loader,
            batch_size,
        }
    }

    /// One processing pass. Fails on a malformed rule document or when the
    /// pass cannot be persisted.
    pub async fn run(&self) -> Result<ProcessingStats> {
        let rules = self.loader.load(&self.ctx).await?;
        if rules.is_empty() {
            warn!("No rules configured, nothing to process");
            return Ok(ProcessingStats::default());
        }

        let mut messages = self.store.get_unprocessed(self.batch_size).await?;
        info!(count = messages.len(), "Found messages to process");

        let dispatcher = ActionDispatcher::new(self.registry, self.ctx);
        let mut stats = ProcessingStats::default();

        for message in messages.iter_mut() {
            stats.processed += 1;
            let outcome =
                AssertUnwindSafe(apply_rules(&dispatcher, rules, message, &mut stats))
                    .catch_unwind()
                    .await;

            match outcome {
                Ok(matched) => {
                    if matched {
                        stats.matched += 1;
                    }
                    message.processed = true;
                    message.updated_at = Utc::now();
                }
                Err(_) => {
                    error!(message_id = %message.id, "Rule evaluation panicked, leaving message unprocessed");
                }
            }
        }

        self.store.save_processing_results(&messages).await?;
        info!(%stats, "Processing complete");
        Ok(stats)
    }
}

async fn apply_rules(
    dispatcher: &ActionDispatcher<'_>,
    rules: &[Rule],
    message: &mut Message,
    stats: &mut ProcessingStats,
) -> bool {
    let mut matched_any = false;
    for rule in rules {
        if !rule.matches(message) {
            continue;
        }
        matched_any = true;
        info!(message_id = %message.id, rule = %rule.description, "Message matched rule");

        for descriptor in &rule.actions {
            stats.actions_executed += 1;
            if dispatcher.dispatch(message, descriptor).await {
                stats.actions_succeeded += 1;
            } else {
                stats.actions_failed += 1;
            }
        }
    }
    matched_any
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionDescriptor, ActionExecutor, MARK_AS_READ};
    use crate::error::{ActionError, Error};
    use crate::provider::LabelCache;
    use crate::testing::{FakeProvider, FakeStore};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Arc;

    const RULES: &str = r#"{"rules": [
        {"description": "Old newsletters",
         "predicate": "All",
         "conditions": [
            {"field": "sender", "predicate": "contains", "value": "newsletter"},
            {"field": "received_at", "predicate": "greater_than", "value": 7, "unit": "days"}
         ],
         "actions": [{"action": "mark_as_read"}]},
        {"description": "VIP",
         "predicate": "Any",
         "conditions": [
            {"field": "subject", "predicate": "contains", "value": ["urgent", "important"]},
            {"field": "sender", "predicate": "contains", "value": "@vip.com"}
         ],
         "actions": [{"action": "move_message", "destination": "VIP"}, {"action": "mark_as_unread"}]}
    ]}"#;

    async fn seeded_store() -> FakeStore {
        let store = FakeStore::new().await;
        let now = Utc::now();
        store
            .upsert_messages(&[
                Message::new("old", "newsletter@co.com", "Weekly", "", now - Duration::days(10), false),
                Message::new("new", "newsletter@co.com", "Weekly", "", now - Duration::days(3), false),
                Message::new("vip", "user@vip.com", "Lunch", "", now, true),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn processes_and_persists_pass() {
        let store = seeded_store().await;
        let provider = FakeProvider::new();
        let labels = LabelCache::new();
        let registry = ActionRegistry::with_builtins();
        let ctx = ActionContext {
            provider: &provider,
            labels: &labels,
        };

        let stats = RuleProcessor::new(&store, &registry, ctx, RuleLoader::from_json(RULES), 500)
            .run()
            .await
            .unwrap();

        assert_eq!(
            stats,
            ProcessingStats {
                processed: 3,
                matched: 2,
                actions_executed: 3,
                actions_succeeded: 3,
                actions_failed: 0,
            }
        );

        let old = store.get_message("old").await.unwrap().unwrap();
        assert!(old.is_read);
        assert!(old.processed);
        let new = store.get_message("new").await.unwrap().unwrap();
        assert!(!new.is_read);
        assert!(new.processed);
        let vip = store.get_message("vip").await.unwrap().unwrap();
        assert!(!vip.is_read);
        assert!(store.get_unprocessed(500).await.unwrap().is_empty());
        assert_eq!(provider.created_labels(), vec!["VIP".to_string()]);
    }

    #[tokio::test]
    async fn failed_actions_are_counted_and_message_still_processed() {
        let store = seeded_store().await;
        let provider = FakeProvider::new().failing_modify();
        let labels = LabelCache::new();
        let registry = ActionRegistry::with_builtins();
        let ctx = ActionContext {
            provider: &provider,
            labels: &labels,
        };

        let stats = RuleProcessor::new(&store, &registry, ctx, RuleLoader::from_json(RULES), 500)
            .run()
            .await
            .unwrap();

        assert_eq!(stats.actions_executed, 3);
        assert_eq!(stats.actions_failed, 3);
        let old = store.get_message("old").await.unwrap().unwrap();
        assert!(!old.is_read);
        assert!(old.processed);
    }

    #[tokio::test]
    async fn no_rules_leaves_messages_untouched() {
        let store = seeded_store().await;
        let provider = FakeProvider::new();
        let labels = LabelCache::new();
        let registry = ActionRegistry::with_builtins();
        let ctx = ActionContext {
            provider: &provider,
            labels: &labels,
        };

        let stats = RuleProcessor::new(
            &store,
            &registry,
            ctx,
            RuleLoader::from_json(r#"{"rules": []}"#),
            500,
        )
        .run()
        .await
        .unwrap();

        assert_eq!(stats, ProcessingStats::default());
        assert_eq!(store.get_unprocessed(500).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn malformed_document_fails_the_step() {
        let store = seeded_store().await;
        let provider = FakeProvider::new();
        let labels = LabelCache::new();
        let registry = ActionRegistry::with_builtins();
        let ctx = ActionContext {
            provider: &provider,
            labels: &labels,
        };

        let result = RuleProcessor::new(&store, &registry, ctx, RuleLoader::from_json("{"), 500)
            .run()
            .await;
        assert!(matches!(result, Err(Error::Rule(_))));
    }

    #[tokio::test]
    async fn save_failure_fails_the_step() {
        let store = seeded_store().await.failing_save();
        let provider = FakeProvider::new();
        let labels = LabelCache::new();
        let registry = ActionRegistry::with_builtins();
        let ctx = ActionContext {
            provider: &provider,
            labels: &labels,
        };

        let result = RuleProcessor::new(&store, &registry, ctx, RuleLoader::from_json(RULES), 500)
            .run()
            .await;
        assert!(matches!(result, Err(Error::Database(_))));
    }

    struct Exploding;

    #[async_trait]
    impl ActionExecutor for Exploding {
        fn name(&self) -> &'static str {
            MARK_AS_READ
        }

        async fn execute(
            &self,
            _ctx: &ActionContext<'_>,
            message: &mut Message,
            _descriptor: &ActionDescriptor,
        ) -> std::result::Result<bool, ActionError> {
            if message.id == "old" {
                panic!("boom");
            }
            Ok(true)
        }
    }

    #[tokio::test]
    async fn panic_leaves_only_that_message_unprocessed() {
        let store = seeded_store().await;
        let provider = FakeProvider::new();
        let labels = LabelCache::new();
        let mut registry = ActionRegistry::with_builtins();
        registry.register(Arc::new(Exploding));
        let ctx = ActionContext {
            provider: &provider,
            labels: &labels,
        };

        let stats = RuleProcessor::new(&store, &registry, ctx, RuleLoader::from_json(RULES), 500)
            .run()
            .await
            .unwrap();

        assert_eq!(stats.processed, 3);
        let unprocessed = store.get_unprocessed(500).await.unwrap();
        assert_eq!(unprocessed.len(), 1);
        assert_eq!(unprocessed[0].id, "old");
    }

    #[tokio::test]
    async fn batch_size_limits_the_pass() {
        let store = seeded_store().await;
        let provider = FakeProvider::new();
        let labels = LabelCache::new();
        let registry = ActionRegistry::with_builtins();
        let ctx = ActionContext {
            provider: &provider,
            labels: &labels,
        };

        let stats = RuleProcessor::new(&store, &registry, ctx, RuleLoader::from_json(RULES), 2)
            .run()
            .await
            .unwrap();

        assert_eq!(stats.processed, 2);
        assert_eq!(store.get_unprocessed(500).await.unwrap().len(), 1);
    }
}
