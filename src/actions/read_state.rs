//! `mark_as_read` / `mark_as_unread`: toggle the provider's unread label.

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::actions::{
    ActionContext, ActionDescriptor, ActionExecutor, MARK_AS_READ, MARK_AS_UNREAD,
};
use crate::error::ActionError;
use crate::provider::model::UNREAD_LABEL;
use crate::store::Message;

pub struct MarkAsRead;

pub struct MarkAsUnread;

async fn set_read(
    ctx: &ActionContext<'_>,
    message: &mut Message,
    read: bool,
) -> Result<bool, ActionError> {
    let unread = [UNREAD_LABEL.to_string()];
    let (add, remove): (&[String], &[String]) = if read {
        (&[], &unread)
    } else {
        (&unread, &[])
    };

    let confirmed = ctx.provider.modify_labels(&message.id, add, remove).await?;
    if confirmed {
        message.is_read = read;
        message.updated_at = Utc::now();
        info!(message_id = %message.id, read, "Updated read state");
    }
    Ok(confirmed)
}

#[async_trait]
impl ActionExecutor for MarkAsRead {
    fn name(&self) -> &'static str {
        MARK_AS_READ
    }

    async fn execute(
        &self,
        ctx: &ActionContext<'_>,
        message: &mut Message,
        _descriptor: &ActionDescriptor,
    ) -> Result<bool, ActionError> {
        set_read(ctx, message, true).await
    }
}

#[async_trait]
impl ActionExecutor for MarkAsUnread {
    fn name(&self) -> &'static str {
        MARK_AS_UNREAD
    }

    async fn execute(
        &self,
        ctx: &ActionContext<'_>,
        message: &mut Message,
        _descriptor: &ActionDescriptor,
    ) -> Result<bool, ActionError> {
        set_read(ctx, message, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::LabelCache;
    use crate::testing::{FakeProvider, ModifyCall};

    fn unread_message() -> Message {
        Message::new("m1", "newsletter@co.com", "Weekly", "", Utc::now(), false)
    }

    #[tokio::test]
    async fn mark_as_read_removes_unread_then_updates_local() {
        let provider = FakeProvider::new();
        let labels = LabelCache::new();
        let ctx = ActionContext {
            provider: &provider,
            labels: &labels,
        };
        let mut msg = unread_message();

        let ok = MarkAsRead
            .execute(&ctx, &mut msg, &ActionDescriptor::new(MARK_AS_READ))
            .await
            .unwrap();

        assert!(ok);
        assert!(msg.is_read);
        assert_eq!(
            provider.modify_calls(),
            vec![ModifyCall {
                id: "m1".into(),
                add: vec![],
                remove: vec!["UNREAD".into()],
            }]
        );
    }

    #[tokio::test]
    async fn remote_failure_leaves_local_state() {
        let provider = FakeProvider::new().failing_modify();
        let labels = LabelCache::new();
        let ctx = ActionContext {
            provider: &provider,
            labels: &labels,
        };
        let mut msg = unread_message();
        let before = msg.clone();

        let result = MarkAsRead
            .execute(&ctx, &mut msg, &ActionDescriptor::new(MARK_AS_READ))
            .await;

        assert!(result.is_err());
        assert_eq!(msg, before);
    }

    #[tokio::test]
    async fn mark_as_unread_adds_unread() {
        let provider = FakeProvider::new();
        let labels = LabelCache::new();
        let ctx = ActionContext {
            provider: &provider,
            labels: &labels,
        };
        let mut msg = unread_message();
        msg.is_read = true;

        let ok = MarkAsUnread
            .execute(&ctx, &mut msg, &ActionDescriptor::new(MARK_AS_UNREAD))
            .await
            .unwrap();

        assert!(ok);
        assert!(!msg.is_read);
        assert_eq!(provider.modify_calls()[0].add, vec!["UNREAD".to_string()]);
    }

    #[tokio::test]
    async fn mark_as_unread_remote_failure_leaves_local_state() {
        let provider = FakeProvider::new().failing_modify();
        let labels = LabelCache::new();
        let ctx = ActionContext {
            provider: &provider,
            labels: &labels,
        };
        let mut msg = unread_message();
        msg.is_read = true;
        let before = msg.clone();

        let result = MarkAsUnread
            .execute(&ctx, &mut msg, &ActionDescriptor::new(MARK_AS_UNREAD))
            .await;

        assert!(result.is_err());
        assert_eq!(msg, before);
        assert!(msg.is_read);
    }
}
