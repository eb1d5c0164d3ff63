//! `move_message`: add the destination label to the message.

use async_trait::async_trait;
use tracing::info;

use crate::actions::{ActionContext, ActionDescriptor, ActionExecutor, MOVE_MESSAGE};
use crate::error::ActionError;
use crate::store::Message;

pub struct MoveMessage;

#[async_trait]
impl ActionExecutor for MoveMessage {
    fn name(&self) -> &'static str {
        MOVE_MESSAGE
    }

    async fn execute(
        &self,
        ctx: &ActionContext<'_>,
        message: &mut Message,
        descriptor: &ActionDescriptor,
    ) -> Result<bool, ActionError> {
        let destination = descriptor
            .destination
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| ActionError::MissingParameter {
                action: MOVE_MESSAGE.into(),
                param: "destination".into(),
            })?;

        let label_id = ctx
            .labels
            .label_id(ctx.provider, destination)
            .await?
            .ok_or_else(|| ActionError::LabelUnresolved(destination.to_string()))?;

        let confirmed = ctx
            .provider
            .modify_labels(&message.id, &[label_id], &[])
            .await?;
        if confirmed {
            info!(message_id = %message.id, destination, "Moved message");
        }
        Ok(confirmed)
    }
}
