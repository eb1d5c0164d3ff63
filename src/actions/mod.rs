//! Actions applied to matched messages.
//!
//! Executors are looked up by name in an `ActionRegistry` built once per
//! run. Every executor changes the remote message first and only touches the
//! local record after the provider confirmed the change.

pub mod move_message;
pub mod read_state;

pub use move_message::MoveMessage;
pub use read_state::{MarkAsRead, MarkAsUnread};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::error::ActionError;
use crate::provider::{LabelCache, MailProvider};
use crate::store::Message;

pub const MARK_AS_READ: &str = "mark_as_read";
pub const MARK_AS_UNREAD: &str = "mark_as_unread";
pub const MOVE_MESSAGE: &str = "move_message";

/// One entry of a rule's `actions` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDescriptor {
    pub action: String,
    pub destination: Option<String>,
}

impl ActionDescriptor {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            destination: None,
        }
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }
}

/// Collaborators available to an executor.
#[derive(Clone, Copy)]
pub struct ActionContext<'a> {
    pub provider: &'a dyn MailProvider,
    pub labels: &'a LabelCache,
}

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Apply the action. `Ok(false)` means the provider declined the change.
    async fn execute(
        &self,
        ctx: &ActionContext<'_>,
        message: &mut Message,
        descriptor: &ActionDescriptor,
    ) -> Result<bool, ActionError>;
}

/// Name → executor table.
#[derive(Default)]
pub struct ActionRegistry {
    executors: HashMap<String, Arc<dyn ActionExecutor>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `mark_as_read`, `mark_as_unread` and `move_message`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MarkAsRead));
        registry.register(Arc::new(MarkAsUnread));
        registry.register(Arc::new(MoveMessage));
        registry
    }

    pub fn register(&mut self, executor: Arc<dyn ActionExecutor>) {
        let name = executor.name().to_string();
        debug!(action = %name, "Registered action");
        self.executors.insert(name, executor);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ActionExecutor>> {
        self.executors.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.executors.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Runs descriptors against messages. Never returns an error: failures are
/// logged and reported as `false`.
pub struct ActionDispatcher<'a> {
    registry: &'a ActionRegistry,
    ctx: ActionContext<'a>,
}

impl<'a> ActionDispatcher<'a> {
    pub fn new(registry: &'a ActionRegistry, ctx: ActionContext<'a>) -> Self {
        Self { registry, ctx }
    }

    pub async fn dispatch(&self, message: &mut Message, descriptor: &ActionDescriptor) -> bool {
        let Some(executor) = self.registry.get(&descriptor.action) else {
            let err = ActionError::UnknownAction(descriptor.action.clone());
            error!(message_id = %message.id, error = %err, "Action not dispatched");
            return false;
        };

        match executor.execute(&self.ctx, message, descriptor).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(
                    action = %descriptor.action,
                    message_id = %message.id,
                    "Provider did not confirm action"
                );
                false
            }
            Err(e) => {
                error!(
                    action = %descriptor.action,
                    message_id = %message.id,
                    error = %e,
                    "Action failed"
                );
                false
            }
        }
    }
}
