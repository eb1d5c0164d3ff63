//! `MailStore` trait: single async interface for the local mirror.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;

/// A mirrored mail message.
///
/// The provider-assigned `id` is the primary key and the idempotency key for
/// ingestion. `processed` only ever moves from false to true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
    pub is_read: bool,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// A fresh, unprocessed message as produced by ingestion.
    pub fn new(
        id: impl Into<String>,
        sender: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        received_at: DateTime<Utc>,
        is_read: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            sender: sender.into(),
            subject: subject.into(),
            body: body.into(),
            received_at,
            is_read,
            processed: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Backend-agnostic storage for mirrored messages.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// Create or migrate the schema.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Cheap round-trip to verify the connection works.
    async fn health_check(&self) -> Result<(), DatabaseError>;

    /// Insert-or-update every message in one transaction.
    ///
    /// On id conflict only the mutable fields (sender, subject, body,
    /// received_at, is_read, updated_at) change; `processed` is preserved.
    /// Either the whole batch commits or nothing does.
    async fn upsert_messages(&self, messages: &[Message]) -> Result<(), DatabaseError>;

    /// Most recent `received_at` in the mirror, if any message exists.
    async fn latest_received_at(&self) -> Result<Option<DateTime<Utc>>, DatabaseError>;

    /// Up to `limit` messages with `processed = false`. No ordering guarantee.
    async fn get_unprocessed(&self, limit: usize) -> Result<Vec<Message>, DatabaseError>;

    /// Look up a single message by provider id.
    async fn get_message(&self, id: &str) -> Result<Option<Message>, DatabaseError>;

    /// Persist the read/processed flags of a processing pass in one transaction.
    async fn save_processing_results(&self, messages: &[Message]) -> Result<(), DatabaseError>;
}
