//! libSQL backend: async `MailStore` trait implementation.
//!
//! Supports local file and in-memory databases. Batch writes run inside a
//! single transaction so a failed batch leaves no partial rows behind.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{MailStore, Message};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file. Schema is not touched.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        info!(path = %path.display(), "Database opened");
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory database with the schema applied (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format: fixed-width RFC 3339 in UTC, so TEXT ordering
/// matches chronological ordering.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

const MESSAGE_COLUMNS: &str =
    "id, sender, subject, body, received_at, is_read, processed, created_at, updated_at";

/// Map a libsql Row to a Message. Column order matches `MESSAGE_COLUMNS`.
fn row_to_message(row: &libsql::Row) -> Result<Message, libsql::Error> {
    let received_str: String = row.get(4)?;
    let is_read: i64 = row.get(5)?;
    let processed: i64 = row.get(6)?;
    let created_str: String = row.get(7)?;
    let updated_str: String = row.get(8)?;

    Ok(Message {
        id: row.get(0)?,
        sender: row.get(1)?,
        subject: row.get(2)?,
        body: row.get::<String>(3).unwrap_or_default(),
        received_at: parse_datetime(&received_str),
        is_read: is_read != 0,
        processed: processed != 0,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

async fn upsert_one(conn: &Connection, message: &Message) -> Result<(), DatabaseError> {
    let now = format_datetime(&Utc::now());
    conn.execute(
        "INSERT INTO messages (id, sender, subject, body, received_at, is_read, processed,
            created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
         ON CONFLICT(id) DO UPDATE SET
            sender = excluded.sender,
            subject = excluded.subject,
            body = excluded.body,
            received_at = excluded.received_at,
            is_read = excluded.is_read,
            updated_at = excluded.updated_at",
        params![
            message.id.as_str(),
            message.sender.as_str(),
            message.subject.as_str(),
            message.body.as_str(),
            format_datetime(&message.received_at),
            i64::from(message.is_read),
            i64::from(message.processed),
            now,
        ],
    )
    .await
    .map_err(|e| DatabaseError::Query(format!("upsert message {}: {e}", message.id)))?;
    Ok(())
}

async fn save_flags(conn: &Connection, message: &Message) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE messages SET is_read = ?1, processed = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            i64::from(message.is_read),
            i64::from(message.processed),
            format_datetime(&Utc::now()),
            message.id.as_str(),
        ],
    )
    .await
    .map_err(|e| DatabaseError::Query(format!("save flags for {}: {e}", message.id)))?;
    Ok(())
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl MailStore for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT 1", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("health_check: {e}")))?;
        rows.next()
            .await
            .map_err(|e| DatabaseError::Query(format!("health_check: {e}")))?;
        Ok(())
    }

    async fn upsert_messages(&self, messages: &[Message]) -> Result<(), DatabaseError> {
        if messages.is_empty() {
            return Ok(());
        }

        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Transaction(format!("begin: {e}")))?;

        for message in messages {
            if let Err(e) = upsert_one(&tx, message).await {
                if let Err(rb) = tx.rollback().await {
                    warn!(error = %rb, "Rollback after failed upsert also failed");
                }
                return Err(e);
            }
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Transaction(format!("commit: {e}")))?;

        debug!(count = messages.len(), "Message batch upserted");
        Ok(())
    }

    async fn latest_received_at(&self) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT MAX(received_at) FROM messages", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("latest_received_at: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let latest: Option<String> = row.get(0).ok();
                Ok(latest.map(|s| parse_datetime(&s)))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("latest_received_at: {e}"))),
        }
    }

    async fn get_unprocessed(&self, limit: usize) -> Result<Vec<Message>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE processed = 0 LIMIT ?1"),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_unprocessed: {e}")))?;

        let mut messages = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_message(&row) {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    warn!("Skipping message row: {e}");
                }
            }
        }
        Ok(messages)
    }

    async fn get_message(&self, id: &str) -> Result<Option<Message>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_message: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let msg = row_to_message(&row)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                Ok(Some(msg))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_message: {e}"))),
        }
    }

    async fn save_processing_results(&self, messages: &[Message]) -> Result<(), DatabaseError> {
        if messages.is_empty() {
            return Ok(());
        }

        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Transaction(format!("begin: {e}")))?;

        for message in messages {
            if let Err(e) = save_flags(&tx, message).await {
                if let Err(rb) = tx.rollback().await {
                    warn!(error = %rb, "Rollback after failed flag update also failed");
                }
                return Err(e);
            }
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Transaction(format!("commit: {e}")))?;

        debug!(count = messages.len(), "Processing results saved");
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
