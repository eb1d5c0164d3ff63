//! In-process fakes shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};

use crate::error::{DatabaseError, ProviderError};
use crate::provider::model::{Header, MessagePart, PartBody};
use crate::provider::{FullMessage, Label, MailProvider, MessageList, MessageRef};
use crate::store::{LibSqlBackend, MailStore, Message};

/// Build a provider message with headers, a plain body and label ids.
pub fn full_message(
    id: &str,
    from: &str,
    subject: &str,
    body: &str,
    received_at: DateTime<Utc>,
    unread: bool,
) -> FullMessage {
    FullMessage {
        id: id.to_string(),
        thread_id: id.to_string(),
        label_ids: if unread {
            vec!["INBOX".into(), "UNREAD".into()]
        } else {
            vec!["INBOX".into()]
        },
        internal_date: Some(received_at.timestamp_millis().to_string()),
        payload: Some(MessagePart {
            mime_type: "text/plain".into(),
            headers: vec![
                Header {
                    name: "From".into(),
                    value: from.into(),
                },
                Header {
                    name: "Subject".into(),
                    value: subject.into(),
                },
            ],
            body: Some(PartBody {
                data: Some(URL_SAFE_NO_PAD.encode(body)),
                size: body.len() as u64,
            }),
            parts: Vec::new(),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyCall {
    pub id: String,
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

#[derive(Default)]
struct ProviderState {
    order: Vec<String>,
    messages: HashMap<String, FullMessage>,
    labels: Vec<Label>,
    created: Vec<String>,
    modify_calls: Vec<ModifyCall>,
    queries: Vec<Option<String>>,
    missing: HashSet<String>,
    fail_modify: bool,
    fail_create_label: bool,
}

/// Scriptable `MailProvider`. Listing pages through messages in insertion
/// order using the offset as the page token.
#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<ProviderState>,
    list_label_calls: AtomicUsize,
    page_size: Option<usize>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(self, id: &str, name: &str) -> Self {
        self.add_label(id, name);
        self
    }

    pub fn with_message(self, message: FullMessage) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.order.push(message.id.clone());
            state.messages.insert(message.id.clone(), message);
        }
        self
    }

    /// A listed id whose `get_message` returns 404.
    pub fn with_missing(self, id: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.order.push(id.to_string());
            state.missing.insert(id.to_string());
        }
        self
    }

    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn failing_modify(self) -> Self {
        self.state.lock().unwrap().fail_modify = true;
        self
    }

    pub fn failing_create_label(self) -> Self {
        self.state.lock().unwrap().fail_create_label = true;
        self
    }

    pub fn add_label(&self, id: &str, name: &str) {
        self.state.lock().unwrap().labels.push(Label {
            id: id.to_string(),
            name: name.to_string(),
            label_type: Some("user".into()),
        });
    }

    pub fn list_label_calls(&self) -> usize {
        self.list_label_calls.load(Ordering::SeqCst)
    }

    pub fn created_labels(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn modify_calls(&self) -> Vec<ModifyCall> {
        self.state.lock().unwrap().modify_calls.clone()
    }

    pub fn queries(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().queries.clone()
    }
}

fn not_found(operation: &str) -> ProviderError {
    ProviderError::Permanent {
        operation: operation.to_string(),
        status: Some(404),
        reason: "Not Found".into(),
    }
}

#[async_trait]
impl MailProvider for FakeProvider {
    async fn list_messages(
        &self,
        query: Option<&str>,
        page_token: Option<&str>,
        max_results: usize,
    ) -> Result<MessageList, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.queries.push(query.map(str::to_string));

        let offset = page_token.and_then(|t| t.parse::<usize>().ok()).unwrap_or(0);
        let size = self.page_size.unwrap_or(max_results).min(max_results);
        let end = (offset + size).min(state.order.len());
        let messages = state.order[offset..end]
            .iter()
            .map(|id| MessageRef {
                id: id.clone(),
                thread_id: id.clone(),
            })
            .collect();

        Ok(MessageList {
            messages,
            next_page_token: (end < state.order.len()).then(|| end.to_string()),
            result_size_estimate: Some(state.order.len() as i64),
        })
    }

    async fn get_message(&self, id: &str) -> Result<FullMessage, ProviderError> {
        let state = self.state.lock().unwrap();
        if state.missing.contains(id) {
            return Err(not_found("get_message"));
        }
        state
            .messages
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("get_message"))
    }

    async fn modify_labels(
        &self,
        id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<bool, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.modify_calls.push(ModifyCall {
            id: id.to_string(),
            add: add.to_vec(),
            remove: remove.to_vec(),
        });
        if state.fail_modify {
            return Err(ProviderError::Permanent {
                operation: "modify_labels".into(),
                status: Some(400),
                reason: "Bad Request".into(),
            });
        }
        Ok(true)
    }

    async fn list_labels(&self) -> Result<Vec<Label>, ProviderError> {
        self.list_label_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().unwrap().labels.clone())
    }

    async fn create_label(&self, name: &str) -> Result<Label, ProviderError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create_label {
            return Err(ProviderError::Permanent {
                operation: "create_label".into(),
                status: Some(403),
                reason: "Forbidden".into(),
            });
        }
        state.created.push(name.to_string());
        let label = Label {
            id: format!("Label_{}", state.labels.len() + 1),
            name: name.to_string(),
            label_type: Some("user".into()),
        };
        state.labels.push(label.clone());
        Ok(label)
    }
}

/// In-memory libSQL store that can be told to fail a specific upsert call.
pub struct FakeStore {
    inner: LibSqlBackend,
    upsert_calls: AtomicUsize,
    fail_upsert_call: Option<usize>,
    fail_save: bool,
}

impl FakeStore {
    pub async fn new() -> Self {
        Self {
            inner: LibSqlBackend::new_memory()
                .await
                .expect("in-memory database"),
            upsert_calls: AtomicUsize::new(0),
            fail_upsert_call: None,
            fail_save: false,
        }
    }

    /// Fail the `n`th (1-based) call to `upsert_messages`.
    pub fn failing_upsert(mut self, n: usize) -> Self {
        self.fail_upsert_call = Some(n);
        self
    }

    pub fn failing_save(mut self) -> Self {
        self.fail_save = true;
        self
    }
}

#[async_trait]
impl MailStore for FakeStore {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        self.inner.init_schema().await
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        self.inner.health_check().await
    }

    async fn upsert_messages(&self, messages: &[Message]) -> Result<(), DatabaseError> {
        let call = self.upsert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_upsert_call == Some(call) {
            return Err(DatabaseError::Transaction("commit failed".into()));
        }
        self.inner.upsert_messages(messages).await
    }

    async fn latest_received_at(&self) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        self.inner.latest_received_at().await
    }

    async fn get_unprocessed(&self, limit: usize) -> Result<Vec<Message>, DatabaseError> {
        self.inner.get_unprocessed(limit).await
    }

    async fn get_message(&self, id: &str) -> Result<Option<Message>, DatabaseError> {
        self.inner.get_message(id).await
    }

    async fn save_processing_results(&self, messages: &[Message]) -> Result<(), DatabaseError> {
        if self.fail_save {
            return Err(DatabaseError::Transaction("commit failed".into()));
        }
        self.inner.save_processing_results(messages).await
    }
}
