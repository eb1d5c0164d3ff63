//! Gmail REST client: `MailProvider` over reqwest.
//!
//! Token lifecycle is handled elsewhere; this client only sends the bearer
//! token it was given. Status codes are classified here: 429 and 503 (and
//! connection-level failures) are transient, everything else is permanent.

use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::provider::MailProvider;
use crate::provider::model::{FullMessage, Label, LabelList, MessageList};

/// Gmail caps `maxResults` for `messages.list` at 500.
const MAX_PAGE_SIZE: usize = 500;

pub struct GmailClient {
    client: reqwest::Client,
    base_url: String,
    access_token: SecretString,
}

impl GmailClient {
    /// `base_url` is the per-user root, e.g.
    /// `https://gmail.googleapis.com/gmail/v1/users/me`.
    pub fn new(base_url: impl Into<String>, access_token: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<T, ProviderError> {
        let response = request
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(operation, status, body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                operation: operation.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Classify a non-success HTTP status.
pub fn status_error(operation: &str, status: StatusCode, body: String) -> ProviderError {
    let reason = if body.is_empty() {
        status.canonical_reason().unwrap_or("unknown").to_string()
    } else {
        body.chars().take(300).collect()
    };
    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
            ProviderError::Transient {
                operation: operation.to_string(),
                status: Some(status.as_u16()),
                reason,
            }
        }
        _ => ProviderError::Permanent {
            operation: operation.to_string(),
            status: Some(status.as_u16()),
            reason,
        },
    }
}

fn transport_error(operation: &str, err: reqwest::Error) -> ProviderError {
    if err.is_connect() || err.is_timeout() {
        ProviderError::Transient {
            operation: operation.to_string(),
            status: None,
            reason: err.to_string(),
        }
    } else {
        ProviderError::Permanent {
            operation: operation.to_string(),
            status: None,
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl MailProvider for GmailClient {
    async fn list_messages(
        &self,
        query: Option<&str>,
        page_token: Option<&str>,
        max_results: usize,
    ) -> Result<MessageList, ProviderError> {
        let mut params: Vec<(&str, String)> = vec![(
            "maxResults",
            max_results.clamp(1, MAX_PAGE_SIZE).to_string(),
        )];
        if let Some(q) = query {
            params.push(("q", q.to_string()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        debug!(query = ?query, page_token = ?page_token, "Listing messages");
        let request = self.client.get(self.url("messages")).query(&params);
        self.send("list_messages", request).await
    }

    async fn get_message(&self, id: &str) -> Result<FullMessage, ProviderError> {
        let request = self
            .client
            .get(self.url(&format!("messages/{id}")))
            .query(&[("format", "full")]);
        self.send("get_message", request).await
    }

    async fn modify_labels(
        &self,
        id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<bool, ProviderError> {
        let body = json!({
            "addLabelIds": add,
            "removeLabelIds": remove,
        });
        let request = self
            .client
            .post(self.url(&format!("messages/{id}/modify")))
            .json(&body);
        let _: serde_json::Value = self.send("modify_labels", request).await?;
        Ok(true)
    }

    async fn list_labels(&self) -> Result<Vec<Label>, ProviderError> {
        let request = self.client.get(self.url("labels"));
        let list: LabelList = self.send("list_labels", request).await?;
        Ok(list.labels)
    }

    async fn create_label(&self, name: &str) -> Result<Label, ProviderError> {
        let body = json!({
            "name": name,
            "labelListVisibility": "labelShow",
            "messageListVisibility": "show",
        });
        let request = self.client.post(self.url("labels")).json(&body);
        self.send("create_label", request).await
    }
}
