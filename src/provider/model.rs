//! Gmail REST wire types and the field extraction used by ingestion.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label id the provider attaches to unread messages.
pub const UNREAD_LABEL: &str = "UNREAD";

/// Gmail emits base64url both with and without padding.
const BODY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct MessageRef {
    pub id: String,
    #[serde(rename = "threadId", default)]
    pub thread_id: String,
}

/// One page of `messages.list`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    #[serde(rename = "nextPageToken", default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    #[serde(rename = "resultSizeEstimate", default, skip_serializing_if = "Option::is_none")]
    pub result_size_estimate: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessagePart {
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<PartBody>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<MessagePart>,
}

/// `messages.get?format=full`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FullMessage {
    pub id: String,
    #[serde(rename = "threadId", default)]
    pub thread_id: String,
    #[serde(rename = "labelIds", default)]
    pub label_ids: Vec<String>,
    #[serde(rename = "internalDate", default, skip_serializing_if = "Option::is_none")]
    pub internal_date: Option<String>,
    #[serde(default)]
    pub payload: Option<MessagePart>,
}

impl FullMessage {
    /// First header value with this name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Plain-text body: the direct payload body when present, otherwise the
    /// first `text/plain` part in the multipart tree. Undecodable data
    /// yields an empty string.
    pub fn plain_text_body(&self) -> String {
        let Some(payload) = self.payload.as_ref() else {
            return String::new();
        };

        let data = direct_body(payload).or_else(|| first_plain_part(&payload.parts));
        data.map(decode_body).unwrap_or_default()
    }

    /// Read unless the provider still carries the unread marker.
    pub fn is_read(&self) -> bool {
        !self.label_ids.iter().any(|l| l == UNREAD_LABEL)
    }

    /// `internalDate` (epoch millis) as a UTC instant; now if missing or garbled.
    pub fn received_at(&self) -> DateTime<Utc> {
        self.internal_date
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now)
    }
}

fn direct_body(part: &MessagePart) -> Option<&str> {
    part.body
        .as_ref()
        .and_then(|b| b.data.as_deref())
        .filter(|d| !d.is_empty())
}

fn first_plain_part(parts: &[MessagePart]) -> Option<&str> {
    for part in parts {
        if part.mime_type == "text/plain"
            && let Some(data) = direct_body(part)
        {
            return Some(data);
        }
        if let Some(data) = first_plain_part(&part.parts) {
            return Some(data);
        }
    }
    None
}

fn decode_body(data: &str) -> String {
    match BODY_ENGINE.decode(data.trim()) {
        Ok(bytes) => String::from_utf8(bytes).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Body is not valid UTF-8, storing empty body");
            String::new()
        }),
        Err(e) => {
            tracing::debug!(error = %e, "Failed to decode body, storing empty body");
            String::new()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Label {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub label_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LabelList {
    #[serde(default)]
    pub labels: Vec<Label>,
}
