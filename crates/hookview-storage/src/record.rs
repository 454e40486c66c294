//! Webhook record types.
//!
//! A [`WebhookRecord`] is created once at receipt and never modified
//! afterwards; the store hands out clones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::time_utils::now_ms_precision;

const ID_SUFFIX_LEN: usize = 9;

/// Value of one request header.
///
/// Headers sent once are stored as a plain string; repeated headers keep
/// every value in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Single(String),
    Multiple(Vec<String>),
}

impl HeaderValue {
    /// Build a header value from all occurrences of a header.
    pub fn from_values(mut values: Vec<String>) -> Self {
        if values.len() == 1 {
            HeaderValue::Single(values.remove(0))
        } else {
            HeaderValue::Multiple(values)
        }
    }
}

/// Lowercased header name to value.
pub type Headers = BTreeMap<String, HeaderValue>;

/// One received webhook call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookRecord {
    id: String,
    #[serde(rename = "timestamp")]
    received_at: DateTime<Utc>,
    payload: Value,
    #[serde(default)]
    headers: Headers,
    #[serde(default)]
    method: String,
    #[serde(rename = "url", default)]
    request_path: String,
}

impl WebhookRecord {
    /// Create a record stamped with the current time and a fresh id.
    pub fn new(
        payload: Value,
        headers: Headers,
        method: impl Into<String>,
        request_path: impl Into<String>,
    ) -> Self {
        Self::new_at(now_ms_precision(), payload, headers, method, request_path)
    }

    /// Create a record with an explicit receipt time.
    pub fn new_at(
        received_at: DateTime<Utc>,
        payload: Value,
        headers: Headers,
        method: impl Into<String>,
        request_path: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_id(&received_at),
            received_at,
            payload,
            headers: lowercase_keys(headers),
            method: method.into(),
            request_path: request_path.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn request_path(&self) -> &str {
        &self.request_path
    }
}

/// Millisecond timestamp followed by a random lowercase alphanumeric suffix.
fn generate_id(received_at: &DateTime<Utc>) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}{}",
        received_at.timestamp_millis(),
        &random[..ID_SUFFIX_LEN]
    )
}

fn lowercase_keys(headers: Headers) -> Headers {
    headers
        .into_iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value))
        .collect()
}
