//! Request body and header decoding for the receive endpoints.

use axum::http::{HeaderMap, header};
use hookview_storage::{HeaderValue, Headers};
use serde_json::{Map, Value};

use crate::api::ApiError;

pub const EMPTY_BODY_MESSAGE: &str = "Request body cannot be empty";
pub const INVALID_JSON_MESSAGE: &str = "Invalid JSON payload";

/// Decode a webhook body into a JSON value.
///
/// Form-encoded bodies become an object of string fields; anything else is
/// parsed as JSON. Only non-empty objects and arrays are accepted.
pub fn decode_payload(headers: &HeaderMap, body: &[u8]) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::validation(EMPTY_BODY_MESSAGE));
    }

    let payload = if is_form_encoded(headers) {
        decode_form(body)
    } else {
        serde_json::from_slice(body).map_err(|_| ApiError::validation(INVALID_JSON_MESSAGE))?
    };

    if is_empty_payload(&payload) {
        return Err(ApiError::validation(EMPTY_BODY_MESSAGE));
    }
    Ok(payload)
}

fn is_form_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .trim()
                .to_ascii_lowercase()
                .starts_with("application/x-www-form-urlencoded")
        })
        .unwrap_or(false)
}

fn decode_form(body: &[u8]) -> Value {
    let fields: Map<String, Value> = url::form_urlencoded::parse(body)
        .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
        .collect();
    Value::Object(fields)
}

fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => true,
    }
}

/// Copy request headers, keeping every value of repeated headers.
pub fn collect_headers(headers: &HeaderMap) -> Headers {
    headers
        .keys()
        .map(|name| {
            let values = headers
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                .collect();
            (name.as_str().to_string(), HeaderValue::from_values(values))
        })
        .collect()
}
