use crate::api::{
    ApiError, ApiResponse,
    payload::{collect_headers, decode_payload},
    state::AppState,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Method, Uri},
};
use hookview_storage::{DEFAULT_NAMESPACE, WebhookRecord};
use serde::Serialize;
use tracing::info;

pub const RECEIVED_MESSAGE: &str = "Webhook received successfully";
pub const CLEARED_ALL_MESSAGE: &str = "All webhook data cleared";

#[derive(Serialize, Debug)]
pub struct ReceivedWebhook {
    pub id: String,
}

/// A record tagged with the namespace it was received in.
#[derive(Serialize, Debug)]
pub struct NamespacedRecord {
    pub namespace: String,
    #[serde(flatten)]
    pub record: WebhookRecord,
}

// POST /api/webhooks/{namespace}, POST /webhook/{namespace}
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<ReceivedWebhook>>, ApiError> {
    accept(&state, &namespace, &method, &uri, &headers, &body)
}

// POST /webhook
pub async fn receive_default_webhook(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<ReceivedWebhook>>, ApiError> {
    accept(&state, DEFAULT_NAMESPACE, &method, &uri, &headers, &body)
}

fn accept(
    state: &AppState,
    namespace: &str,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Json<ApiResponse<ReceivedWebhook>>, ApiError> {
    let payload = decode_payload(headers, body)?;
    let request_path = uri
        .path_and_query()
        .map(|path| path.as_str())
        .unwrap_or_else(|| uri.path());

    let record = state.store.record(
        namespace,
        payload,
        collect_headers(headers),
        method.as_str(),
        request_path,
    );
    state.snapshots.request_save();

    info!(namespace = %namespace, id = %record.id(), "Webhook received");
    Ok(Json(ApiResponse::ok_with_message(
        ReceivedWebhook {
            id: record.id().to_string(),
        },
        RECEIVED_MESSAGE,
    )))
}

// GET /api/webhooks/{namespace}
pub async fn list_webhooks(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Json<Vec<WebhookRecord>> {
    Json(state.store.list(&namespace))
}

// GET /api/webhooks
pub async fn list_all_webhooks(State(state): State<AppState>) -> Json<Vec<NamespacedRecord>> {
    let records = state
        .store
        .list_all()
        .into_iter()
        .map(|(namespace, record)| NamespacedRecord { namespace, record })
        .collect();
    Json(records)
}

// DELETE /api/webhooks/{namespace}
pub async fn clear_webhooks(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Json<ApiResponse<()>> {
    state.store.clear(Some(&namespace));
    state.snapshots.request_save();
    info!(namespace = %namespace, "Webhook data cleared");
    Json(ApiResponse::message(format!(
        "Webhook data cleared for namespace: {}",
        namespace
    )))
}

// DELETE /api/webhooks
pub async fn clear_all_webhooks(State(state): State<AppState>) -> Json<ApiResponse<()>> {
    state.store.clear(None);
    state.snapshots.request_save();
    info!("All webhook data cleared");
    Json(ApiResponse::message(CLEARED_ALL_MESSAGE))
}
