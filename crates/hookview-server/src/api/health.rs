use crate::api::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

const STATUS_OK: &str = "ok";

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub status: &'static str,
    pub timestamp: String,
    pub webhook_count: usize,
    pub namespaces: Vec<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceHealth {
    pub status: &'static str,
    pub timestamp: String,
    pub namespace: String,
    pub webhook_count: usize,
}

fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// GET /health
pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: STATUS_OK,
        timestamp: timestamp(Utc::now()),
        webhook_count: state.store.count(None),
        namespaces: state.store.namespaces().into_iter().collect(),
    })
}

// GET /health/{namespace}
pub async fn namespace_health(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Json<NamespaceHealth> {
    let webhook_count = state.store.count(Some(&namespace));
    Json(NamespaceHealth {
        status: STATUS_OK,
        timestamp: timestamp(Utc::now()),
        namespace,
        webhook_count,
    })
}
