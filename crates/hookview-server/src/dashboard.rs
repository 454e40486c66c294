//! Server-rendered HTML pages for browsing received webhooks.

use crate::api::state::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, header},
    response::Html,
};
use chrono::SecondsFormat;
use hookview_storage::WebhookRecord;
use std::fmt::Write;

const TITLE: &str = "Webhook Demo";

/// Escape text for use in HTML element content and quoted attributes.
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Dashboard path of a namespace, with the name as one encoded segment.
fn namespace_path(namespace: &str) -> String {
    format!("/webhook/{}", urlencoding::encode(namespace))
}

// GET /
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let records = state.store.list_all();
    let mut list = String::new();
    for (namespace, record) in &records {
        render_record(&mut list, Some(namespace), record);
    }

    let body = format!(
        r#"<section class="summary">
  <div class="stat"><span class="stat-label">Total Webhooks</span><span class="stat-value">{count}</span></div>
  <div class="actions">
    <button id="refreshBtn" type="button">Refresh</button>
    <a class="button" href="/webhook">Namespaces</a>
  </div>
</section>
{records}"#,
        count = records.len(),
        records = record_list(&list),
    );
    Html(page(TITLE, &body))
}

// GET /webhook
pub async fn namespaces(State(state): State<AppState>, headers: HeaderMap) -> Html<String> {
    let base = base_url(&headers);
    let mut items = String::new();
    for namespace in state.store.namespaces() {
        let count = state.store.count(Some(&namespace));
        let href = escape_html(&namespace_path(&namespace));
        let name = escape_html(&namespace);
        let _ = writeln!(
            items,
            r#"  <li><a href="{href}">{name}</a> <span class="count">{count}</span></li>"#
        );
    }

    let list = if items.is_empty() {
        r#"<p class="empty">No namespaces yet. Send a webhook to create one.</p>"#.to_string()
    } else {
        format!("<ul class=\"namespaces\">\n{items}</ul>")
    };

    let body = format!(
        r#"<section class="summary">
  <div class="stat"><span class="stat-label">Total Webhooks</span><span class="stat-value">{count}</span></div>
  <p>POST JSON or form data to <code>{base}/webhook/&lt;namespace&gt;</code>.</p>
</section>
{list}"#,
        count = state.store.count(None),
        base = escape_html(&base),
    );
    Html(page(TITLE, &body))
}

// GET /webhook/{namespace}
pub async fn namespace(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    headers: HeaderMap,
) -> Html<String> {
    let records = state.store.list(&namespace);
    let mut list = String::new();
    for record in &records {
        render_record(&mut list, None, record);
    }

    let webhook_url = format!("{}{}", base_url(&headers), namespace_path(&namespace));
    let body = format!(
        r#"<section class="summary">
  <div class="stat"><span class="stat-label">Namespace</span><span class="stat-value">{namespace}</span></div>
  <div class="stat"><span class="stat-label">Total Webhooks</span><span class="stat-value">{count}</span></div>
  <div class="endpoint"><code id="webhookUrl">{url}</code> <button id="copyUrl" type="button">📋 Copy</button></div>
  <div class="actions">
    <button id="refreshBtn" type="button">Refresh</button>
    <button id="clearBtn" type="button" data-namespace="{namespace}">Clear</button>
    <a class="button" href="/webhook">All namespaces</a>
  </div>
</section>
{records}"#,
        namespace = escape_html(&namespace),
        count = records.len(),
        url = escape_html(&webhook_url),
        records = record_list(&list),
    );
    Html(page(&format!("{} - {}", TITLE, namespace), &body))
}

fn base_url(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{}", host)
}

fn record_list(items: &str) -> String {
    if items.is_empty() {
        r#"<p class="empty">No webhooks received yet.</p>"#.to_string()
    } else {
        format!("<ol class=\"webhooks\">\n{items}</ol>")
    }
}

fn render_record(out: &mut String, namespace: Option<&str>, record: &WebhookRecord) {
    let id = escape_html(record.id());
    let badge = namespace
        .map(|ns| format!(r#" <span class="namespace">{}</span>"#, escape_html(ns)))
        .unwrap_or_default();
    let payload = serde_json::to_string_pretty(record.payload()).unwrap_or_default();
    let headers = serde_json::to_string_pretty(record.headers()).unwrap_or_default();

    let _ = write!(
        out,
        r#"  <li class="webhook">
    <div class="webhook-meta">
      <span class="method">{method}</span> <code>{path}</code>{badge}
      <time>{time}</time>
      <button class="toggle-payload" type="button" data-id="{id}">Toggle</button>
    </div>
    <div class="webhook-body" id="payload-{id}">
      <h3>Payload</h3>
      <pre>{payload}</pre>
      <h3>Headers</h3>
      <pre>{headers}</pre>
      <p class="webhook-id">{id}</p>
    </div>
  </li>
"#,
        method = escape_html(record.method()),
        path = escape_html(record.request_path()),
        time = record
            .received_at()
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        payload = escape_html(&payload),
        headers = escape_html(&headers),
    );
}

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{title}</title>
  <link rel="stylesheet" href="/dashboard.css">
</head>
<body>
<header><h1><a href="/">{TITLE}</a></h1></header>
<main>
{body}
</main>
<script src="/dashboard.js"></script>
</body>
</html>
"#,
        title = escape_html(title),
    )
}
