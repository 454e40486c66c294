// Client identity used as the rate limiting key.

use axum::extract::ConnectInfo;
use axum::http::{Extensions, HeaderMap};
use std::net::SocketAddr;

/// Resolve the client address of a request.
///
/// With `trust_proxy` set, `X-Forwarded-For` and then `X-Real-IP` name the
/// client. Otherwise only the socket peer address counts. Falls back to
/// `"unknown"`.
pub fn client_identity(headers: &HeaderMap, extensions: &Extensions, trust_proxy: bool) -> String {
    if trust_proxy && let Some(ip) = forwarded_client(headers) {
        return ip;
    }

    if let Some(ConnectInfo(addr)) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    "unknown".to_string()
}

fn forwarded_client(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded_for) = headers.get("x-forwarded-for")
        && let Ok(value) = forwarded_for.to_str()
    {
        // X-Forwarded-For can contain multiple IPs, take the first one
        let ip = value.split(',').next().unwrap_or("").trim();
        if !ip.is_empty() {
            return Some(ip.to_string());
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
        && !value.trim().is_empty()
    {
        return Some(value.trim().to_string());
    }

    None
}
