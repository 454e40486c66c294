use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use hookview_storage::DEFAULT_NAMESPACE;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::{ApiError, AppState};
use crate::client::client_identity;

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            max_requests: 100,
        }
    }
}

/// Requests are counted per namespace and client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub namespace: String,
    pub client: String,
}

impl RateLimitKey {
    pub fn new(namespace: impl Into<String>, client: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            client: client.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the oldest counted request leaves the window, set on rejection.
    pub retry_after: Option<Duration>,
}

impl RateLimitDecision {
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(self.remaining));
        if let Some(retry_after) = self.retry_after {
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            headers.insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
    }
}

/// Sliding-window request log per [`RateLimitKey`].
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    hits: Arc<Mutex<HashMap<RateLimitKey, VecDeque<Instant>>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            hits: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count a request for `key` if it fits in the current window.
    pub fn admit(&self, key: &RateLimitKey) -> RateLimitDecision {
        self.admit_at(key, Instant::now())
    }

    fn admit_at(&self, key: &RateLimitKey, now: Instant) -> RateLimitDecision {
        let limit = self.config.max_requests;
        let mut hits = self.hits.lock();
        let log = hits.entry(key.clone()).or_default();
        prune(log, now, self.config.window);

        if log.len() as u64 >= u64::from(limit) {
            let retry_after = log
                .front()
                .map(|oldest| self.config.window.saturating_sub(now.duration_since(*oldest)));
            return RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                retry_after,
            };
        }

        log.push_back(now);
        RateLimitDecision {
            allowed: true,
            limit,
            remaining: limit.saturating_sub(log.len() as u32),
            retry_after: None,
        }
    }

    /// Drop keys with no requests left in the window. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let window = self.config.window;
        let mut hits = self.hits.lock();
        let before = hits.len();
        hits.retain(|_, log| {
            prune(log, now, window);
            !log.is_empty()
        });
        before - hits.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.hits.lock().len()
    }

    /// Run [`RateLimiter::sweep`] every `period` until the runtime shuts down.
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let removed = limiter.sweep();
                if removed > 0 {
                    debug!(removed, "Swept idle rate limit keys");
                }
            }
        })
    }
}

fn prune(log: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(front) = log.front() {
        if now.duration_since(*front) >= window {
            log.pop_front();
        } else {
            break;
        }
    }
}

/// Rate limit receive routes that carry a `{namespace}` segment.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    req: Request,
    next: Next,
) -> Response {
    enforce(&state, namespace, req, next).await
}

/// Rate limit the legacy un-namespaced receive route.
pub async fn default_rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    enforce(&state, DEFAULT_NAMESPACE.to_string(), req, next).await
}

async fn enforce(state: &AppState, namespace: String, req: Request, next: Next) -> Response {
    let client = client_identity(req.headers(), req.extensions(), state.trust_proxy);
    let key = RateLimitKey::new(namespace, client);
    let decision = state.rate_limiter.admit(&key);

    if !decision.allowed {
        warn!(namespace = %key.namespace, client = %key.client, "Rate limit exceeded");
        return ApiError::RateLimited(decision).into_response();
    }

    let mut response = next.run(req).await;
    decision.apply_headers(response.headers_mut());
    response
}
