//! Axum middleware enforcing per-client rate limits.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::client_ip::client_ip;
use crate::ratelimit::RateLimiterRegistry;

/// Body of a rejected request.
pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded";

/// Shared state for the rate limit middleware.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    /// The registry consulted for every non-exempt request
    registry: Arc<RateLimiterRegistry>,
    /// Path prefixes that bypass the limiter
    exempt_prefixes: Arc<[String]>,
}

impl RateLimitState {
    /// Create middleware state with no exempt paths.
    pub fn new(registry: Arc<RateLimiterRegistry>) -> Self {
        Self {
            registry,
            exempt_prefixes: Arc::from(Vec::new()),
        }
    }

    /// Builder-style: set the path prefixes that are never rate limited.
    pub fn with_exempt_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exempt_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Arc<RateLimiterRegistry> {
        &self.registry
    }

    /// Whether `path` bypasses the limiter.
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// Reject requests from clients that have exhausted their bucket.
///
/// Install with `axum::middleware::from_fn_with_state`. The peer address is
/// read from `ConnectInfo<SocketAddr>` when the server provides it.
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    if state.is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_ip(request.headers(), remote);

    let decision = state.registry.check(&key);
    if decision.allowed {
        next.run(request).await
    } else {
        debug!(client = %key, "Rejecting request");
        too_many_requests(decision.retry_after)
    }
}

/// Build a 429 response with a `Retry-After` header in whole seconds.
fn too_many_requests(retry_after: Option<Duration>) -> Response {
    let secs = retry_after
        .map(|d| d.as_secs_f64().ceil() as u64)
        .unwrap_or(1)
        .max(1);

    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, secs.to_string())],
        RATE_LIMIT_MESSAGE,
    )
        .into_response()
}
