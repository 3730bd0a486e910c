//! HTTP server implementation.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::{rate_limit, RateLimitState};
use crate::error::{LimiterError, Result};

/// HTTP server fronted by the per-client rate limiter.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Rate limit middleware state
    state: RateLimitState,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, state: RateLimitState) -> Self {
        Self { addr, state }
    }

    /// Build the application router with the rate limit layer applied.
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        let app = self.router();

        info!(addr = %local_addr, "Starting HTTP server with graceful shutdown");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            LimiterError::Server(e.to_string())
        })
    }
}

/// Application routes behind the rate limiter.
pub fn router(state: RateLimitState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit))
        .with_state(state)
}

async fn index() -> &'static str {
    "Gratitude Jar"
}

async fn health(State(state): State<RateLimitState>) -> Json<Value> {
    let registry = state.registry();
    Json(json!({
        "status": "ok",
        "buckets": registry.len(),
        "rate": registry.rate(),
        "capacity": registry.capacity(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::RateLimiterRegistry;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state(capacity: f64) -> RateLimitState {
        let registry = Arc::new(RateLimiterRegistry::new(1.0, capacity).unwrap());
        RateLimitState::new(registry).with_exempt_prefixes(["/static/"])
    }

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let _server = HttpServer::new(addr, test_state(20.0));
    }

    #[tokio::test]
    async fn test_health_reports_bucket_count() {
        let app = router(test_state(20.0));

        let request = Request::builder()
            .uri("/health")
            .header("x-forwarded-for", "203.0.113.5")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["buckets"], 1);
        assert_eq!(health["capacity"], 20.0);
    }

    #[tokio::test]
    async fn test_router_enforces_limit() {
        let app = router(test_state(1.0));

        let request = || {
            Request::builder()
                .uri("/")
                .header("x-real-ip", "203.0.113.5")
                .body(Body::empty())
                .unwrap()
        };

        let first = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(request()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_serve_with_immediate_shutdown() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = HttpServer::new(addr, test_state(20.0));

        let result = server.serve_with_shutdown(async {}).await;
        assert!(result.is_ok());
    }
}
