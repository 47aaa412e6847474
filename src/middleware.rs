//! HTTP middleware adapter.
//!
//! Thin wrapper around a [`Strategy`]: derive an identity key and a
//! [`Limit`] from the inbound request, ask the strategy for a decision, and
//! translate the outcome into a transport response. No rate limiting logic
//! lives here.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::limiter::{Limit, Strategy};

/// Derives the identity key from a request.
pub type KeyFn = Arc<dyn Fn(&Request<Body>) -> String + Send + Sync>;

/// Picks the limit to enforce for a request and its derived key. Allows
/// dynamic limits per user, tier, or endpoint.
pub type LimitFn = Arc<dyn Fn(&Request<Body>, &str) -> Limit + Send + Sync>;

/// Shared state for the rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitState {
    strategy: Arc<dyn Strategy>,
    key_fn: KeyFn,
    limit_fn: LimitFn,
}

impl RateLimitState {
    /// Create middleware state around any strategy, with the default key
    /// derivation (client IP) and a fixed default limit of 10 requests per
    /// minute.
    pub fn new(strategy: Arc<dyn Strategy>) -> Self {
        Self {
            strategy,
            key_fn: Arc::new(client_ip_key),
            limit_fn: Arc::new(|_, _| Limit {
                rate: 10,
                period: Duration::from_secs(60),
                burst: 10,
            }),
        }
    }

    /// Replace the identity key derivation.
    pub fn with_key_fn(mut self, key_fn: KeyFn) -> Self {
        self.key_fn = key_fn;
        self
    }

    /// Replace the limit selection.
    pub fn with_limit_fn(mut self, limit_fn: LimitFn) -> Self {
        self.limit_fn = limit_fn;
        self
    }
}

/// Default key derivation: first `X-Forwarded-For` entry, falling back to
/// the peer address when the router was built with connect info.
fn client_ip_key(request: &Request<Body>) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rate limiting middleware for `axum::middleware::from_fn_with_state`.
///
/// Strategy failures are fail-closed: a backend outage yields 500, never a
/// silent admit. Denials yield 429 with `Retry-After` carrying the
/// strategy's reset hint rounded up to whole seconds.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let key = (state.key_fn)(&request);
    let limit = (state.limit_fn)(&request, &key);

    let decision = match state.strategy.allow(&key, limit).await {
        Ok(decision) => decision,
        Err(e) => {
            error!(key = %key, error = %e, "Rate limit check failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if decision.allowed {
        let mut response = next.run(request).await;
        response.headers_mut().insert(
            "X-RateLimit-Remaining",
            HeaderValue::from(decision.remaining),
        );
        response
    } else {
        let mut response =
            (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response();
        let headers = response.headers_mut();
        headers.insert("X-RateLimit-Remaining", HeaderValue::from(0u64));
        headers.insert(
            "Retry-After",
            HeaderValue::from(retry_after_secs(decision.reset_after)),
        );
        response
    }
}

/// `Retry-After` is whole seconds; round the reset hint up so clients never
/// retry early.
fn retry_after_secs(reset_after: Duration) -> u64 {
    let secs = reset_after.as_secs();
    if reset_after.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
