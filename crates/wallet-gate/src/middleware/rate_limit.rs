//! Fixed-window rate limiting middleware.
//!
//! One layer per policy. The layer counts the request, rejects it with 429
//! when over budget, and otherwise runs it and settles the count from the
//! response status. `RateLimit-Limit`, `RateLimit-Remaining` and
//! `RateLimit-Reset` are set on every response the policy governs.

use crate::domain::error::GateError;
use crate::domain::identity::{ClientIp, RequestIdentity};
use crate::domain::rate_limit::{KeySource, RateDecision, RateLimiter};
use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower::{Layer, Service};
use tracing::{debug, warn};

pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Rate limit layer
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
}

impl RateLimitLayer {
    pub fn new(limiter: RateLimiter) -> Self {
        Self {
            limiter: Arc::new(limiter),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: Arc::clone(&self.limiter),
        }
    }
}

/// Rate limit service
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let limiter = Arc::clone(&self.limiter);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let client_ip = req.extensions().get::<ClientIp>().map(|c| c.0);
            let wallet = req
                .extensions()
                .get::<RequestIdentity>()
                .map(|identity| identity.address);
            let policy = limiter.policy().kind;

            let checked = limiter
                .check(KeySource {
                    wallet: wallet.as_ref(),
                    client_ip,
                })
                .await;

            let (decision, ticket) = match checked {
                Ok(Some(pair)) => pair,
                Ok(None) => return inner.call(req).await,
                Err(e) => {
                    warn!(policy = %policy, error = %e, "Rate-limit store failure");
                    return Ok(GateError::from(e).into_response());
                }
            };

            if !decision.allowed {
                warn!(
                    policy = %policy,
                    ip = ?client_ip,
                    path = %req.uri().path(),
                    "Request rejected by rate limiter"
                );
                let mut response = GateError::RateExceeded {
                    retry_after_secs: decision.retry_after_secs(),
                }
                .into_response();
                apply_headers(response.headers_mut(), &decision);
                return Ok(response);
            }

            let mut response = inner.call(req).await?;

            let success = response.status().as_u16() < 400;
            if let Err(e) = limiter.settle(ticket, success).await {
                warn!(policy = %policy, error = %e, "Failed to settle rate-limit count");
            }
            debug!(policy = %policy, remaining = decision.remaining, success, "Rate limit settled");

            apply_headers(response.headers_mut(), &decision);
            Ok(response)
        })
    }
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(RATE_LIMIT_RESET, HeaderValue::from(decision.reset_after_secs));
}
