//! Request tracing middleware.
//!
//! Opens one span per request carrying a request id, echoed back to the
//! client as `X-Request-Id`.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    response::Response,
};
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::{info, info_span, warn, Instrument, Span};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// The id assigned to the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(pub Uuid);

/// Tracing layer that creates spans for each request
#[derive(Clone, Default)]
pub struct TracingLayer;

impl TracingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for TracingLayer {
    type Service = TracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TracingService { inner }
    }
}

/// Tracing service
#[derive(Clone)]
pub struct TracingService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for TracingService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();

        let request_id = Uuid::new_v4();
        req.extensions_mut().insert(RequestId(request_id));

        let span = info_span!(
            "http_request",
            request_id = %request_id,
            http.method = %req.method(),
            http.target = %req.uri().path(),
            http.status_code = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        );

        Box::pin(
            async move {
                let started = Instant::now();
                let result = inner.call(req).await;
                let latency_ms = started.elapsed().as_millis() as u64;

                let span = Span::current();
                span.record("latency_ms", latency_ms);

                match result {
                    Ok(mut response) => {
                        let status = response.status();
                        span.record("http.status_code", status.as_u16());
                        if status.is_server_error() {
                            warn!(status = status.as_u16(), latency_ms, "Request failed");
                        } else {
                            info!(status = status.as_u16(), latency_ms, "Request completed");
                        }
                        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                            response.headers_mut().insert(REQUEST_ID_HEADER, value);
                        }
                        Ok(response)
                    }
                    Err(e) => Err(e),
                }
            }
            .instrument(span),
        )
    }
}
