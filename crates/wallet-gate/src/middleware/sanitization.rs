//! Request normalization middleware.
//!
//! Strips markup from every query value and from every string in a JSON body
//! before routing, using the configured [`InputGuard`]. Bodies above the size
//! limit are rejected with 413 and malformed JSON with 400.

use crate::domain::error::GateError;
use crate::domain::sanitize::InputGuard;
use axum::{
    body::{to_bytes, Body},
    http::{header, uri::PathAndQuery, HeaderValue, Request, Uri},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower::{Layer, Service};
use tracing::{debug, warn};

/// Input sanitization layer
#[derive(Clone)]
pub struct InputGuardLayer {
    guard: Arc<InputGuard>,
    max_body_bytes: usize,
}

impl InputGuardLayer {
    pub fn new(guard: Arc<InputGuard>, max_body_bytes: usize) -> Self {
        Self {
            guard,
            max_body_bytes,
        }
    }
}

impl<S> Layer<S> for InputGuardLayer {
    type Service = InputGuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InputGuardService {
            inner,
            guard: Arc::clone(&self.guard),
            max_body_bytes: self.max_body_bytes,
        }
    }
}

/// Input sanitization service
#[derive(Clone)]
pub struct InputGuardService<S> {
    inner: S,
    guard: Arc<InputGuard>,
    max_body_bytes: usize,
}

impl<S> Service<Request<Body>> for InputGuardService<S>
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
        let guard = Arc::clone(&self.guard);
        let max_body_bytes = self.max_body_bytes;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match sanitize_request(req, &guard, max_body_bytes).await {
                Ok(req) => inner.call(req).await,
                Err(e) => Ok(e.into_response()),
            }
        })
    }
}

async fn sanitize_request(
    req: Request<Body>,
    guard: &InputGuard,
    max_body_bytes: usize,
) -> Result<Request<Body>, GateError> {
    let (mut parts, body) = req.into_parts();

    let declared_len = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared_len.is_some_and(|len| len > max_body_bytes) {
        warn!(limit = max_body_bytes, "Request body too large");
        return Err(GateError::PayloadTooLarge {
            limit: max_body_bytes,
        });
    }

    if let Some(query) = parts.uri.query() {
        if let Some(cleaned) = sanitize_query(guard, query) {
            parts.uri = replace_query(&parts.uri, &cleaned)?;
        }
    }

    let is_json = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("application/json"));
    if !is_json {
        return Ok(Request::from_parts(parts, body));
    }

    let bytes = to_bytes(body, max_body_bytes).await.map_err(|e| {
        warn!(limit = max_body_bytes, error = %e, "Failed to read request body");
        GateError::PayloadTooLarge {
            limit: max_body_bytes,
        }
    })?;
    if bytes.is_empty() {
        return Ok(Request::from_parts(parts, Body::empty()));
    }

    let mut value: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
        debug!(error = %e, "Malformed JSON body");
        GateError::Format("Malformed JSON body".into())
    })?;
    guard.sanitize_json(&mut value);

    let cleaned = serde_json::to_vec(&value).map_err(|e| GateError::Internal(e.to_string()))?;
    parts
        .headers
        .insert(header::CONTENT_LENGTH, HeaderValue::from(cleaned.len()));
    Ok(Request::from_parts(parts, Body::from(cleaned)))
}

/// Re-encoded query, or `None` when no decoded value changed.
fn sanitize_query(guard: &InputGuard, query: &str) -> Option<String> {
    let mut changed = false;
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let cleaned = guard.sanitize_query_value(&name, &value);
        changed |= cleaned != value;
        serializer.append_pair(&name, &cleaned);
    }
    changed.then(|| serializer.finish())
}

fn replace_query(uri: &Uri, query: &str) -> Result<Uri, GateError> {
    let path_and_query = if query.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), query)
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(
        PathAndQuery::try_from(path_and_query)
            .map_err(|_| GateError::Format("Malformed query string".into()))?,
    );
    Uri::from_parts(parts).map_err(|_| GateError::Format("Malformed query string".into()))
}
