//! Error exposure and panic conversion.
//!
//! [`GateError::Internal`] responses carry their detail in an
//! [`InternalDetail`] extension. [`ErrorExposureLayer`] copies it into the
//! body's `details` field in development mode and drops it otherwise.

use crate::domain::config::RunMode;
use crate::domain::error::{ErrorBody, GateError, InternalDetail};
use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
    Json,
};
use std::any::Any;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::error;

/// Error exposure layer
#[derive(Clone, Copy)]
pub struct ErrorExposureLayer {
    mode: RunMode,
}

impl ErrorExposureLayer {
    pub fn new(mode: RunMode) -> Self {
        Self { mode }
    }
}

impl<S> Layer<S> for ErrorExposureLayer {
    type Service = ErrorExposureService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ErrorExposureService {
            inner,
            mode: self.mode,
        }
    }
}

/// Error exposure service
#[derive(Clone)]
pub struct ErrorExposureService<S> {
    inner: S,
    mode: RunMode,
}

impl<S> Service<Request<Body>> for ErrorExposureService<S>
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

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mode = self.mode;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let mut response = inner.call(req).await?;
            let Some(InternalDetail(detail)) = response.extensions_mut().remove::<InternalDetail>()
            else {
                return Ok(response);
            };
            if !mode.is_development() {
                return Ok(response);
            }

            let internal = GateError::Internal(String::new());
            let body = ErrorBody {
                success: false,
                error: internal.code().to_string(),
                message: internal.public_message(),
                details: Some(detail),
            };
            // Status and headers (Retry-After, cookies) are kept; only the body changes
            let (mut parts, _) = response.into_parts();
            parts.headers.remove(axum::http::header::CONTENT_LENGTH);
            let (_, body) = Json(body).into_response().into_parts();
            Ok(Response::from_parts(parts, body))
        })
    }
}

/// Panic handler for `tower_http::catch_panic::CatchPanicLayer::custom`.
///
/// The panic payload is logged and never sent to the client.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    error!(panic = %detail, "Handler panicked");

    let internal = GateError::Internal(String::new());
    let body = ErrorBody {
        success: false,
        error: internal.code().to_string(),
        message: internal.public_message(),
        details: None,
    };
    (internal.status(), Json(body)).into_response()
}
