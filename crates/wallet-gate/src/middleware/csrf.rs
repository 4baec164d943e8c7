//! Double-submit CSRF middleware.
//!
//! Safe requests get a token (reusing a valid cookie) exposed as a
//! [`CsrfToken`] extension and an `X-CSRF-Token` response header. Every other
//! method must echo the cookie's token in `X-CSRF-Token` or a `_csrf` JSON
//! body field.
//!
//! With [`CsrfLayer::with_session_binding`] the token is bound to the wallet
//! of the resolved session, so a pair lifted from another session or from
//! before sign-in is rejected. Safe requests re-issue on a binding change.

use super::auth::resolve_identity;
use super::cookies::{append_set_cookie, read_cookie, CookiePolicy};
use crate::domain::address::Address;
use crate::domain::allow_list::AllowList;
use crate::domain::csrf::{CsrfGuard, CsrfIssue};
use crate::domain::error::GateError;
use crate::domain::identity::ClientIp;
use crate::domain::session::SessionTokenService;
use crate::{CSRF_BODY_FIELD, CSRF_COOKIE, CSRF_HEADER};
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, HeaderValue, Request},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower::{Layer, Service};
use tracing::{debug, warn};

/// The CSRF token in effect for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken(pub String);

/// Sources used to find the wallet a CSRF token is bound to.
#[derive(Clone)]
struct SessionBinding {
    sessions: Arc<SessionTokenService>,
    allow_list: Arc<AllowList>,
}

impl SessionBinding {
    /// Address of an authenticated, allow-listed session; anonymous otherwise.
    fn resolve(&self, headers: &HeaderMap) -> Option<Address> {
        resolve_identity(headers, &self.sessions, &self.allow_list)
            .ok()
            .map(|identity| identity.address)
    }
}

/// CSRF layer
#[derive(Clone)]
pub struct CsrfLayer {
    guard: Arc<CsrfGuard>,
    cookies: CookiePolicy,
    max_body_bytes: usize,
    binding: Option<SessionBinding>,
}

impl CsrfLayer {
    pub fn new(guard: Arc<CsrfGuard>, cookies: CookiePolicy, max_body_bytes: usize) -> Self {
        Self {
            guard,
            cookies,
            max_body_bytes,
            binding: None,
        }
    }

    /// Bind tokens to the wallet of the session cookie.
    pub fn with_session_binding(
        mut self,
        sessions: Arc<SessionTokenService>,
        allow_list: Arc<AllowList>,
    ) -> Self {
        self.binding = Some(SessionBinding {
            sessions,
            allow_list,
        });
        self
    }
}

impl<S> Layer<S> for CsrfLayer {
    type Service = CsrfService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CsrfService {
            inner,
            guard: Arc::clone(&self.guard),
            cookies: self.cookies,
            max_body_bytes: self.max_body_bytes,
            binding: self.binding.clone(),
        }
    }
}

/// CSRF service
#[derive(Clone)]
pub struct CsrfService<S> {
    inner: S,
    guard: Arc<CsrfGuard>,
    cookies: CookiePolicy,
    max_body_bytes: usize,
    binding: Option<SessionBinding>,
}

impl<S> Service<Request<Body>> for CsrfService<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let guard = Arc::clone(&self.guard);
        let cookies = self.cookies;
        let max_body_bytes = self.max_body_bytes;
        let session = self
            .binding
            .as_ref()
            .and_then(|binding| binding.resolve(req.headers()));
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let cookie = read_cookie(req.headers(), CSRF_COOKIE);

            if !CsrfGuard::requires_check(req.method().as_str()) {
                let CsrfIssue {
                    token,
                    cookie_value,
                } = guard.ensure(cookie.as_deref(), session.as_ref());
                if cookie_value.is_some() {
                    debug!("Issued CSRF token");
                }
                req.extensions_mut().insert(CsrfToken(token.clone()));

                let mut response = inner.call(req).await?;
                if let Ok(v) = HeaderValue::from_str(&token) {
                    response.headers_mut().insert(CSRF_HEADER, v);
                }
                if let Some(value) = cookie_value {
                    append_set_cookie(
                        response.headers_mut(),
                        cookies.build(CSRF_COOKIE, &value, None),
                    );
                }
                return Ok(response);
            }

            let (req, presented) = match presented_token(req, max_body_bytes).await {
                Ok(pair) => pair,
                Err(e) => return Ok(e.into_response()),
            };

            if let Err(reason) = guard.verify(cookie.as_deref(), presented.as_deref(), session.as_ref()) {
                warn!(
                    ip = ?req.extensions().get::<ClientIp>().map(|c| c.0),
                    method = %req.method(),
                    path = %req.uri().path(),
                    reason = %reason,
                    "CSRF check failed"
                );
                return Ok(GateError::from(reason).into_response());
            }

            let mut req = req;
            if let Some(token) = presented {
                req.extensions_mut().insert(CsrfToken(token));
            }
            inner.call(req).await
        })
    }
}

/// Token from the header, else from the `_csrf` field of a JSON body.
async fn presented_token(
    req: Request<Body>,
    max_body_bytes: usize,
) -> Result<(Request<Body>, Option<String>), GateError> {
    if let Some(token) = req
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        let token = token.to_string();
        return Ok((req, Some(token)));
    }

    let is_json = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("application/json"));
    if !is_json {
        return Ok((req, None));
    }

    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, max_body_bytes)
        .await
        .map_err(|_| GateError::PayloadTooLarge {
            limit: max_body_bytes,
        })?;
    let token = serde_json::from_slice::<serde_json::Value>(&bytes)
        .ok()
        .and_then(|v| v.get(CSRF_BODY_FIELD)?.as_str().map(str::to_string));
    Ok((Request::from_parts(parts, Body::from(bytes)), token))
}
