//! Authentication gate middleware.
//!
//! Resolves the session cookie into a [`RequestIdentity`] extension:
//!
//! - [`GateMode::Required`]: 401 without a valid session, 403 if the wallet
//!   is not allow-listed
//! - [`GateMode::Optional`]: attaches an identity when one resolves, never blocks
//! - [`GateMode::Pinned`]: Required, then 403 unless the wallet is the pinned one
//!
//! Resolution is all-or-nothing: the extension is inserted only after every
//! check has passed.

use super::cookies::read_cookie;
use crate::domain::address::Address;
use crate::domain::allow_list::AllowList;
use crate::domain::error::GateError;
use crate::domain::identity::{ClientIp, RequestIdentity};
use crate::domain::session::SessionTokenService;
use crate::SESSION_COOKIE;
use axum::{
    async_trait,
    body::Body,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, Request},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower::{Layer, Service};
use tracing::{debug, warn};

/// Which variant of the gate to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateMode {
    Required,
    Optional,
    Pinned(Address),
}

/// Authentication gate layer
#[derive(Clone)]
pub struct AuthGateLayer {
    mode: GateMode,
    sessions: Arc<SessionTokenService>,
    allow_list: Arc<AllowList>,
}

impl AuthGateLayer {
    pub fn new(
        mode: GateMode,
        sessions: Arc<SessionTokenService>,
        allow_list: Arc<AllowList>,
    ) -> Self {
        Self {
            mode,
            sessions,
            allow_list,
        }
    }
}

impl<S> Layer<S> for AuthGateLayer {
    type Service = AuthGateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthGateService {
            inner,
            mode: self.mode.clone(),
            sessions: Arc::clone(&self.sessions),
            allow_list: Arc::clone(&self.allow_list),
        }
    }
}

/// Authentication gate service
#[derive(Clone)]
pub struct AuthGateService<S> {
    inner: S,
    mode: GateMode,
    sessions: Arc<SessionTokenService>,
    allow_list: Arc<AllowList>,
}

impl<S> Service<Request<Body>> for AuthGateService<S>
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
        let mode = self.mode.clone();
        let sessions = Arc::clone(&self.sessions);
        let allow_list = Arc::clone(&self.allow_list);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let ip = req.extensions().get::<ClientIp>().map(|c| c.0);
            let path = req.uri().path().to_string();

            let existing = req.extensions().get::<RequestIdentity>().cloned();
            let resolved = match existing {
                Some(identity) => Ok(identity),
                None => resolve_identity(req.headers(), &sessions, &allow_list),
            };

            let identity = match (&mode, resolved) {
                (GateMode::Optional, Ok(identity)) => Some(identity),
                (GateMode::Optional, Err(e)) => {
                    debug!(path = %path, reason = %e, "Optional auth: continuing anonymously");
                    None
                }
                (GateMode::Required, Ok(identity)) => Some(identity),
                (GateMode::Pinned(expected), Ok(identity)) => {
                    if identity.address != *expected {
                        warn!(
                            ip = ?ip,
                            path = %path,
                            address = %identity.address,
                            "Owner-only route accessed by another wallet"
                        );
                        return Ok(GateError::Authorization("Owner-only action".into())
                            .into_response());
                    }
                    Some(identity)
                }
                (_, Err(e)) => {
                    warn!(ip = ?ip, path = %path, reason = %e, "Authentication rejected");
                    return Ok(e.into_response());
                }
            };

            if let Some(identity) = identity {
                debug!(address = %identity.address, path = %path, "Request authenticated");
                req.extensions_mut().insert(identity);
            }
            inner.call(req).await
        })
    }
}

/// Resolve the session cookie into an identity, or the rejection to send.
pub fn resolve_identity(
    headers: &HeaderMap,
    sessions: &SessionTokenService,
    allow_list: &AllowList,
) -> Result<RequestIdentity, GateError> {
    let token = read_cookie(headers, SESSION_COOKIE).ok_or_else(GateError::authentication_required)?;
    let claims = sessions.verify(&token).ok_or_else(GateError::invalid_session)?;
    if !allow_list.permits(&claims.address) {
        return Err(GateError::access_denied());
    }
    Ok(claims.into())
}

/// Extractor for handlers behind a Required or Pinned gate.
///
/// Use `Option<Identity>` behind an Optional gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(pub RequestIdentity);

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = GateError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestIdentity>()
            .cloned()
            .map(Identity)
            .ok_or_else(GateError::authentication_required)
    }
}
