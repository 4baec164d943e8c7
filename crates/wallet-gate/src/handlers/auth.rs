//! Sign-in, session and CSRF endpoints under `/api/auth`.

use crate::domain::address::Address;
use crate::domain::error::{GateError, GateResult};
use crate::domain::identity::ClientIp;
use crate::domain::session::IssuedToken;
use crate::middleware::auth::Identity;
use crate::middleware::cookies::append_set_cookie;
use crate::middleware::csrf::CsrfToken;
use crate::service::GateState;
use crate::{CSRF_COOKIE, CSRF_HEADER, SESSION_COOKIE};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderValue,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// `POST /api/auth/verify` body
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequest {
    pub address: String,
    pub signature: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfResponse {
    pub success: bool,
    pub csrf_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub success: bool,
    pub address: Address,
    pub expires_at: String,
    pub csrf_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub success: bool,
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// The challenge text clients must sign.
pub async fn challenge_message(State(state): State<GateState>) -> Json<MessageResponse> {
    Json(MessageResponse {
        success: true,
        message: state.verifier.expected_message().to_string(),
    })
}

/// The CSRF token for this client, issuing one if needed.
pub async fn csrf_token(Extension(CsrfToken(token)): Extension<CsrfToken>) -> Json<CsrfResponse> {
    Json(CsrfResponse {
        success: true,
        csrf_token: token,
    })
}

/// Exchange a signed challenge for a session cookie.
///
/// Rotates the CSRF token on success.
pub async fn verify(
    State(state): State<GateState>,
    client_ip: Option<Extension<ClientIp>>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> GateResult<Response> {
    let ip = client_ip.map(|Extension(ClientIp(ip))| ip);
    let Json(request) = body.map_err(|e| {
        warn!(ip = ?ip, reason = %e, "Rejected sign-in body");
        GateError::Format("Request body must contain address, signature and message".into())
    })?;

    let address = state
        .verifier
        .verify(&request.address, &request.signature, &request.message)
        .into_result()
        .map_err(|e| {
            warn!(ip = ?ip, claimed = %request.address, reason = %e, "Wallet verification failed");
            GateError::from(e)
        })?;

    let issued = state.sessions.issue(&address);
    let csrf = state.csrf.issue_fresh(Some(&address));
    info!(address = %address, ip = ?ip, "Wallet signed in");

    let body = VerifyResponse {
        success: true,
        address,
        expires_at: rfc3339(issued.claims.exp),
        csrf_token: csrf.token.clone(),
    };
    let mut response = Json(body).into_response();
    set_session_cookie(&state, &mut response, &issued);
    if let Some(value) = csrf.cookie_value {
        append_set_cookie(
            response.headers_mut(),
            state.cookies.build(CSRF_COOKIE, &value, None),
        );
    }
    if let Ok(v) = HeaderValue::from_str(&csrf.token) {
        response.headers_mut().insert(CSRF_HEADER, v);
    }
    Ok(response)
}

/// Current session, if any. Never rejects.
pub async fn me(identity: Option<Identity>) -> Json<SessionResponse> {
    Json(match identity {
        Some(Identity(identity)) => SessionResponse {
            success: true,
            authenticated: true,
            address: Some(identity.address),
            issued_at: Some(rfc3339(identity.issued_at)),
            expires_at: Some(rfc3339(identity.expires_at)),
        },
        None => SessionResponse {
            success: true,
            authenticated: false,
            address: None,
            issued_at: None,
            expires_at: None,
        },
    })
}

/// Re-issue the session token with a fresh lifetime.
pub async fn refresh(State(state): State<GateState>, Identity(identity): Identity) -> Response {
    let issued = state.sessions.issue(&identity.address);
    info!(address = %identity.address, "Session refreshed");

    let mut response = Json(session_response(&issued)).into_response();
    set_session_cookie(&state, &mut response, &issued);
    response
}

/// Clear the session and CSRF cookies.
pub async fn logout(State(state): State<GateState>, Identity(identity): Identity) -> Response {
    info!(address = %identity.address, "Wallet signed out");

    let mut response = Json(MessageResponse {
        success: true,
        message: "Logged out".into(),
    })
    .into_response();
    append_set_cookie(response.headers_mut(), state.cookies.clear(SESSION_COOKIE));
    append_set_cookie(response.headers_mut(), state.cookies.clear(CSRF_COOKIE));
    response
}

/// Owner-only view of the caller's session.
pub async fn admin_session(Identity(identity): Identity) -> Json<SessionResponse> {
    Json(SessionResponse {
        success: true,
        authenticated: true,
        address: Some(identity.address),
        issued_at: Some(rfc3339(identity.issued_at)),
        expires_at: Some(rfc3339(identity.expires_at)),
    })
}

fn session_response(issued: &IssuedToken) -> SessionResponse {
    SessionResponse {
        success: true,
        authenticated: true,
        address: Some(issued.claims.address),
        issued_at: Some(rfc3339(issued.claims.iat)),
        expires_at: Some(rfc3339(issued.claims.exp)),
    }
}

fn set_session_cookie(state: &GateState, response: &mut Response, issued: &IssuedToken) {
    append_set_cookie(
        response.headers_mut(),
        state
            .cookies
            .build(SESSION_COOKIE, &issued.token, Some(state.sessions.lifetime())),
    );
}

/// Unix seconds as an RFC 3339 UTC timestamp.
pub(crate) fn rfc3339(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}
