//! Gate error taxonomy and its HTTP rendering.
//!
//! Every rejection leaves the gate as
//! `{"success": false, "error": <code>, "message": <text>}`. Internal detail
//! is never put in the body here; it travels in an [`InternalDetail`] response
//! extension that only the development-mode exposure layer reads.

use super::csrf::CsrfError;
use super::signature::VerificationError;
use crate::ports::StoreError;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Short machine-readable error codes
pub mod codes {
    pub const INVALID_REQUEST: &str = "invalid_request";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const FORBIDDEN: &str = "forbidden";
    pub const CSRF_INVALID: &str = "csrf_invalid";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
    pub const NOT_FOUND: &str = "not_found";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

pub type GateResult<T> = Result<T, GateError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// Malformed address, signature, URL, number or body (400)
    #[error("{0}")]
    Format(String),

    /// Missing, invalid or expired session (401)
    #[error("{0}")]
    Authentication(String),

    /// Valid identity without permission (403)
    #[error("{0}")]
    Authorization(String),

    /// CSRF token mismatch (403)
    #[error("{0}")]
    Forgery(String),

    /// Budget exhausted; retry after the window resets (429)
    #[error("too many requests")]
    RateExceeded { retry_after_secs: u64 },

    /// Body above the configured limit (413)
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Unknown route (404)
    #[error("not found")]
    NotFound,

    /// Unexpected failure (500); the detail is withheld from clients
    #[error("internal error: {0}")]
    Internal(String),
}

impl GateError {
    pub fn authentication_required() -> Self {
        Self::Authentication("Authentication required".into())
    }

    pub fn invalid_session() -> Self {
        Self::Authentication("Invalid or expired session".into())
    }

    pub fn access_denied() -> Self {
        Self::Authorization("Access denied".into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Format(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Authorization(_) | Self::Forgery(_) => StatusCode::FORBIDDEN,
            Self::RateExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Format(_) => codes::INVALID_REQUEST,
            Self::Authentication(_) => codes::UNAUTHORIZED,
            Self::Authorization(_) => codes::FORBIDDEN,
            Self::Forgery(_) => codes::CSRF_INVALID,
            Self::RateExceeded { .. } => codes::RATE_LIMITED,
            Self::PayloadTooLarge { .. } => codes::PAYLOAD_TOO_LARGE,
            Self::NotFound => codes::NOT_FOUND,
            Self::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Client-facing message
    pub fn public_message(&self) -> String {
        match self {
            Self::RateExceeded { .. } => "Too many requests, please try again later".into(),
            Self::NotFound => "Route not found".into(),
            Self::Internal(_) => "Internal server error".into(),
            other => other.to_string(),
        }
    }
}

/// Rejection body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side detail of a 500, attached as a response extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalDetail(pub String);

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.code().to_string(),
            message: self.public_message(),
            details: None,
        };
        let mut response = (self.status(), Json(body)).into_response();

        match self {
            Self::RateExceeded { retry_after_secs } => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            }
            Self::Internal(detail) => {
                error!(detail = %detail, "Internal error");
                response.extensions_mut().insert(InternalDetail(detail));
            }
            _ => {}
        }
        response
    }
}

impl From<VerificationError> for GateError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::InvalidAddressFormat
            | VerificationError::InvalidSignatureFormat
            | VerificationError::ReplayOrTamperedMessage
            | VerificationError::RecoveryFailed => Self::Format(capitalize(&err.to_string())),
            VerificationError::AddressMismatch | VerificationError::NotWhitelisted => {
                Self::Authorization(capitalize(&err.to_string()))
            }
        }
    }
}

impl From<CsrfError> for GateError {
    fn from(_: CsrfError) -> Self {
        // The specific cause is logged, not returned
        Self::Forgery("Invalid CSRF token".into())
    }
}

impl From<StoreError> for GateError {
    fn from(err: StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
