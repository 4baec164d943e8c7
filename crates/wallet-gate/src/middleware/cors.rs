//! CORS for the single configured frontend origin.
//!
//! Wrapper around tower-http CORS. Credentials are allowed, so the origin is
//! always explicit, never a wildcard.

use super::rate_limit::{RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET};
use crate::domain::config::{ConfigError, CorsConfig};
use crate::CSRF_HEADER;
use axum::http::{header, HeaderName, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::CorsLayer;

/// Create the CORS layer from config.
pub fn create_cors_layer(config: &CorsConfig) -> Result<CorsLayer, ConfigError> {
    let origin = HeaderValue::from_str(config.frontend_url.trim_end_matches('/')).map_err(|_| {
        ConfigError::Invalid {
            name: "FRONTEND_URL",
            reason: "not a valid origin header value".into(),
        }
    })?;
    let csrf = HeaderName::from_static(CSRF_HEADER);

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, csrf.clone()])
        .expose_headers([csrf, RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET])
        .max_age(Duration::from_secs(config.max_age)))
}
