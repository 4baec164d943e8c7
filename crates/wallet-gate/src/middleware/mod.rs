//! Middleware stack for the wallet gate.
//!
//! Layer order (outermost first):
//! Request → CORS → CatchPanic → Tracing → ErrorExposure → IpProtection →
//! RateLimit(general) → InputGuard → CSRF → per-route AuthGate / RateLimit → Handler

pub mod auth;
pub mod cookies;
pub mod cors;
pub mod csrf;
pub mod errors;
pub mod ip_protection;
pub mod rate_limit;
pub mod sanitization;
pub mod tracing;

pub use auth::{resolve_identity, AuthGateLayer, GateMode, Identity};
pub use cookies::{read_cookie, CookiePolicy};
pub use cors::create_cors_layer;
pub use csrf::{CsrfLayer, CsrfToken};
pub use errors::{panic_response, ErrorExposureLayer};
pub use ip_protection::{IpProtectionLayer, TrustedProxies};
pub use rate_limit::RateLimitLayer;
pub use sanitization::InputGuardLayer;
pub use tracing::{RequestId, TracingLayer, REQUEST_ID_HEADER};
