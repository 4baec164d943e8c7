//! Wallet Gate - trust boundary for wallet-authenticated HTTP APIs.
//!
//! Gates state-changing operations behind proof of wallet ownership (a signed
//! challenge message) and a stateless session token, with CSRF protection,
//! tiered rate limiting and input normalization in front of every handler.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              WALLET GATE                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  CORS → CatchPanic → Tracing → ErrorExposure → IpProtection             │
//! │                                                                         │
//! │  /api ──► RateLimit(general) → InputGuard → CSRF                        │
//! │              │                                                          │
//! │              ├── /auth/verify   RateLimit(auth) → SignatureVerifier      │
//! │              │                                  → SessionTokenService   │
//! │              ├── /auth/refresh  AuthGate(required) → RateLimit(wallet)  │
//! │              ├── /auth/me       AuthGate(optional)                      │
//! │              └── /admin/session AuthGate(required) → AuthGate(pinned)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use wallet_gate::{GateConfig, GateService};
//!
//! let config = GateConfig::from_env()?;
//! let service = GateService::from_config(config)?;
//! service.serve(shutdown_signal()).await?;
//! ```
//!
//! # Security
//!
//! - EIP-191 signature recovery against a fixed challenge message (anti-replay)
//! - HS256 session tokens with a pinned algorithm and explicit expiry check
//! - Double-submit CSRF tokens bound to an HMAC-signed httpOnly cookie
//! - Fixed-window rate limiting per IP and per wallet
//! - SSRF-safe URL validation and markup stripping for user input

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod handlers;
pub mod middleware;
pub mod ports;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports for public API
pub use domain::address::{is_canonical_address, is_valid_address, is_valid_signature, Address};
pub use domain::allow_list::AllowList;
pub use domain::config::{ConfigError, GateConfig, RunMode, SecretString};
pub use domain::csrf::{CsrfError, CsrfGuard, CsrfIssue};
pub use domain::error::{GateError, GateResult};
pub use domain::identity::{ClientIp, RequestIdentity};
pub use domain::rate_limit::{
    CountMode, KeySource, KeyStrategy, PolicyKind, RateDecision, RateLimitPolicy,
    RateLimitTicket, RateLimiter,
};
pub use domain::sanitize::{InputGuard, NumericOptions};
pub use domain::session::{IssuedToken, SessionClaims, SessionTokenService};
pub use domain::signature::{SignatureVerifier, VerificationError, VerificationResult};
pub use middleware::{
    AuthGateLayer, CsrfLayer, CsrfToken, GateMode, Identity, InputGuardLayer, RateLimitLayer,
};
pub use ports::{HostResolver, RateLimitStore, StoreError};
pub use service::{GateService, GateState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "auth_token";

/// Name of the cookie carrying the signed CSRF token.
pub const CSRF_COOKIE: &str = "csrf_token";

/// Request/response header carrying the CSRF token.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// JSON body field accepted as an alternative to [`CSRF_HEADER`].
pub const CSRF_BODY_FIELD: &str = "_csrf";
