//! HTTP handlers. Every guard runs in middleware before these are reached.

pub mod auth;
pub mod health;

pub use auth::{
    admin_session, challenge_message, csrf_token, logout, me, refresh, verify, CsrfResponse,
    MessageResponse, SessionResponse, VerifyRequest, VerifyResponse,
};
pub use health::{health_check, not_found, HealthResponse};
