//! # Outbound Ports (Driven Ports)
//!
//! Dependencies the gate needs from its environment: a counter store for the
//! rate limiter and a hostname resolver for URL validation.

use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

/// Error from a rate-limit store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backing store could not be reached
    #[error("rate-limit store unavailable: {0}")]
    Unavailable(String),
}

/// Counter state of one key after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Requests counted in the active window, including this one.
    pub count: u32,
    /// Start of the active window (unix ms).
    pub window_start_ms: u64,
    /// Instant the active window ends (unix ms).
    pub reset_at_ms: u64,
}

/// Fixed-window counter storage.
///
/// Implementations must make `increment` atomic per key: concurrent callers
/// for the same key observe distinct, consecutive counts.
#[async_trait::async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one request for `key` at `now_ms`.
    ///
    /// Starts a new window when none exists or when `now_ms` is past
    /// `window_start + window`.
    async fn increment(
        &self,
        key: &str,
        window: Duration,
        now_ms: u64,
    ) -> Result<WindowSnapshot, StoreError>;

    /// Undo one count for `key`, but only while the window that began at
    /// `window_start_ms` is still the active one.
    async fn decrement(&self, key: &str, window_start_ms: u64) -> Result<(), StoreError>;

    /// Drop windows that ended before `now_ms`. Returns how many were removed.
    async fn prune(&self, now_ms: u64) -> Result<usize, StoreError>;

    /// Number of tracked keys.
    async fn len(&self) -> usize;
}

/// Error from hostname resolution.
#[derive(Debug, Clone, Error)]
#[error("failed to resolve {host}: {reason}")]
pub struct ResolveError {
    pub host: String,
    pub reason: String,
}

/// Resolves a hostname to every address it maps to.
#[async_trait::async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError>;
}
