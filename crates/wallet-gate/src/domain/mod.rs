//! Domain layer: the security components and the error taxonomy.
//!
//! Everything here except [`error`] is independent of the HTTP stack.

pub mod address;
pub mod allow_list;
pub mod config;
pub mod csrf;
pub mod error;
pub mod identity;
pub mod network;
pub mod rate_limit;
pub mod sanitize;
pub mod session;
pub mod signature;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in whole seconds since the Unix epoch.
pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub(crate) fn unix_now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
