//! Minimal `Cookie` / `Set-Cookie` handling for the session and CSRF cookies.

use axum::http::{header, HeaderMap, HeaderValue};
use std::time::Duration;

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

/// Attributes shared by every cookie the gate sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    /// Add `Secure` (production only, so plain-http development works)
    pub secure: bool,
}

impl CookiePolicy {
    /// `HttpOnly; SameSite=Strict; Path=/` cookie with the given lifetime.
    pub fn build(&self, name: &str, value: &str, max_age: Option<Duration>) -> Option<HeaderValue> {
        let mut cookie = format!("{name}={value}; HttpOnly; SameSite=Strict; Path=/");
        if let Some(age) = max_age {
            cookie.push_str(&format!("; Max-Age={}", age.as_secs()));
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie).ok()
    }

    /// Expire cookie `name` immediately.
    pub fn clear(&self, name: &str) -> Option<HeaderValue> {
        self.build(name, "", Some(Duration::ZERO))
    }
}

/// Append a `Set-Cookie` header if `value` is present.
pub fn append_set_cookie(headers: &mut HeaderMap, value: Option<HeaderValue>) {
    if let Some(v) = value {
        headers.append(header::SET_COOKIE, v);
    }
}
