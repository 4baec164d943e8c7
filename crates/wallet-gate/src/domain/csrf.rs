//! # CSRF Guard (double-submit)
//!
//! The cookie carries `token.mac` where
//! `mac = HMAC-SHA256(csrf_secret, token "." session_address)`, with an empty
//! address before sign-in. A mutating request must echo the bare `token` in a
//! header or body field. A forged cookie fails the MAC, and a cookie minted
//! for one session (or for an anonymous visitor) fails under any other.
//!
//! Issuance is idempotent: [`CsrfGuard::ensure`] hands back the token already
//! held in a valid cookie instead of rotating it, so concurrent tabs keep
//! working. [`CsrfGuard::issue_fresh`] rotates explicitly (sign-in).

use super::address::Address;
use super::config::{ConfigError, MIN_SECRET_LEN};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Random bytes per token.
pub const CSRF_TOKEN_BYTES: usize = 32;

/// Why a mutating request failed the CSRF check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CsrfError {
    #[error("CSRF cookie missing")]
    MissingCookie,

    #[error("CSRF cookie is not authentic")]
    InvalidCookie,

    #[error("CSRF token missing from request")]
    MissingToken,

    #[error("CSRF token mismatch")]
    Mismatch,
}

/// Result of token issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfIssue {
    /// The bare token the client echoes back.
    pub token: String,
    /// New cookie value to set, or `None` when the existing cookie is reused.
    pub cookie_value: Option<String>,
}

#[derive(Clone)]
pub struct CsrfGuard {
    secret: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for CsrfGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CsrfGuard { secret: <redacted> }")
    }
}

impl CsrfGuard {
    pub fn new(secret: &[u8]) -> Result<Self, ConfigError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::SecretTooShort {
                name: "CSRF_SECRET",
                min: MIN_SECRET_LEN,
            });
        }
        Ok(Self {
            secret: Zeroizing::new(secret.to_vec()),
        })
    }

    /// `true` for methods that change state. Only GET, HEAD and OPTIONS are safe.
    pub fn requires_check(method: &str) -> bool {
        !matches!(method, "GET" | "HEAD" | "OPTIONS")
    }

    /// Reuse the token in `cookie` if authentic for `session`, otherwise issue a new one.
    pub fn ensure(&self, cookie: Option<&str>, session: Option<&Address>) -> CsrfIssue {
        match cookie.and_then(|c| self.token_from_cookie(c, session)) {
            Some(token) => CsrfIssue {
                token,
                cookie_value: None,
            },
            None => self.issue_fresh(session),
        }
    }

    /// Always issue a new token bound to `session`.
    pub fn issue_fresh(&self, session: Option<&Address>) -> CsrfIssue {
        let mut raw = Zeroizing::new([0u8; CSRF_TOKEN_BYTES]);
        OsRng.fill_bytes(raw.as_mut());
        let token = URL_SAFE_NO_PAD.encode(raw.as_ref());
        let cookie_value = self.cookie_value(&token, session);
        CsrfIssue {
            token,
            cookie_value: Some(cookie_value),
        }
    }

    /// Check that `presented` matches the token bound in `cookie` for `session`.
    pub fn verify(
        &self,
        cookie: Option<&str>,
        presented: Option<&str>,
        session: Option<&Address>,
    ) -> Result<(), CsrfError> {
        let cookie = cookie.filter(|c| !c.is_empty()).ok_or(CsrfError::MissingCookie)?;
        let expected = self
            .token_from_cookie(cookie, session)
            .ok_or(CsrfError::InvalidCookie)?;
        let presented = presented
            .filter(|p| !p.is_empty())
            .ok_or(CsrfError::MissingToken)?;

        if bool::from(expected.as_bytes().ct_eq(presented.as_bytes())) {
            Ok(())
        } else {
            Err(CsrfError::Mismatch)
        }
    }

    fn cookie_value(&self, token: &str, session: Option<&Address>) -> String {
        format!(
            "{token}.{}",
            hex::encode(self.mac(token, session).finalize().into_bytes())
        )
    }

    /// Extract the token from an authentic cookie value.
    fn token_from_cookie(&self, cookie: &str, session: Option<&Address>) -> Option<String> {
        let (token, mac_hex) = cookie.rsplit_once('.')?;
        if token.is_empty() {
            return None;
        }
        let tag = hex::decode(mac_hex).ok()?;
        self.mac(token, session).verify_slice(&tag).ok()?;
        Some(token.to_string())
    }

    fn mac(&self, token: &str, session: Option<&Address>) -> HmacSha256 {
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(m) => m,
            Err(_) => unreachable!("HMAC-SHA256 accepts any key length"),
        };
        mac.update(token.as_bytes());
        mac.update(b".");
        if let Some(address) = session {
            mac.update(address.to_canonical().as_bytes());
        }
        mac
    }
}
