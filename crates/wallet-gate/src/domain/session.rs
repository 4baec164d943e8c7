//! # Stateless Session Tokens
//!
//! Compact HS256 tokens (`header.payload.signature`, base64url without padding)
//! carrying `{address, iat, exp}`. Nothing is stored server-side; a token is
//! valid iff its MAC verifies under the server secret and it has not expired.
//!
//! ## Security Properties
//!
//! - **Single algorithm**: the header must declare `HS256`. Any other value,
//!   including `none`, is rejected before the MAC is checked.
//! - **Constant-time MAC comparison** via `hmac::Mac::verify_slice`
//! - **Explicit expiry**: `now >= exp` fails, independent of the MAC
//! - **Canonical address**: a claim with uppercase hex is rejected even if
//!   the MAC is valid

use super::address::{is_canonical_address, Address};
use super::config::{ConfigError, MIN_SECRET_LEN};
use super::unix_now_secs;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use tracing::debug;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// The only signing algorithm this service issues or accepts.
pub const SESSION_ALGORITHM: &str = "HS256";

/// Tolerated clock skew for an `iat` in the future (seconds).
pub const MAX_IAT_SKEW_SECS: u64 = 60;

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// Payload as it appears on the wire, before canonical-address enforcement.
#[derive(Debug, Deserialize)]
struct RawClaims {
    address: String,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct ExpiryOnly {
    exp: u64,
}

/// Verified claims of a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionClaims {
    pub address: Address,
    pub iat: u64,
    pub exp: u64,
}

/// A freshly signed token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: SessionClaims,
}

/// Issues and verifies session tokens under one symmetric secret.
#[derive(Clone)]
pub struct SessionTokenService {
    secret: Zeroizing<Vec<u8>>,
    lifetime: Duration,
}

impl fmt::Debug for SessionTokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokenService")
            .field("secret", &"<redacted>")
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

impl SessionTokenService {
    /// Create a service. Fails on a short secret or a zero lifetime.
    pub fn new(secret: &[u8], lifetime: Duration) -> Result<Self, ConfigError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::SecretTooShort {
                name: "SESSION_SECRET",
                min: MIN_SECRET_LEN,
            });
        }
        if lifetime.as_secs() == 0 {
            return Err(ConfigError::Zero("SESSION_TTL"));
        }
        Ok(Self {
            secret: Zeroizing::new(secret.to_vec()),
            lifetime,
        })
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Issue a token for `address` valid from now.
    pub fn issue(&self, address: &Address) -> IssuedToken {
        self.issue_at(address, unix_now_secs())
    }

    /// Issue a token as if the current time were `now` (seconds).
    pub fn issue_at(&self, address: &Address, now: u64) -> IssuedToken {
        let claims = SessionClaims {
            address: *address,
            iat: now,
            exp: now.saturating_add(self.lifetime.as_secs()),
        };
        let header = TokenHeader {
            alg: SESSION_ALGORITHM.to_string(),
            typ: Some("JWT".to_string()),
        };

        // Serializing these two plain structs cannot fail
        let header_json = serde_json::to_vec(&header).unwrap_or_default();
        let claims_json = serde_json::to_vec(&claims).unwrap_or_default();

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(claims_json)
        );
        let signature = URL_SAFE_NO_PAD.encode(self.mac(signing_input.as_bytes()).finalize().into_bytes());

        IssuedToken {
            token: format!("{signing_input}.{signature}"),
            claims,
        }
    }

    /// Verify a token against the current time. `None` on any failure.
    pub fn verify(&self, token: &str) -> Option<SessionClaims> {
        self.verify_at(token, unix_now_secs())
    }

    /// Verify a token as if the current time were `now` (seconds).
    pub fn verify_at(&self, token: &str, now: u64) -> Option<SessionClaims> {
        let mut parts = token.split('.');
        let (header_b64, payload_b64, signature_b64) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(p), Some(s), None) => (h, p, s),
                _ => {
                    debug!("Session token rejected: malformed structure");
                    return None;
                }
            };

        let header: TokenHeader = decode_json(header_b64)?;
        if header.alg != SESSION_ALGORITHM {
            debug!(alg = %header.alg, "Session token rejected: unsupported algorithm");
            return None;
        }
        if header.typ.as_deref().is_some_and(|t| t != "JWT") {
            return None;
        }

        let signature = URL_SAFE_NO_PAD.decode(signature_b64).ok()?;
        let mut mac = self.mac(header_b64.as_bytes());
        mac.update(b".");
        mac.update(payload_b64.as_bytes());
        if mac.verify_slice(&signature).is_err() {
            debug!("Session token rejected: signature mismatch");
            return None;
        }

        let raw: RawClaims = decode_json(payload_b64)?;
        if !is_canonical_address(&raw.address) {
            debug!("Session token rejected: non-canonical address claim");
            return None;
        }
        let address = Address::parse(&raw.address).ok()?;

        if raw.iat > raw.exp || raw.iat > now.saturating_add(MAX_IAT_SKEW_SECS) {
            debug!("Session token rejected: implausible issue time");
            return None;
        }
        if now >= raw.exp {
            debug!(address = %address, "Session token rejected: expired");
            return None;
        }

        Some(SessionClaims {
            address,
            iat: raw.iat,
            exp: raw.exp,
        })
    }

    /// `true` if the token's `exp` has passed or the token cannot be decoded.
    ///
    /// The signature is NOT checked. Never use this to grant access.
    pub fn is_expired(token: &str) -> bool {
        Self::is_expired_at(token, unix_now_secs())
    }

    pub fn is_expired_at(token: &str, now: u64) -> bool {
        let mut parts = token.split('.');
        let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(p), Some(_), None) => p,
            _ => return true,
        };
        match decode_json::<ExpiryOnly>(payload) {
            Some(claims) => now >= claims.exp,
            None => true,
        }
    }

    fn mac(&self, data: &[u8]) -> HmacSha256 {
        // HMAC accepts keys of any length
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(m) => m,
            Err(_) => unreachable!("HMAC-SHA256 accepts any key length"),
        };
        mac.update(data);
        mac
    }
}

fn decode_json<T: for<'de> Deserialize<'de>>(segment: &str) -> Option<T> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).ok()?;
    serde_json::from_slice(&bytes).ok()
}
