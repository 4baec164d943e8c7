//! Request-scoped identity values carried in request extensions.

use super::address::Address;
use super::session::SessionClaims;
use std::net::IpAddr;

/// The wallet resolved by the authentication gate for the current request.
///
/// Only ever inserted after every check passed; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub address: Address,
    pub issued_at: u64,
    pub expires_at: u64,
}

impl From<SessionClaims> for RequestIdentity {
    fn from(claims: SessionClaims) -> Self {
        Self {
            address: claims.address,
            issued_at: claims.iat,
            expires_at: claims.exp,
        }
    }
}

/// Client network address as determined by the IP protection layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);
