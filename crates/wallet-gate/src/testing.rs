//! Deterministic fixtures for tests: wallets that sign challenges, a static
//! resolver, and a valid configuration.

use crate::domain::address::Address;
use crate::domain::config::{GateConfig, RunMode, SecretString};
use crate::domain::signature::{address_from_pubkey, personal_message_hash};
use crate::ports::{HostResolver, ResolveError};
use k256::ecdsa::SigningKey;
use std::collections::HashMap;
use std::net::IpAddr;

pub const TEST_SESSION_SECRET: &str = "test-session-secret-0123456789abcdef";
pub const TEST_CSRF_SECRET: &str = "test-csrf-secret-fedcba9876543210!!";
pub const TEST_CHALLENGE: &str = "Sign this message to enter the Exhibition";

/// A wallet with a key derived from a one-byte seed.
pub struct TestWallet {
    key: SigningKey,
}

impl TestWallet {
    /// `seed` must be non-zero.
    pub fn from_seed(seed: u8) -> Self {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x11;
        bytes[31] = seed;
        let key = SigningKey::from_slice(&bytes).expect("seeded key is a valid scalar");
        Self { key }
    }

    pub fn address(&self) -> Address {
        address_from_pubkey(self.key.verifying_key())
    }

    /// Canonical lowercase address string.
    pub fn address_string(&self) -> String {
        self.address().to_canonical()
    }

    pub fn sign(&self, message: &str) -> String {
        sign_personal_message(self, message)
    }
}

/// EIP-191 signature over `message` as `0x` + r || s || v (v in {27, 28}).
pub fn sign_personal_message(wallet: &TestWallet, message: &str) -> String {
    let digest = personal_message_hash(message);
    let (signature, recovery_id) = wallet
        .key
        .sign_prehash_recoverable(&digest)
        .expect("signing a 32-byte digest");
    let mut bytes = signature.to_bytes().to_vec();
    bytes.push(recovery_id.to_byte() + 27);
    format!("0x{}", hex::encode(bytes))
}

/// Resolver answering from a fixed table; unknown hosts fail.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, host: &str, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.hosts
            .insert(host.to_ascii_lowercase(), ips.into_iter().collect());
        self
    }
}

#[async_trait::async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
        self.hosts
            .get(&host.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| ResolveError {
                host: host.to_string(),
                reason: "unknown host".to_string(),
            })
    }
}

/// A configuration that passes validation, in test mode.
pub fn test_config() -> GateConfig {
    let mut config = GateConfig {
        mode: RunMode::Test,
        ..GateConfig::default()
    };
    config.session.secret = SecretString::new(TEST_SESSION_SECRET);
    config.csrf.secret = SecretString::new(TEST_CSRF_SECRET);
    config.auth.challenge_message = TEST_CHALLENGE.to_string();
    config.cors.frontend_url = "https://app.example.org".to_string();
    config
}
