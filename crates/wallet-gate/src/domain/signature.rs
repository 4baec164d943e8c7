//! # Wallet Signature Verification (secp256k1, EIP-191)
//!
//! Proves that a caller controls a claimed address by recovering the signer of
//! the process-wide challenge message.
//!
//! ## Verification order
//!
//! Each step short-circuits:
//!
//! 1. Claimed address format
//! 2. Signature format
//! 3. Message is byte-identical to the configured challenge (anti-replay)
//! 4. Public key recovery over the EIP-191 personal-message digest
//! 5. Recovered signer equals the claimed address
//! 6. Allow-list membership
//!
//! ## Security Notes
//!
//! - **Malleability (EIP-2)**: high-S signatures are rejected, matching
//!   wallets that only ever produce low-S signatures
//! - **Scalar range**: r and s must be in [1, n-1] (enforced by k256 parsing)
//! - Intermediate signature bytes are zeroized after use

use super::address::{
    is_valid_address, is_valid_signature, Address, RecoverableSignature, ADDRESS_LEN,
};
use super::allow_list::AllowList;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};
use std::sync::Arc;
use tracing::{debug, warn};

/// Prefix of the EIP-191 version 0x45 ("personal_sign") envelope.
const PERSONAL_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// Reasons a sign-in proof is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("invalid address format")]
    InvalidAddressFormat,

    #[error("invalid signature format")]
    InvalidSignatureFormat,

    /// The presented message differs from the challenge.
    #[error("message does not match the expected challenge")]
    ReplayOrTamperedMessage,

    /// The signature bytes do not describe a recoverable secp256k1 signature.
    #[error("signature recovery failed")]
    RecoveryFailed,

    #[error("signature does not match claimed address")]
    AddressMismatch,

    #[error("wallet address not in allow-list")]
    NotWhitelisted,
}

/// Outcome of [`SignatureVerifier::verify`].
///
/// `recovered_address` is reported for diagnostics whenever recovery ran,
/// including on `AddressMismatch` and `NotWhitelisted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub valid: bool,
    pub recovered_address: Option<Address>,
    pub error: Option<VerificationError>,
}

impl VerificationResult {
    fn valid(address: Address) -> Self {
        Self {
            valid: true,
            recovered_address: Some(address),
            error: None,
        }
    }

    fn invalid(error: VerificationError) -> Self {
        Self {
            valid: false,
            recovered_address: None,
            error: Some(error),
        }
    }

    fn invalid_with_recovered(error: VerificationError, recovered: Address) -> Self {
        Self {
            valid: false,
            recovered_address: Some(recovered),
            error: Some(error),
        }
    }

    /// Collapse into a `Result` carrying the verified canonical address.
    pub fn into_result(self) -> Result<Address, VerificationError> {
        match (self.valid, self.recovered_address, self.error) {
            (true, Some(address), None) => Ok(address),
            (_, _, Some(error)) => Err(error),
            _ => Err(VerificationError::RecoveryFailed),
        }
    }
}

/// Verifies signed challenges against a fixed message and allow-list.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    challenge: Arc<str>,
    allow_list: Arc<AllowList>,
}

impl SignatureVerifier {
    pub fn new(challenge: impl Into<Arc<str>>, allow_list: Arc<AllowList>) -> Self {
        Self {
            challenge: challenge.into(),
            allow_list,
        }
    }

    /// The exact message clients must sign.
    pub fn expected_message(&self) -> &str {
        &self.challenge
    }

    /// `true` if the allow-list admits `address`.
    pub fn is_whitelisted(&self, address: &Address) -> bool {
        self.allow_list.permits(address)
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    /// Verify that `signature` over `message` was produced by `address`.
    pub fn verify(&self, address: &str, signature: &str, message: &str) -> VerificationResult {
        let normalized = address.to_ascii_lowercase();
        if !is_valid_address(&normalized) {
            return VerificationResult::invalid(VerificationError::InvalidAddressFormat);
        }
        let claimed = match Address::parse(&normalized) {
            Ok(a) => a,
            Err(_) => return VerificationResult::invalid(VerificationError::InvalidAddressFormat),
        };

        if !is_valid_signature(signature) {
            return VerificationResult::invalid(VerificationError::InvalidSignatureFormat);
        }

        if message.as_bytes() != self.challenge.as_bytes() {
            warn!(address = %claimed, "Sign-in message does not match challenge");
            return VerificationResult::invalid(VerificationError::ReplayOrTamperedMessage);
        }

        let recovered = match recover_personal_signer(message, signature) {
            Ok(a) => a,
            Err(e) => {
                warn!(address = %claimed, error = %e, "Signature recovery failed");
                return VerificationResult::invalid(e);
            }
        };

        if recovered != claimed {
            warn!(
                claimed = %claimed,
                recovered = %recovered,
                "Recovered signer does not match claimed address"
            );
            return VerificationResult::invalid_with_recovered(
                VerificationError::AddressMismatch,
                recovered,
            );
        }

        if !self.allow_list.permits(&recovered) {
            warn!(address = %recovered, "Wallet not in allow-list");
            return VerificationResult::invalid_with_recovered(
                VerificationError::NotWhitelisted,
                recovered,
            );
        }

        debug!(address = %recovered, "Wallet signature verified");
        VerificationResult::valid(recovered)
    }
}

/// Keccak-256 of `data`.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// EIP-191 personal-message digest: `keccak256(prefix || len(message) || message)`.
pub fn personal_message_hash(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(PERSONAL_MESSAGE_PREFIX.as_bytes());
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message.as_bytes());
    hasher.finalize().into()
}

/// Derive the address of a secp256k1 public key.
pub fn address_from_pubkey(public_key: &VerifyingKey) -> Address {
    let encoded = public_key.to_encoded_point(false);
    // Skip the 0x04 uncompressed-point tag
    let hash = keccak256(&encoded.as_bytes()[1..]);
    let mut address = [0u8; ADDRESS_LEN];
    address.copy_from_slice(&hash[12..]);
    Address::from_bytes(address)
}

/// Recover the signer of an EIP-191 personal message.
pub fn recover_personal_signer(
    message: &str,
    signature_hex: &str,
) -> Result<Address, VerificationError> {
    use zeroize::Zeroize;

    let parsed =
        RecoverableSignature::parse(signature_hex).ok_or(VerificationError::InvalidSignatureFormat)?;
    let recovery_id = parse_recovery_id(parsed.v)?;

    let mut sig_bytes = [0u8; 64];
    sig_bytes[..32].copy_from_slice(&parsed.r);
    sig_bytes[32..].copy_from_slice(&parsed.s);
    let signature = Signature::from_slice(&sig_bytes);
    sig_bytes.zeroize();
    let signature = signature.map_err(|_| VerificationError::RecoveryFailed)?;

    // normalize_s returns Some only when s was in the upper half
    if signature.normalize_s().is_some() {
        return Err(VerificationError::RecoveryFailed);
    }

    let digest = personal_message_hash(message);
    let key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id)
        .map_err(|_| VerificationError::RecoveryFailed)?;

    Ok(address_from_pubkey(&key))
}

/// Accepts both raw (0/1) and legacy (27/28) recovery bytes.
fn parse_recovery_id(v: u8) -> Result<RecoveryId, VerificationError> {
    let normalized = match v {
        0 | 27 => 0,
        1 | 28 => 1,
        _ => return Err(VerificationError::RecoveryFailed),
    };
    RecoveryId::from_byte(normalized).ok_or(VerificationError::RecoveryFailed)
}
