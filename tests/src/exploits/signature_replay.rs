//! # Signature Replay and Malleability
//!
//! Attack vectors:
//! - Signatures captured for another message or another dApp
//! - Claiming someone else's address with your own signature
//! - Cosmetic edits to the challenge text
//! - High-S malleated twins of a valid signature (EIP-2)
//! - Out-of-range recovery bytes and zero scalars

/// secp256k1 group order, big-endian.
const CURVE_ORDER: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe,
    0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36, 0x41, 0x41,
];

/// `n - s` for a 32-byte big-endian scalar `s < n`.
fn negate_scalar(s: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut borrow = 0i16;
    for i in (0..32).rev() {
        let mut diff = CURVE_ORDER[i] as i16 - s[i] as i16 - borrow;
        borrow = if diff < 0 {
            diff += 256;
            1
        } else {
            0
        };
        out[i] = diff as u8;
    }
    out
}

/// The malleated twin `(r, n - s, flipped v)` of a `0x`-prefixed r||s||v signature.
pub fn malleate(signature: &str) -> String {
    let bytes = hex::decode(&signature[2..]).expect("hex signature");
    let mut twin = bytes[..32].to_vec();
    twin.extend_from_slice(&negate_scalar(&bytes[32..64]));
    twin.push(match bytes[64] {
        27 => 28,
        28 => 27,
        v => v ^ 1,
    });
    format!("0x{}", hex::encode(twin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::{verify_body, GateHarness, TestClient};
    use axum::http::StatusCode;
    use wallet_gate::testing::{TestWallet, TEST_CHALLENGE};
    use wallet_gate::SESSION_COOKIE;

    async fn submit(client: &mut TestClient, address: &str, signature: &str, message: &str) -> (StatusCode, String) {
        let response = client
            .post_json("/api/auth/verify", &verify_body(address, signature, message))
            .await;
        assert!(response.set_cookie(SESSION_COOKIE).is_none());
        let message = response.json()["message"].as_str().unwrap_or_default().to_string();
        (response.status, message)
    }

    #[tokio::test]
    async fn test_signature_for_other_message() {
        let harness = GateHarness::new();
        let mut client = harness.client();
        client.fetch_csrf().await;
        let wallet = TestWallet::from_seed(50);

        // Signed for some other site; submitted with its own message
        let other = "Sign in to Totally Legit Airdrop";
        let (status, message) =
            submit(&mut client, &wallet.address_string(), &wallet.sign(other), other).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "Message does not match the expected challenge");

        // Same signature presented with the real challenge text
        let (status, message) = submit(
            &mut client,
            &wallet.address_string(),
            &wallet.sign(other),
            TEST_CHALLENGE,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(message, "Signature does not match claimed address");
    }

    #[tokio::test]
    async fn test_impersonation() {
        let harness = GateHarness::new();
        let mut client = harness.client();
        client.fetch_csrf().await;
        let victim = TestWallet::from_seed(51);
        let attacker = TestWallet::from_seed(52);

        let (status, _) = submit(
            &mut client,
            &victim.address_string(),
            &attacker.sign(TEST_CHALLENGE),
            TEST_CHALLENGE,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_cosmetic_challenge_edits() {
        let harness = GateHarness::new();
        let mut client = harness.client();
        client.fetch_csrf().await;
        let wallet = TestWallet::from_seed(53);

        for edited in [
            format!("{TEST_CHALLENGE} "),
            format!("<b>{TEST_CHALLENGE}</b>"),
            TEST_CHALLENGE.to_uppercase(),
            TEST_CHALLENGE.replace(' ', "\u{00a0}"),
        ] {
            let (status, _) =
                submit(&mut client, &wallet.address_string(), &wallet.sign(&edited), &edited).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "accepted edited challenge {edited:?}");
        }
    }

    #[tokio::test]
    async fn test_high_s_twin_rejected() {
        let harness = GateHarness::new();
        let mut client = harness.client();
        client.fetch_csrf().await;
        let wallet = TestWallet::from_seed(54);

        let twin = malleate(&wallet.sign(TEST_CHALLENGE));
        let (status, message) =
            submit(&mut client, &wallet.address_string(), &twin, TEST_CHALLENGE).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "Signature recovery failed");
    }

    #[tokio::test]
    async fn test_malformed_signature_bytes() {
        let harness = GateHarness::new();
        let mut client = harness.client();
        client.fetch_csrf().await;
        let wallet = TestWallet::from_seed(55);
        let genuine = wallet.sign(TEST_CHALLENGE);

        let bad_v = format!("{}1d", &genuine[..130]);
        let zeros = format!("0x{}1b", "0".repeat(128));
        let truncated = genuine[..130].to_string();

        for (signature, expected) in [
            (bad_v, "Signature recovery failed"),
            (zeros, "Signature recovery failed"),
            (truncated, "Invalid signature format"),
        ] {
            let (status, message) =
                submit(&mut client, &wallet.address_string(), &signature, TEST_CHALLENGE).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(message, expected);
        }
    }

    #[test]
    fn test_malleate_is_an_involution() {
        let wallet = TestWallet::from_seed(56);
        let signature = wallet.sign(TEST_CHALLENGE);
        assert_ne!(malleate(&signature), signature);
        assert_eq!(malleate(&malleate(&signature)), signature);
    }
}
