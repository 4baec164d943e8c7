//! # Session Token Forgery
//!
//! Attack vectors:
//! - `alg: none` and algorithm substitution
//! - Tokens signed with a guessed secret
//! - Payload edits under the original signature
//! - Non-canonical address claims and future-dated tokens

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::{Sha256, Sha512};

fn b64(value: &Value) -> String {
    URL_SAFE_NO_PAD.encode(value.to_string())
}

/// Hand-built HS256 token over arbitrary header and claims.
pub fn forge_hs256(header: &Value, claims: &Value, secret: &[u8]) -> String {
    let input = format!("{}.{}", b64(header), b64(claims));
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("any key length");
    mac.update(input.as_bytes());
    format!("{input}.{}", URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

pub fn forge_hs512(header: &Value, claims: &Value, secret: &[u8]) -> String {
    let input = format!("{}.{}", b64(header), b64(claims));
    let mut mac = Hmac::<Sha512>::new_from_slice(secret).expect("any key length");
    mac.update(input.as_bytes());
    format!("{input}.{}", URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock after epoch")
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::{GateHarness, TestClient};
    use axum::http::StatusCode;
    use wallet_gate::testing::{TestWallet, TEST_SESSION_SECRET};
    use wallet_gate::SESSION_COOKIE;

    fn claims_for(address: &str) -> Value {
        let now = unix_now();
        json!({ "address": address, "iat": now, "exp": now + 3600 })
    }

    /// The forged cookie must neither authenticate `/me` nor pass a Required gate.
    async fn assert_rejected(client: &mut TestClient, token: &str) {
        client.set_cookie(SESSION_COOKIE, token);

        let me = client.get("/api/auth/me").await;
        assert_eq!(me.json()["authenticated"], false, "token accepted: {token}");

        let refresh = client.post_json("/api/auth/refresh", &json!({})).await;
        assert_eq!(refresh.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_control_forged_hs256_with_real_secret_is_accepted() {
        // Proves the forging helper matches the real encoding
        let harness = GateHarness::new();
        let mut client = harness.client();
        let wallet = TestWallet::from_seed(40);
        let token = forge_hs256(
            &json!({ "alg": "HS256", "typ": "JWT" }),
            &claims_for(&wallet.address_string()),
            TEST_SESSION_SECRET.as_bytes(),
        );
        client.set_cookie(SESSION_COOKIE, &token);
        assert_eq!(client.get("/api/auth/me").await.json()["authenticated"], true);
    }

    #[tokio::test]
    async fn test_alg_none() {
        let harness = GateHarness::new();
        let mut client = harness.client();
        client.fetch_csrf().await;
        let wallet = TestWallet::from_seed(41);

        let unsigned = format!(
            "{}.{}.",
            b64(&json!({ "alg": "none", "typ": "JWT" })),
            b64(&claims_for(&wallet.address_string()))
        );
        assert_rejected(&mut client, &unsigned).await;

        let uppercase_none = format!(
            "{}.{}.",
            b64(&json!({ "alg": "NONE" })),
            b64(&claims_for(&wallet.address_string()))
        );
        assert_rejected(&mut client, &uppercase_none).await;
    }

    #[tokio::test]
    async fn test_algorithm_substitution() {
        let harness = GateHarness::new();
        let mut client = harness.client();
        client.fetch_csrf().await;
        let wallet = TestWallet::from_seed(42);

        let token = forge_hs512(
            &json!({ "alg": "HS512", "typ": "JWT" }),
            &claims_for(&wallet.address_string()),
            TEST_SESSION_SECRET.as_bytes(),
        );
        assert_rejected(&mut client, &token).await;
    }

    #[tokio::test]
    async fn test_guessed_secret() {
        let harness = GateHarness::new();
        let mut client = harness.client();
        client.fetch_csrf().await;
        let wallet = TestWallet::from_seed(43);

        for guess in ["secret", "your-secret-key-change-this-in-production", ""] {
            let token = forge_hs256(
                &json!({ "alg": "HS256", "typ": "JWT" }),
                &claims_for(&wallet.address_string()),
                guess.as_bytes(),
            );
            assert_rejected(&mut client, &token).await;
        }
    }

    #[tokio::test]
    async fn test_payload_swap_under_valid_signature() {
        let harness = GateHarness::new();
        let mut client = harness.client();
        let victim = TestWallet::from_seed(44);
        let attacker = TestWallet::from_seed(45);

        client.sign_in(&attacker).await;
        let genuine = client.cookie(SESSION_COOKIE).unwrap().to_string();
        let mut parts: Vec<&str> = genuine.split('.').collect();
        let swapped = b64(&claims_for(&victim.address_string()));
        parts[1] = &swapped;
        let tampered = parts.join(".");

        assert_rejected(&mut client, &tampered).await;
    }

    #[tokio::test]
    async fn test_non_canonical_address_claim() {
        let harness = GateHarness::new();
        let mut client = harness.client();
        client.fetch_csrf().await;
        let wallet = TestWallet::from_seed(46);
        let shouted = format!("0x{}", wallet.address_string()[2..].to_uppercase());

        let token = forge_hs256(
            &json!({ "alg": "HS256", "typ": "JWT" }),
            &claims_for(&shouted),
            TEST_SESSION_SECRET.as_bytes(),
        );
        assert_rejected(&mut client, &token).await;
    }

    #[tokio::test]
    async fn test_future_dated_and_inverted_claims() {
        let harness = GateHarness::new();
        let mut client = harness.client();
        client.fetch_csrf().await;
        let address = TestWallet::from_seed(47).address_string();
        let now = unix_now();
        let header = json!({ "alg": "HS256", "typ": "JWT" });
        let secret = TEST_SESSION_SECRET.as_bytes();

        let future = forge_hs256(
            &header,
            &json!({ "address": address, "iat": now + 86_400, "exp": now + 2 * 86_400 }),
            secret,
        );
        assert_rejected(&mut client, &future).await;

        let inverted = forge_hs256(
            &header,
            &json!({ "address": address, "iat": now + 30, "exp": now + 10 }),
            secret,
        );
        assert_rejected(&mut client, &inverted).await;
    }

    #[tokio::test]
    async fn test_structural_garbage() {
        let harness = GateHarness::new();
        let mut client = harness.client();
        client.fetch_csrf().await;

        for token in ["a.b", "a.b.c.d", "....", "%%%.%%%.%%%"] {
            assert_rejected(&mut client, token).await;
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::time::Duration;
        use wallet_gate::SessionTokenService;

        fn service() -> SessionTokenService {
            SessionTokenService::new(TEST_SESSION_SECRET.as_bytes(), Duration::from_secs(3600))
                .unwrap()
        }

        proptest! {
            #[test]
            fn prop_flipping_signature_char_rejects(idx in 0usize..42, seed in 1u8..200) {
                let wallet = TestWallet::from_seed(seed);
                let sessions = service();
                let issued = sessions.issue(&wallet.address());
                let (signed, sig) = issued.token.rsplit_once('.').unwrap();

                // The final character carries padding bits, so stay before it
                let mut chars: Vec<char> = sig.chars().collect();
                let i = idx % (chars.len() - 1);
                chars[i] = if chars[i] == 'A' { 'B' } else { 'A' };
                let tampered = format!("{signed}.{}", chars.into_iter().collect::<String>());

                prop_assert!(sessions.verify(&tampered).is_none());
            }

            #[test]
            fn prop_random_secrets_never_verify(secret in proptest::collection::vec(any::<u8>(), 1..64)) {
                prop_assume!(secret.as_slice() != TEST_SESSION_SECRET.as_bytes());
                let address = TestWallet::from_seed(7).address_string();
                let token = forge_hs256(
                    &json!({ "alg": "HS256", "typ": "JWT" }),
                    &claims_for(&address),
                    &secret,
                );
                prop_assert!(service().verify(&token).is_none());
            }
        }
    }
}
