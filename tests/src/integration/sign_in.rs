//! # Sign-In Flow
//!
//! challenge → CSRF token → signed challenge → session cookie → `/me`.

#[cfg(test)]
mod tests {
    use crate::harness::{verify_body, GateHarness};
    use axum::http::StatusCode;
    use wallet_gate::testing::{TestWallet, TEST_CHALLENGE};
    use wallet_gate::{CSRF_COOKIE, SESSION_COOKIE};

    #[tokio::test]
    async fn test_challenge_message_is_published() {
        let harness = GateHarness::new();
        let mut client = harness.client();

        let response = client.get("/api/auth/message").await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json()["message"], TEST_CHALLENGE);
        assert_eq!(response.json()["success"], true);
    }

    #[tokio::test]
    async fn test_full_sign_in() {
        let harness = GateHarness::new();
        let mut client = harness.client();
        let wallet = TestWallet::from_seed(1);

        let first_csrf = client.fetch_csrf().await;
        let response = client.sign_in(&wallet).await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.json());

        let body = response.json();
        assert_eq!(body["success"], true);
        assert_eq!(body["address"], wallet.address_string());
        assert!(body["expiresAt"].as_str().unwrap().ends_with('Z'));

        // CSRF token rotated on sign-in
        let rotated = body["csrfToken"].as_str().unwrap();
        assert_ne!(rotated, first_csrf);
        assert_eq!(client.csrf(), Some(rotated));

        let session_cookie = response.set_cookie(SESSION_COOKIE).unwrap();
        assert!(session_cookie.contains("HttpOnly"));
        assert!(session_cookie.contains("SameSite=Strict"));
        assert!(session_cookie.contains("Max-Age=86400"));
        // Test mode is not production
        assert!(!session_cookie.contains("Secure"));
        assert!(response.set_cookie(CSRF_COOKIE).is_some());

        let me = client.get("/api/auth/me").await;
        assert_eq!(me.status, StatusCode::OK);
        assert_eq!(me.json()["authenticated"], true);
        assert_eq!(me.json()["address"], wallet.address_string());
    }

    #[tokio::test]
    async fn test_mixed_case_address_is_canonicalized() {
        let harness = GateHarness::new();
        let mut client = harness.client();
        let wallet = TestWallet::from_seed(2);
        client.fetch_csrf().await;

        let shouted = format!("0x{}", wallet.address_string()[2..].to_uppercase());
        let body = verify_body(&shouted, &wallet.sign(TEST_CHALLENGE), TEST_CHALLENGE);
        let response = client.post_json("/api/auth/verify", &body).await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json()["address"], wallet.address_string());
    }

    #[tokio::test]
    async fn test_anonymous_me() {
        let harness = GateHarness::new();
        let mut client = harness.client();

        let me = client.get("/api/auth/me").await;
        assert_eq!(me.status, StatusCode::OK);
        assert_eq!(me.json()["authenticated"], false);
        assert!(me.json().get("address").is_none());
    }

    #[tokio::test]
    async fn test_malformed_sign_in_body() {
        let harness = GateHarness::new();
        let mut client = harness.client();
        client.fetch_csrf().await;

        let response = client
            .post_json("/api/auth/verify", &serde_json::json!({ "address": "0x00" }))
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.error_code(), "invalid_request");
    }

    #[tokio::test]
    async fn test_health_is_unguarded() {
        let harness = GateHarness::new();
        let mut client = harness.client();

        let response = client.get("/health").await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json()["environment"], "test");
        assert!(response.header("x-request-id").is_some());
        // Outside /api: no rate-limit headers
        assert!(response.header("ratelimit-limit").is_none());
    }
}
