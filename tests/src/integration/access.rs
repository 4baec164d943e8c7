//! # Access Control
//!
//! Allow-list enforcement at sign-in and on every request, and the
//! owner-pinned admin route.

#[cfg(test)]
mod tests {
    use crate::harness::GateHarness;
    use axum::http::StatusCode;
    use std::time::Duration;
    use wallet_gate::testing::{test_config, TestWallet, TEST_SESSION_SECRET};
    use wallet_gate::{SessionTokenService, SESSION_COOKIE};

    #[tokio::test]
    async fn test_allow_list_blocks_sign_in() {
        let member = TestWallet::from_seed(10);
        let outsider = TestWallet::from_seed(11);
        let mut config = test_config();
        config.auth.wallet_allow_list = vec![member.address_string()];
        let harness = GateHarness::with_config(config);

        let mut client = harness.client();
        let response = client.sign_in(&outsider).await;
        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert_eq!(response.error_code(), "forbidden");
        assert_eq!(response.json()["message"], "Wallet address not in allow-list");
        assert!(response.set_cookie(SESSION_COOKIE).is_none());

        let mut client = harness.client_from("198.51.100.1".parse().unwrap());
        let response = client.sign_in(&member).await;
        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_allow_list_applies_to_existing_sessions() {
        let member = TestWallet::from_seed(12);
        let outsider = TestWallet::from_seed(13);
        let mut config = test_config();
        config.auth.wallet_allow_list = vec![member.address_string()];
        let harness = GateHarness::with_config(config);

        // A validly signed session for a wallet that is no longer allowed
        let sessions =
            SessionTokenService::new(TEST_SESSION_SECRET.as_bytes(), Duration::from_secs(600))
                .unwrap();
        let mut client = harness.client();
        client.fetch_csrf().await;
        client.set_cookie(SESSION_COOKIE, &sessions.issue(&outsider.address()).token);

        let response = client
            .post_json("/api/auth/refresh", &serde_json::json!({}))
            .await;
        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert_eq!(response.json()["message"], "Access denied");

        // Optional gate treats it as anonymous
        let me = client.get("/api/auth/me").await;
        assert_eq!(me.json()["authenticated"], false);
    }

    #[tokio::test]
    async fn test_owner_route() {
        let owner = TestWallet::from_seed(20);
        let visitor = TestWallet::from_seed(21);
        let mut config = test_config();
        config.auth.owner_address = Some(owner.address_string().to_uppercase().replacen("0X", "0x", 1));
        let harness = GateHarness::with_config(config);

        let mut anonymous = harness.client_from("198.51.100.20".parse().unwrap());
        let response = anonymous.get("/api/admin/session").await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);

        let mut client = harness.client_from("198.51.100.21".parse().unwrap());
        client.sign_in(&visitor).await;
        let response = client.get("/api/admin/session").await;
        assert_eq!(response.status, StatusCode::FORBIDDEN);

        let mut client = harness.client_from("198.51.100.22".parse().unwrap());
        client.sign_in(&owner).await;
        let response = client.get("/api/admin/session").await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json()["address"], owner.address_string());
    }
}
