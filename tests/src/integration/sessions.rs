//! # Session Lifecycle
//!
//! Refresh, logout and expiry of the stateless session cookie.

#[cfg(test)]
mod tests {
    use crate::harness::GateHarness;
    use axum::http::StatusCode;
    use serde_json::json;
    use std::time::Duration;
    use wallet_gate::testing::{TestWallet, TEST_SESSION_SECRET};
    use wallet_gate::{SessionTokenService, CSRF_COOKIE, SESSION_COOKIE};

    #[tokio::test]
    async fn test_refresh_reissues_cookie() {
        let harness = GateHarness::new();
        let mut client = harness.client();
        let wallet = TestWallet::from_seed(3);
        client.sign_in(&wallet).await;

        let response = client.post_json("/api/auth/refresh", &json!({})).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json()["address"], wallet.address_string());
        assert!(response.set_cookie(SESSION_COOKIE).is_some());
    }

    #[tokio::test]
    async fn test_refresh_requires_session() {
        let harness = GateHarness::new();
        let mut client = harness.client();
        client.fetch_csrf().await;

        let response = client.post_json("/api/auth/refresh", &json!({})).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.json()["message"], "Authentication required");
    }

    #[tokio::test]
    async fn test_logout_clears_cookies() {
        let harness = GateHarness::new();
        let mut client = harness.client();
        client.sign_in(&TestWallet::from_seed(4)).await;
        assert!(client.cookie(SESSION_COOKIE).is_some());

        let response = client.post_json("/api/auth/logout", &json!({})).await;
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.set_cookie(SESSION_COOKIE).unwrap().contains("Max-Age=0"));
        assert!(response.set_cookie(CSRF_COOKIE).unwrap().contains("Max-Age=0"));
        assert!(client.cookie(SESSION_COOKIE).is_none());

        let me = client.get("/api/auth/me").await;
        assert_eq!(me.json()["authenticated"], false);
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected() {
        let harness = GateHarness::new();
        let mut client = harness.client();
        let wallet = TestWallet::from_seed(5);
        client.fetch_csrf().await;

        // Same secret as the gate, issued two days ago with a one-day lifetime
        let sessions = SessionTokenService::new(
            TEST_SESSION_SECRET.as_bytes(),
            Duration::from_secs(24 * 3600),
        )
        .unwrap();
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let stale = sessions.issue_at(&wallet.address(), now - 2 * 24 * 3600);
        assert!(SessionTokenService::is_expired(&stale.token));
        client.set_cookie(SESSION_COOKIE, &stale.token);

        let response = client.post_json("/api/auth/refresh", &json!({})).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.json()["message"], "Invalid or expired session");

        let me = client.get("/api/auth/me").await;
        assert_eq!(me.json()["authenticated"], false);
    }

    #[tokio::test]
    async fn test_session_from_same_secret_is_accepted() {
        let harness = GateHarness::new();
        let mut client = harness.client();
        let wallet = TestWallet::from_seed(6);

        let sessions =
            SessionTokenService::new(TEST_SESSION_SECRET.as_bytes(), Duration::from_secs(600))
                .unwrap();
        client.set_cookie(SESSION_COOKIE, &sessions.issue(&wallet.address()).token);

        let me = client.get("/api/auth/me").await;
        assert_eq!(me.json()["authenticated"], true);
        assert_eq!(me.json()["address"], wallet.address_string());
    }
}
