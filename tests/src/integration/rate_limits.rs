//! # Rate Limiting
//!
//! The general policy on `/api`, the auth policy on sign-in and the
//! per-wallet policy on refresh, observed through full requests.

#[cfg(test)]
mod tests {
    use crate::harness::{verify_body, GateHarness};
    use axum::http::StatusCode;
    use serde_json::json;
    use wallet_gate::testing::{test_config, TestWallet, TEST_CHALLENGE};

    #[tokio::test]
    async fn test_general_budget_per_client() {
        let mut config = test_config();
        config.rate_limit.max_requests = 3;
        let harness = GateHarness::with_config(config);
        let mut client = harness.client();

        for expected_remaining in ["2", "1", "0"] {
            let response = client.get("/api/auth/message").await;
            assert_eq!(response.status, StatusCode::OK);
            assert_eq!(response.header("ratelimit-limit"), Some("3"));
            assert_eq!(response.header("ratelimit-remaining"), Some(expected_remaining));
        }

        let response = client.get("/api/auth/message").await;
        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.error_code(), "rate_limited");
        assert!(response.header("retry-after").is_some());
        assert!(response.header("ratelimit-reset").is_some());

        // Separate budget for another address
        let mut other = harness.client_from("198.51.100.30".parse().unwrap());
        assert_eq!(other.get("/api/auth/message").await.status, StatusCode::OK);

        // /health is outside /api
        assert_eq!(client.get("/health").await.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_auth_budget_counts_failures_only() {
        let harness = GateHarness::new();
        let mut client = harness.client();
        let wallet = TestWallet::from_seed(30);

        // Successes are free
        for _ in 0..6 {
            assert_eq!(client.sign_in(&wallet).await.status, StatusCode::OK);
        }

        // Five failures exhaust the budget
        let wrong = TestWallet::from_seed(31);
        for _ in 0..5 {
            let body = verify_body(
                &wallet.address_string(),
                &wrong.sign(TEST_CHALLENGE),
                TEST_CHALLENGE,
            );
            let response = client.post_json("/api/auth/verify", &body).await;
            assert_eq!(response.status, StatusCode::FORBIDDEN);
        }

        // Even a valid signature is now refused
        let response = client.sign_in(&wallet).await;
        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_per_wallet_budget_follows_the_wallet() {
        let mut config = test_config();
        config.rate_limit.max_requests = 10;
        let harness = GateHarness::with_config(config);
        let wallet = TestWallet::from_seed(32);

        // Two clients on different addresses share the wallet's budget; each
        // stays within its own general budget (2 + 6 requests)
        let mut laptop = harness.client_from("198.51.100.40".parse().unwrap());
        let mut phone = harness.client_from("198.51.100.41".parse().unwrap());
        laptop.sign_in(&wallet).await;
        phone.sign_in(&wallet).await;

        let mut statuses = Vec::new();
        for _ in 0..6 {
            statuses.push(laptop.post_json("/api/auth/refresh", &json!({})).await.status);
            statuses.push(phone.post_json("/api/auth/refresh", &json!({})).await.status);
        }
        let ok = statuses.iter().filter(|s| **s == StatusCode::OK).count();
        assert_eq!(ok, 10);
        assert!(statuses[..10].iter().all(|s| *s == StatusCode::OK));
        assert_eq!(statuses[10], StatusCode::TOO_MANY_REQUESTS);
    }
}
