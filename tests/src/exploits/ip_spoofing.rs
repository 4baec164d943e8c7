//! # Client IP Spoofing
//!
//! Attack vectors against per-client rate limiting:
//! - Rotating `X-Forwarded-For` / `X-Real-IP` from a direct connection
//! - Prepending fake hops in front of a trusted proxy's entry

#[cfg(test)]
mod tests {
    use crate::harness::GateHarness;
    use axum::http::StatusCode;
    use std::net::IpAddr;
    use wallet_gate::testing::test_config;

    const PROXY: &str = "10.0.0.1";

    fn limited(budget: u32, proxies: &[&str]) -> GateHarness {
        let mut config = test_config();
        config.rate_limit.max_requests = budget;
        config.security.trusted_proxies = proxies
            .iter()
            .map(|p| p.parse::<IpAddr>().unwrap())
            .collect();
        GateHarness::with_config(config)
    }

    #[tokio::test]
    async fn test_forwarding_headers_ignored_from_untrusted_peer() {
        let harness = limited(3, &[]);
        let mut attacker = harness.client();

        let mut statuses = Vec::new();
        for i in 0..6 {
            let fake = format!("198.51.100.{}", 100 + i);
            let response = attacker
                .get_with(
                    "/api/auth/message",
                    &[("x-forwarded-for", fake.as_str()), ("x-real-ip", fake.as_str())],
                )
                .await;
            statuses.push(response.status);
        }
        assert_eq!(
            statuses.iter().filter(|s| **s == StatusCode::OK).count(),
            3,
            "{statuses:?}"
        );
        assert_eq!(statuses[3], StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_trusted_proxy_forwards_real_clients() {
        let harness = limited(2, &[PROXY]);
        let mut proxy = harness.client_from(PROXY.parse().unwrap());

        for _ in 0..2 {
            let r = proxy
                .get_with("/api/auth/message", &[("x-forwarded-for", "198.51.100.1")])
                .await;
            assert_eq!(r.status, StatusCode::OK);
        }
        let r = proxy
            .get_with("/api/auth/message", &[("x-forwarded-for", "198.51.100.1")])
            .await;
        assert_eq!(r.status, StatusCode::TOO_MANY_REQUESTS);

        // A different client behind the same proxy has its own budget
        let r = proxy
            .get_with("/api/auth/message", &[("x-forwarded-for", "198.51.100.2")])
            .await;
        assert_eq!(r.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_prepended_hops_do_not_change_identity() {
        let harness = limited(2, &[PROXY]);
        let mut proxy = harness.client_from(PROXY.parse().unwrap());

        // The proxy appends the real peer; anything to its left is client-supplied
        let mut statuses = Vec::new();
        for i in 0..4 {
            let chain = format!("192.0.2.{i}, 198.51.100.9");
            let r = proxy
                .get_with("/api/auth/message", &[("x-forwarded-for", chain.as_str())])
                .await;
            statuses.push(r.status);
        }
        assert_eq!(
            statuses,
            vec![
                StatusCode::OK,
                StatusCode::OK,
                StatusCode::TOO_MANY_REQUESTS,
                StatusCode::TOO_MANY_REQUESTS
            ]
        );
    }
}
