//! Client IP resolution with IP spoofing protection.
//!
//! Forwarding headers are believed only when the direct peer is a trusted
//! proxy. The result is inserted as a [`ClientIp`] extension for the rate
//! limiter and handlers.

use crate::domain::config::SecurityConfig;
use crate::domain::identity::ClientIp;
use crate::domain::network::is_private_ip;
use axum::{body::Body, extract::ConnectInfo, http::Request, response::Response};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tower::{Layer, Service};
use tracing::{debug, warn};

/// Trusted proxy configuration
#[derive(Clone, Debug, Default)]
pub struct TrustedProxies {
    /// Explicitly trusted proxy IPs
    pub proxies: Vec<IpAddr>,
    /// Trust private IPs (10.x.x.x, 192.168.x.x, 172.16-31.x.x, fc00::/7)
    pub trust_private: bool,
}

impl From<&SecurityConfig> for TrustedProxies {
    fn from(config: &SecurityConfig) -> Self {
        Self {
            proxies: config.trusted_proxies.clone(),
            trust_private: config.trust_private_ips,
        }
    }
}

impl TrustedProxies {
    pub fn is_trusted(&self, ip: IpAddr) -> bool {
        self.proxies.contains(&ip) || (self.trust_private && is_private_ip(&ip))
    }
}

/// IP protection layer
#[derive(Clone)]
pub struct IpProtectionLayer {
    config: Arc<TrustedProxies>,
}

impl IpProtectionLayer {
    pub fn new(config: TrustedProxies) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for IpProtectionLayer {
    type Service = IpProtectionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IpProtectionService {
            inner,
            config: Arc::clone(&self.config),
        }
    }
}

/// IP protection service
#[derive(Clone)]
pub struct IpProtectionService<S> {
    inner: S,
    config: Arc<TrustedProxies>,
}

impl<S> Service<Request<Body>> for IpProtectionService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let config = Arc::clone(&self.config);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            // Without ConnectInfo (in-process callers) the peer is treated as loopback
            let direct_ip = req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip())
                .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

            let client_ip = determine_client_ip(&req, direct_ip, &config);

            if !config.is_trusted(direct_ip) && req.headers().contains_key("x-forwarded-for") {
                warn!(
                    direct_ip = %direct_ip,
                    "Ignoring X-Forwarded-For from untrusted source"
                );
            }

            req.extensions_mut().insert(ClientIp(client_ip));
            inner.call(req).await
        })
    }
}

/// Resolve the client address.
///
/// For a trusted peer, walk `X-Forwarded-For` from the right and take the
/// first hop that is not itself a trusted proxy.
fn determine_client_ip<B>(req: &Request<B>, direct_ip: IpAddr, config: &TrustedProxies) -> IpAddr {
    if !config.is_trusted(direct_ip) {
        return direct_ip;
    }

    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        let hops: Vec<IpAddr> = forwarded
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        if let Some(ip) = hops.iter().rev().find(|ip| !config.is_trusted(**ip)) {
            debug!(forwarded = forwarded, client_ip = %ip, "Client IP from X-Forwarded-For");
            return *ip;
        }
        if let Some(first) = hops.first() {
            return *first;
        }
    }

    if let Some(ip) = req
        .headers()
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
    {
        return ip;
    }

    direct_ip
}
