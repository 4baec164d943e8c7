//! System resolver adapter built on `tokio::net::lookup_host`.

use crate::ports::{HostResolver, ResolveError};
use std::net::IpAddr;

/// Resolves hostnames through the operating system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait::async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
        // lookup_host needs a port; it is discarded
        let addrs = tokio::net::lookup_host((host, 443))
            .await
            .map_err(|e| ResolveError {
                host: host.to_string(),
                reason: e.to_string(),
            })?;

        let ips: Vec<IpAddr> = addrs.map(|a| a.ip()).collect();
        if ips.is_empty() {
            return Err(ResolveError {
                host: host.to_string(),
                reason: "no addresses".to_string(),
            });
        }
        Ok(ips)
    }
}
