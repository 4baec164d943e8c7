//! # Tiered Fixed-Window Rate Limiting
//!
//! Four independent policies share one [`RateLimitStore`]; keys are namespaced
//! by policy so their windows never interact.
//!
//! | Policy       | Key             | Budget              | Counts           |
//! |--------------|-----------------|---------------------|------------------|
//! | `general`    | client IP       | configured          | every request    |
//! | `auth`       | client IP       | 5 per 15 minutes    | failures only    |
//! | `rpc_proxy`  | client IP       | 10x general         | successes only   |
//! | `per_wallet` | wallet address  | configured          | every request    |
//!
//! The counter is incremented before the request runs, so concurrent requests
//! cannot slip past the budget. Policies that skip successes or failures undo
//! the increment once the outcome is known ([`RateLimiter::settle`]).

use super::address::Address;
use super::unix_now_millis;
use crate::ports::{RateLimitStore, StoreError};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fixed budget of the `auth` policy.
pub const AUTH_BUDGET: u32 = 5;

/// Fixed window of the `auth` policy.
pub const AUTH_WINDOW: Duration = Duration::from_secs(15 * 60);

/// `rpc_proxy` budget as a multiple of the general budget.
pub const RPC_PROXY_MULTIPLIER: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    General,
    Auth,
    RpcProxy,
    PerWallet,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Auth => "auth",
            Self::RpcProxy => "rpc_proxy",
            Self::PerWallet => "per_wallet",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which outcomes consume budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountMode {
    All,
    /// Successful responses are refunded.
    SkipSuccessful,
    /// Failed responses are refunded.
    SkipFailed,
}

/// One way of deriving an identity key from a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    Wallet,
    ClientIp,
}

/// The request facts key strategies draw from.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeySource<'a> {
    pub wallet: Option<&'a Address>,
    pub client_ip: Option<IpAddr>,
}

impl KeyStrategy {
    fn derive(&self, source: &KeySource<'_>) -> Option<String> {
        match self {
            Self::Wallet => source.wallet.map(|a| format!("wallet:{a}")),
            Self::ClientIp => source.client_ip.map(|ip| format!("ip:{ip}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub kind: PolicyKind,
    pub budget: u32,
    pub window: Duration,
    pub count_mode: CountMode,
    /// Evaluated in order; the first strategy yielding a key wins. When none
    /// does, the policy does not apply to the request.
    pub keys: Vec<KeyStrategy>,
}

impl RateLimitPolicy {
    pub fn general(budget: u32, window: Duration) -> Self {
        Self {
            kind: PolicyKind::General,
            budget,
            window,
            count_mode: CountMode::All,
            keys: vec![KeyStrategy::ClientIp],
        }
    }

    pub fn auth() -> Self {
        Self {
            kind: PolicyKind::Auth,
            budget: AUTH_BUDGET,
            window: AUTH_WINDOW,
            count_mode: CountMode::SkipSuccessful,
            keys: vec![KeyStrategy::ClientIp],
        }
    }

    pub fn rpc_proxy(general_budget: u32, window: Duration) -> Self {
        Self {
            kind: PolicyKind::RpcProxy,
            budget: general_budget.saturating_mul(RPC_PROXY_MULTIPLIER),
            window,
            count_mode: CountMode::SkipFailed,
            keys: vec![KeyStrategy::ClientIp],
        }
    }

    /// Keyed by wallet only; requests without an identity are left to `general`.
    pub fn per_wallet(budget: u32, window: Duration) -> Self {
        Self {
            kind: PolicyKind::PerWallet,
            budget,
            window,
            count_mode: CountMode::All,
            keys: vec![KeyStrategy::Wallet],
        }
    }

    /// Store key for this request, or `None` if the policy does not apply.
    pub fn derive_key(&self, source: &KeySource<'_>) -> Option<String> {
        self.keys
            .iter()
            .find_map(|s| s.derive(source))
            .map(|key| format!("{}:{key}", self.kind))
    }

    /// Whether an outcome keeps its count.
    pub fn counts(&self, success: bool) -> bool {
        match self.count_mode {
            CountMode::All => true,
            CountMode::SkipSuccessful => !success,
            CountMode::SkipFailed => success,
        }
    }
}

/// Outcome of a rate-limit check, carrying header values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the window resets (rounded up).
    pub reset_after_secs: u64,
}

impl RateDecision {
    /// `Retry-After` value for a rejection; never zero.
    pub fn retry_after_secs(&self) -> u64 {
        self.reset_after_secs.max(1)
    }
}

/// Handle for undoing a count once the request outcome is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitTicket {
    store_key: String,
    window_start_ms: u64,
}

/// One policy bound to a store.
#[derive(Clone)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    store: Arc<dyn RateLimitStore>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy, store: Arc<dyn RateLimitStore>) -> Self {
        Self { policy, store }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Count this request. `Ok(None)` means the policy does not apply.
    pub async fn check(
        &self,
        source: KeySource<'_>,
    ) -> Result<Option<(RateDecision, RateLimitTicket)>, StoreError> {
        self.check_at(source, unix_now_millis()).await
    }

    pub async fn check_at(
        &self,
        source: KeySource<'_>,
        now_ms: u64,
    ) -> Result<Option<(RateDecision, RateLimitTicket)>, StoreError> {
        let Some(store_key) = self.policy.derive_key(&source) else {
            debug!(policy = %self.policy.kind, "No key for request, policy skipped");
            return Ok(None);
        };

        let snap = self
            .store
            .increment(&store_key, self.policy.window, now_ms)
            .await?;

        let allowed = snap.count <= self.policy.budget;
        let decision = RateDecision {
            allowed,
            limit: self.policy.budget,
            remaining: self.policy.budget.saturating_sub(snap.count),
            reset_after_secs: snap.reset_at_ms.saturating_sub(now_ms).div_ceil(1000),
        };

        if !allowed {
            warn!(
                policy = %self.policy.kind,
                key = %store_key,
                count = snap.count,
                limit = self.policy.budget,
                "Rate limit exceeded"
            );
        }

        Ok(Some((
            decision,
            RateLimitTicket {
                store_key,
                window_start_ms: snap.window_start_ms,
            },
        )))
    }

    /// Refund the count if the policy skips this kind of outcome.
    pub async fn settle(&self, ticket: RateLimitTicket, success: bool) -> Result<(), StoreError> {
        if self.policy.counts(success) {
            return Ok(());
        }
        self.store
            .decrement(&ticket.store_key, ticket.window_start_ms)
            .await
    }
}

/// Periodically drop finished windows from `store`.
pub async fn cleanup_task(store: Arc<dyn RateLimitStore>, interval: Duration) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        if let Err(e) = store.prune(unix_now_millis()).await {
            warn!(error = %e, "Rate-limit store prune failed");
        }
    }
}
