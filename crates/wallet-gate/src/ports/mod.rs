//! Ports: traits the gate depends on, implemented in [`crate::adapters`].

pub mod outbound;

pub use outbound::{HostResolver, RateLimitStore, ResolveError, StoreError, WindowSnapshot};
