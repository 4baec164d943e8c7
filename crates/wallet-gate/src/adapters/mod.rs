//! Adapters implementing the outbound ports.

pub mod dns;
pub mod memory_store;

pub use dns::SystemResolver;
pub use memory_store::MemoryRateLimitStore;
