//! In-process rate-limit store backed by a sharded concurrent map.
//!
//! `DashMap::entry` holds the shard write lock for the whole
//! read-modify-write, so increments for one key are serialized.

use crate::ports::{RateLimitStore, StoreError, WindowSnapshot};
use dashmap::DashMap;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Window {
    start_ms: u64,
    length_ms: u64,
    count: u32,
}

impl Window {
    fn end_ms(&self) -> u64 {
        self.start_ms.saturating_add(self.length_ms)
    }
}

/// Fixed-window counters held in memory.
#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    windows: DashMap<String, Window>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn increment(
        &self,
        key: &str,
        window: Duration,
        now_ms: u64,
    ) -> Result<WindowSnapshot, StoreError> {
        let length_ms = window.as_millis() as u64;
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            start_ms: now_ms,
            length_ms,
            count: 0,
        });

        if now_ms > entry.end_ms() {
            *entry = Window {
                start_ms: now_ms,
                length_ms,
                count: 0,
            };
        }
        entry.count = entry.count.saturating_add(1);

        Ok(WindowSnapshot {
            count: entry.count,
            window_start_ms: entry.start_ms,
            reset_at_ms: entry.end_ms(),
        })
    }

    async fn decrement(&self, key: &str, window_start_ms: u64) -> Result<(), StoreError> {
        if let Some(mut entry) = self.windows.get_mut(key) {
            if entry.start_ms == window_start_ms {
                entry.count = entry.count.saturating_sub(1);
            }
        }
        Ok(())
    }

    async fn prune(&self, now_ms: u64) -> Result<usize, StoreError> {
        let before = self.windows.len();
        self.windows.retain(|_, w| now_ms <= w.end_ms());
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!(removed, "Pruned expired rate-limit windows");
        }
        Ok(removed)
    }

    async fn len(&self) -> usize {
        self.windows.len()
    }
}
