//! Bounded, time-boxed memo of completed investigations keyed by address.

use crate::oracle::types::InvestigationResult;
use crate::types::TokenAddress;
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Process-wide result cache.
///
/// Entries expire after a fixed TTL (checked lazily on read) and the least
/// recently used entry is evicted once capacity is exceeded. Concurrent
/// initialisations of the same key are coalesced: later callers await the
/// first caller's pipeline instead of starting their own.
#[derive(Clone)]
pub struct ResultCache {
    inner: Cache<TokenAddress, InvestigationResult>,
}

impl ResultCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { inner }
    }

    pub async fn get(&self, key: &TokenAddress) -> Option<InvestigationResult> {
        let hit = self.inner.get(key).await;
        debug!("Result cache {} for {}", if hit.is_some() { "hit" } else { "miss" }, key);
        hit
    }

    pub async fn set(&self, key: TokenAddress, value: InvestigationResult) {
        self.inner.insert(key, value).await;
    }

    /// Return the cached value or run `init` once for all concurrent callers.
    pub async fn get_or_compute<F>(&self, key: TokenAddress, init: F) -> InvestigationResult
    where
        F: Future<Output = InvestigationResult>,
    {
        self.inner.get_with(key, init).await
    }

    /// Approximate number of live entries.
    pub async fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }
}
