//! Rate caching with TTL support.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use dashmap::DashMap;
use fxwallet_common::{Clock, CurrencyPair, SystemClock, Timestamp};
use tracing::debug;

use crate::error::FxResult;
use crate::provider::{ExchangeRate, RateSource, SharedRateSource};

#[derive(Debug, Clone)]
struct CacheEntry {
    rate: ExchangeRate,
    cached_at: Timestamp,
}

/// TTL cache in front of another rate source.
///
/// Only successful lookups are cached.
pub struct CachedRateSource {
    inner: SharedRateSource,
    entries: DashMap<CurrencyPair, CacheEntry>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl CachedRateSource {
    pub fn new(inner: SharedRateSource, ttl: Duration) -> Self {
        Self::with_clock(inner, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(inner: SharedRateSource, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            entries: DashMap::new(),
            ttl,
            clock,
        }
    }

    fn lookup(&self, pair: &CurrencyPair, now: Timestamp) -> Option<ExchangeRate> {
        let entry = self.entries.get(pair)?;
        if now.signed_duration_since(entry.cached_at) < self.ttl {
            return Some(entry.rate.clone());
        }
        drop(entry);
        self.entries.remove(pair);
        None
    }

    /// Drop the cached rate for a pair.
    pub fn invalidate(&self, pair: &CurrencyPair) {
        self.entries.remove(pair);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove entries older than the TTL.
    pub fn evict_expired(&self) {
        let now = self.clock.now();
        self.entries
            .retain(|_, entry| now.signed_duration_since(entry.cached_at) < self.ttl);
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let total = self.entries.len();
        let valid = self
            .entries
            .iter()
            .filter(|e| now.signed_duration_since(e.cached_at) < self.ttl)
            .count();

        CacheStats {
            total_entries: total,
            valid_entries: valid,
            expired_entries: total - valid,
        }
    }
}

#[async_trait]
impl RateSource for CachedRateSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get_rate(&self, pair: &CurrencyPair) -> FxResult<ExchangeRate> {
        let now = self.clock.now();
        if let Some(rate) = self.lookup(pair, now) {
            debug!(pair = %pair, "Rate cache hit");
            return Ok(rate);
        }

        debug!(pair = %pair, "Rate cache miss");
        let rate = self.inner.get_rate(pair).await?;
        self.entries.insert(
            pair.clone(),
            CacheEntry {
                rate: rate.clone(),
                cached_at: now,
            },
        );
        Ok(rate)
    }
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
}
