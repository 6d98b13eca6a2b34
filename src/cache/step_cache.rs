//! Step Cache
//!
//! Content-addressed cache of step outputs, keyed by `CubeQueryStep`
//! identity. Entries are evicted least-recently-used first until the total
//! weight fits `max_weight`.

use crate::cache::weigher::{weigher_for, CacheWeigher};
use crate::cell::SliceToValue;
use crate::config::CacheConfig;
use crate::dag::CubeQueryStep;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    /// Outputs not admitted (too light, or heavier than the whole cache)
    pub rejected: u64,
    pub evictions: u64,
    pub entries: usize,
    pub weight: usize,
}

struct CacheEntry {
    output: Arc<SliceToValue>,
    weight: usize,
}

struct CacheInner {
    lru: LruCache<Arc<CubeQueryStep>, CacheEntry>,
    current_weight: usize,
    stats: CacheStats,
}

/// Thread-safe, weight-bounded step cache shared between queries
pub struct StepCache {
    inner: Mutex<CacheInner>,
    max_weight: usize,
    min_weight: usize,
    weigher: Arc<dyn CacheWeigher>,
}

impl std::fmt::Debug for StepCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("StepCache")
            .field("entries", &inner.lru.len())
            .field("weight", &inner.current_weight)
            .field("max_weight", &self.max_weight)
            .field("weigher", &self.weigher)
            .finish()
    }
}

impl StepCache {
    /// Create a cache with an explicit policy
    pub fn new(max_weight: usize, min_weight: usize, weigher: Arc<dyn CacheWeigher>) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                lru: LruCache::unbounded(),
                current_weight: 0,
                stats: CacheStats::default(),
            }),
            max_weight,
            min_weight,
            weigher,
        }
    }

    /// Create a cache from configuration
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_weight, config.min_weight, weigher_for(config.weigher))
    }

    /// Output of a structurally equal step, if cached
    pub fn get(&self, step: &CubeQueryStep) -> Option<Arc<SliceToValue>> {
        let mut inner = self.inner.lock();
        let found = inner.lru.get(step).map(|entry| entry.output.clone());
        match found {
            Some(output) => {
                inner.stats.hits += 1;
                tracing::debug!(step = %step, "Step cache hit");
                Some(output)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Store an output with no known evaluation cost
    pub fn put(&self, step: Arc<CubeQueryStep>, output: Arc<SliceToValue>) -> bool {
        self.put_with_cost(step, output, Duration::ZERO)
    }

    /// Store an output evaluated in `cost`.
    ///
    /// Returns whether the output was admitted.
    pub fn put_with_cost(&self, step: Arc<CubeQueryStep>, output: Arc<SliceToValue>, cost: Duration) -> bool {
        let weight = self.weigher.weigh(&output);
        let mut inner = self.inner.lock();

        if weight > self.max_weight || !self.weigher.admit(&output, cost, self.min_weight) {
            inner.stats.rejected += 1;
            tracing::trace!(step = %step, weight, "Step output not cached");
            return false;
        }

        if let Some(existing) = inner.lru.pop(&step) {
            inner.current_weight = inner.current_weight.saturating_sub(existing.weight);
        }

        while inner.current_weight + weight > self.max_weight {
            match inner.lru.pop_lru() {
                Some((evicted, entry)) => {
                    inner.current_weight = inner.current_weight.saturating_sub(entry.weight);
                    inner.stats.evictions += 1;
                    tracing::debug!(step = %evicted, weight = entry.weight, "Step cache eviction");
                }
                None => break,
            }
        }

        inner.current_weight += weight;
        inner.stats.puts += 1;
        inner.lru.put(step, CacheEntry { output, weight });
        true
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.lru.clear();
        inner.current_weight = 0;
    }

    /// Number of cached outputs
    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    /// Check for an empty cache
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current total weight
    pub fn weight(&self) -> usize {
        self.inner.lock().current_weight
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.lru.len(),
            weight: inner.current_weight,
            ..inner.stats
        }
    }
}
