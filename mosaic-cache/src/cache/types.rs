use serde::{Deserialize, Serialize};

/// Fully qualified cache key, `namespace:function:arguments`
pub type CacheKey = String;

/// Counters kept by an `ExpiringCache`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    /// Includes lookups that found an expired entry
    pub misses: u64,
    pub entries: usize,
    /// Dropped by the LRU bound
    pub evictions_size: u64,
    /// Dropped because the TTL elapsed, on lookup or by the sweep
    pub evictions_ttl: u64,
    /// Removed by `delete` or `clear`
    pub invalidations: u64,
}

impl CacheStats {
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of lookups served from the cache, 0.0 when there were none
    pub fn hit_ratio(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            total => self.hits as f64 / total as f64,
        }
    }
}
