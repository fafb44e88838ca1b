//! Main cache store implementation with request-driven expiry

use crate::cache::{
    config::CacheConfig,
    entry::CacheEntry,
    types::{CacheKey, CacheStats},
};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Key/value cache with per-entry TTL.
///
/// Every read-modify-write sequence (lookup, expiry check and removal in
/// `get`; eviction and insert in `set`) runs under a single write lock.
/// Cloning yields another handle onto the same storage.
pub struct ExpiringCache<V> {
    /// Cache configuration
    config: CacheConfig,

    /// Internal storage
    store: Arc<RwLock<CacheStore<V>>>,
}

impl<V> Clone for ExpiringCache<V> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

/// Internal cache storage
struct CacheStore<V> {
    /// Main storage: key -> entry
    entries: HashMap<CacheKey, CacheEntry<V>>,

    /// Access order, only maintained when an entry bound is configured
    lru_queue: VecDeque<CacheKey>,

    /// Current cache statistics
    stats: CacheStats,
}

impl<V> CacheStore<V> {
    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.lru_queue.retain(|k| k != key);
            self.stats.entries = self.entries.len();
        }
        removed
    }

    fn touch(&mut self, key: &str) {
        self.lru_queue.retain(|k| k != key);
        self.lru_queue.push_back(key.to_string());
    }
}

impl<V: Clone + Send + Sync> ExpiringCache<V> {
    /// Create a new cache with the given configuration
    pub fn new(config: CacheConfig) -> Self {
        info!(
            "Initialized expiring cache (default TTL: {:?}, max entries: {:?})",
            config.default_ttl, config.max_entries
        );

        let store = CacheStore {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            stats: CacheStats::default(),
        };

        Self {
            config,
            store: Arc::new(RwLock::new(store)),
        }
    }

    /// Cache configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Insert a value with the default TTL
    pub async fn set(&self, key: CacheKey, value: V) {
        self.set_with_ttl(key, value, self.config.default_ttl).await
    }

    /// Insert a value with a per-entry TTL, replacing any existing entry
    pub async fn set_with_ttl(&self, key: CacheKey, value: V, ttl: Duration) {
        let entry = CacheEntry::new(value, ttl);

        let mut guard = self.store.write().await;
        let store = &mut *guard;

        if let Some(max_entries) = self.config.max_entries {
            if !store.entries.contains_key(&key) {
                while store.entries.len() >= max_entries {
                    let Some(victim) = store.lru_queue.pop_front() else {
                        break;
                    };
                    debug!("Evicting entry due to max_entries limit: {}", victim);
                    store.remove_entry(&victim);
                    store.stats.evictions_size += 1;
                }
            }
            store.touch(&key);
        }

        if store.entries.insert(key.clone(), entry).is_some() {
            debug!("Updated cache entry: {} (TTL: {:?})", key, ttl);
        } else {
            debug!("Cached item: {} (TTL: {:?})", key, ttl);
        }
        store.stats.entries = store.entries.len();
    }

    /// Get a value from the cache.
    ///
    /// Returns `None` for unknown keys and for entries whose TTL has elapsed;
    /// the latter are removed before the lock is released.
    pub async fn get(&self, key: &str) -> Option<V> {
        let now = Utc::now();
        let mut guard = self.store.write().await;
        let store = &mut *guard;

        let expired = match store.entries.get(key) {
            Some(entry) => !entry.is_live_at(now),
            None => {
                debug!("Cache miss: {}", key);
                store.stats.misses += 1;
                return None;
            }
        };

        if expired {
            debug!("Cache entry expired: {}", key);
            store.remove_entry(key);
            store.stats.misses += 1;
            store.stats.evictions_ttl += 1;
            return None;
        }

        let entry = store.entries.get_mut(key)?;
        entry.record_read();
        let value = entry.value.clone();
        store.stats.hits += 1;

        if self.config.max_entries.is_some() {
            store.touch(key);
        }

        debug!("Cache hit: {}", key);
        Some(value)
    }

    /// Check if a live entry exists (without updating access metadata)
    pub async fn contains_key(&self, key: &str) -> bool {
        let now = Utc::now();
        let store = self.store.read().await;
        store
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_live_at(now))
    }

    /// Remove a specific entry, returning its value if it was present
    pub async fn delete(&self, key: &str) -> Option<V> {
        let mut store = self.store.write().await;

        let removed = store.remove_entry(key)?;
        store.stats.invalidations += 1;
        debug!("Removed from cache: {}", key);
        Some(removed.value)
    }

    /// Clear all entries from the cache
    pub async fn clear(&self) {
        let mut store = self.store.write().await;

        let count = store.entries.len();
        store.entries.clear();
        store.lru_queue.clear();
        store.stats.entries = 0;
        store.stats.invalidations += count as u64;

        info!("Cache cleared ({} entries)", count);
    }

    /// Remove all expired entries, returning how many were dropped
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut store = self.store.write().await;

        let expired_keys: Vec<CacheKey> = store
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_live_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            store.remove_entry(key);
        }
        store.stats.evictions_ttl += expired_keys.len() as u64;

        if !expired_keys.is_empty() {
            debug!("Swept {} expired entries", expired_keys.len());
        }

        expired_keys.len()
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        let store = self.store.read().await;
        store.stats.clone()
    }

    /// Number of stored entries, including expired ones not yet observed
    pub async fn len(&self) -> usize {
        let store = self.store.read().await;
        store.entries.len()
    }

    /// Check if cache is empty
    pub async fn is_empty(&self) -> bool {
        let store = self.store.read().await;
        store.entries.is_empty()
    }
}

/// Spawn the periodic sweep of expired entries.
///
/// Returns `None` when auto cleanup is disabled in the cache's config.
pub fn start_auto_cleanup<V>(cache: Arc<ExpiringCache<V>>) -> Option<JoinHandle<()>>
where
    V: Clone + Send + Sync + 'static,
{
    if !cache.config.enable_auto_cleanup {
        return None;
    }

    let interval = cache.config.cleanup_interval;
    info!("Starting cache sweeper (every {:?})", interval);

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = cache.cleanup_expired().await;
            if removed > 0 {
                let stats = cache.stats().await;
                debug!(
                    "Auto cleanup removed {} entries ({} left, hit ratio {:.2})",
                    removed,
                    stats.entries,
                    stats.hit_ratio()
                );
            }
        }
    }))
}
