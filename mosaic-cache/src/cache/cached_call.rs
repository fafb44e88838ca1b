//! Explicit memoization of expensive async calls
//!
//! `CachedCall` pairs a namespace and a TTL with a shared
//! `ExpiringCache<serde_json::Value>`. Identical arguments within the TTL
//! window return the stored result without re-running the computation.
//! Concurrent misses on the same key each compute; the last writer wins.

use crate::cache::{store::ExpiringCache, types::CacheKey};
use crate::error::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Deterministic cache key builder: `namespace:function[:args]`
///
/// Arguments are rendered as a JSON array, so callers should pass ordered
/// types (tuples, structs, vectors) rather than hash maps.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    namespace: String,
    function: Option<String>,
    args: Vec<serde_json::Value>,
}

impl CacheKeyBuilder {
    /// Create a new cache key builder
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            function: None,
            args: Vec::new(),
        }
    }

    /// Set the function name component
    pub fn function(mut self, name: impl Into<String>) -> Self {
        self.function = Some(name.into());
        self
    }

    /// Append one argument
    pub fn arg<A: Serialize + ?Sized>(mut self, arg: &A) -> Result<Self> {
        self.args.push(serde_json::to_value(arg)?);
        Ok(self)
    }

    /// Build the cache key
    pub fn build(self) -> CacheKey {
        let mut key = self.namespace;

        if let Some(function) = self.function {
            key.push(':');
            key.push_str(&function);
        }

        if !self.args.is_empty() {
            key.push(':');
            key.push_str(&serde_json::Value::Array(self.args).to_string());
        }

        key
    }
}

/// Memoizing wrapper around a shared JSON cache
#[derive(Clone)]
pub struct CachedCall {
    cache: Arc<ExpiringCache<serde_json::Value>>,
    namespace: String,
    ttl: Option<Duration>,
}

impl CachedCall {
    /// Create a wrapper that stores results under `namespace` with the
    /// cache's default TTL
    pub fn new(cache: Arc<ExpiringCache<serde_json::Value>>, namespace: impl Into<String>) -> Self {
        Self {
            cache,
            namespace: namespace.into(),
            ttl: None,
        }
    }

    /// Override the TTL used for entries written by this wrapper
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Namespace this wrapper writes under
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Key used for `function` called with `args`
    pub fn key_for<A: Serialize + ?Sized>(&self, function: &str, args: &A) -> Result<CacheKey> {
        Ok(CacheKeyBuilder::new(self.namespace.as_str())
            .function(function)
            .arg(args)?
            .build())
    }

    /// Return the cached result for (`function`, `args`) or run `compute`
    /// and store its output.
    ///
    /// Errors from `compute` are returned as-is and never cached. A result
    /// that serializes to JSON `null` is not cached either. Key or value
    /// serialization problems degrade to an uncached call.
    pub async fn call<A, T, E, F, Fut>(&self, function: &str, args: &A, compute: F) -> std::result::Result<T, E>
    where
        A: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let key = match self.key_for(function, args) {
            Ok(key) => key,
            Err(e) => {
                warn!("Uncacheable arguments for {}:{}: {}", self.namespace, function, e);
                return compute().await;
            }
        };

        if let Some(cached) = self.cache.get(&key).await {
            match serde_json::from_value::<T>(cached) {
                Ok(value) => {
                    debug!("Cache hit: {}", key);
                    return Ok(value);
                }
                Err(e) => {
                    warn!("Discarding undecodable cache entry {}: {}", key, e);
                    self.cache.delete(&key).await;
                }
            }
        }

        debug!("Cache miss: {}", key);
        let value = compute().await?;

        match serde_json::to_value(&value) {
            Ok(serde_json::Value::Null) => {}
            Ok(encoded) => match self.ttl {
                Some(ttl) => self.cache.set_with_ttl(key, encoded, ttl).await,
                None => self.cache.set(key, encoded).await,
            },
            Err(e) => warn!("Result for {} not cached: {}", key, e),
        }

        Ok(value)
    }
}
