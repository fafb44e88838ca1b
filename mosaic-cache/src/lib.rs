//! # Mosaic Cache (mosaic-cache)
//!
//! An in-process key/value cache with per-entry time-to-live, used to
//! memoize expensive derived results such as embeddings, sentiment labels
//! and summaries.
//!
//! ## Features
//!
//! - Request-driven TTL enforcement: an expired entry is removed by the
//!   lookup that observes it
//! - Optional LRU entry bound
//! - Background sweep for memory reclamation
//! - `CachedCall`, an explicit "memoize by key" wrapper for async functions
//!
//! ## Basic usage
//!
//! ```no_run
//! use mosaic_cache::{CacheConfig, ExpiringCache};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let cache: ExpiringCache<String> = ExpiringCache::new(CacheConfig::default());
//!
//! cache.set("greeting".to_string(), "hello".to_string()).await;
//! cache
//!     .set_with_ttl("short".to_string(), "lived".to_string(), Duration::from_secs(5))
//!     .await;
//!
//! assert_eq!(cache.get("greeting").await.as_deref(), Some("hello"));
//! # }
//! ```
//!
//! ## Memoizing a function
//!
//! ```no_run
//! use mosaic_cache::{CacheConfig, CachedCall, ExpiringCache};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let cache = Arc::new(ExpiringCache::new(CacheConfig::default()));
//! let embeddings = CachedCall::new(cache, "text-embeddings").with_ttl(Duration::from_secs(3600));
//!
//! let vector: Vec<f32> = embeddings
//!     .call("generate_embedding", &("hello world",), || async {
//!         Ok::<_, anyhow::Error>(vec![0.1, 0.2, 0.3])
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod error;

pub use cache::{
    start_auto_cleanup, CacheConfig, CacheConfigBuilder, CacheEntry, CacheKey, CacheKeyBuilder,
    CacheStats, CachedCall, ExpiringCache,
};
pub use error::{CacheError, Result};
