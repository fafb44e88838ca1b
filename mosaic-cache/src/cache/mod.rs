//! # Expiring Cache
//!
//! Key/value store with per-entry time-to-live.
//!
//! - `get` serves an entry iff `now < expires_at`
//! - A lookup past expiry behaves as absent and removes the entry in the
//!   same critical section
//! - `start_auto_cleanup` only reclaims memory, lookups never depend on it
//! - `CacheConfig::max_entries` adds an LRU bound
//!
//! ```rust
//! use mosaic_cache::cache::{CacheConfig, ExpiringCache};
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let sentiments = ExpiringCache::new(
//!     CacheConfig::builder()
//!         .default_ttl(Duration::from_secs(3600))
//!         .max_entries(50_000)
//!         .build(),
//! );
//! sentiments.set("text-sentiment:classify:[\"great\"]".to_string(), "POSITIVE").await;
//!
//! assert_eq!(
//!     sentiments.get("text-sentiment:classify:[\"great\"]").await,
//!     Some("POSITIVE")
//! );
//! # }
//! ```

pub mod cached_call;
pub mod config;
pub mod entry;
pub mod store;
pub mod types;

pub use cached_call::{CacheKeyBuilder, CachedCall};
pub use config::{CacheConfig, CacheConfigBuilder};
pub use entry::CacheEntry;
pub use store::{start_auto_cleanup, ExpiringCache};
pub use types::{CacheKey, CacheStats};
