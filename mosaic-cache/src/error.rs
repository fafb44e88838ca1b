//! Error types for cache operations

use thiserror::Error;

/// Main error type for the cache crate
#[derive(Error, Debug)]
pub enum CacheError {
    /// Configuration rejected by `CacheConfig::validate`
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A cache key argument or a cached value could not be (de)serialized
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
