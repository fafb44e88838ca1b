//! Stored values and their expiry deadline

use chrono::{DateTime, Utc};
use std::time::Duration;

/// A value plus the wall-clock instant after which it is no longer served
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Successful lookups since the entry was stored
    pub reads: u64,
}

impl<V> CacheEntry<V> {
    /// Entry stored now that lives for `ttl`.
    ///
    /// A TTL too large to represent saturates to the maximum timestamp.
    pub fn new(value: V, ttl: Duration) -> Self {
        let stored_at = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| stored_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            value,
            stored_at,
            expires_at,
            reads: 0,
        }
    }

    /// Visible iff `now < expires_at`
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn is_live(&self) -> bool {
        self.is_live_at(Utc::now())
    }

    /// Time left before expiry, `None` once expired
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        if !self.is_live_at(now) {
            return None;
        }
        (self.expires_at - now).to_std().ok()
    }

    pub fn record_read(&mut self) {
        self.reads += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_until_deadline() {
        let entry = CacheEntry::new("embedding", Duration::from_secs(60));

        assert!(entry.is_live());
        assert!(entry.is_live_at(entry.expires_at - chrono::Duration::milliseconds(1)));
        // Gone at the exact deadline
        assert!(!entry.is_live_at(entry.expires_at));
    }

    #[test]
    fn test_zero_ttl() {
        let entry = CacheEntry::new(1_u8, Duration::ZERO);
        assert!(!entry.is_live_at(entry.stored_at));
        assert_eq!(entry.remaining_at(entry.stored_at), None);
    }

    #[test]
    fn test_unrepresentable_ttl_saturates() {
        let entry = CacheEntry::new((), Duration::from_secs(u64::MAX));
        assert_eq!(entry.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(entry.is_live());
    }

    #[test]
    fn test_remaining_counts_down() {
        let entry = CacheEntry::new((), Duration::from_secs(3600));
        let later = entry.stored_at + chrono::Duration::seconds(600);

        assert_eq!(entry.remaining_at(later), Some(Duration::from_secs(3000)));
    }

    #[test]
    fn test_record_read() {
        let mut entry = CacheEntry::new("summary".to_string(), Duration::from_secs(1));
        entry.record_read();
        entry.record_read();
        assert_eq!(entry.reads, 2);
    }
}
