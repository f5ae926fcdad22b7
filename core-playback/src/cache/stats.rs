//! Cache statistics and monitoring

use serde::{Deserialize, Serialize};

/// Occupancy counters of the resource cache.
///
/// Produced by [`ResourceCache::stats`](super::ResourceCache::stats) without
/// touching recency or counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of cached resources
    pub item_count: usize,

    /// Sum of `size_bytes` over cached resources
    pub total_bytes: u64,

    /// Configured memory ceiling
    pub ceiling_bytes: u64,

    /// Lookups that returned a resource
    pub hits: u64,

    /// Lookups that found nothing
    pub misses: u64,

    /// Entries removed to make room under the ceiling
    pub evictions: u64,

    /// Resources refused because they exceed the ceiling on their own
    pub rejections: u64,
}

impl CacheStats {
    /// Cache usage as a percentage of the ceiling.
    pub fn usage_percentage(&self) -> f64 {
        if self.ceiling_bytes == 0 {
            return 0.0;
        }

        (self.total_bytes as f64 / self.ceiling_bytes as f64) * 100.0
    }

    /// Returns true if the cache is near capacity (>90%).
    pub fn is_near_capacity(&self) -> bool {
        self.usage_percentage() > 90.0
    }

    /// Bytes that can be inserted without evicting anything.
    pub fn free_bytes(&self) -> u64 {
        self.ceiling_bytes.saturating_sub(self.total_bytes)
    }

    /// Hit rate percentage; 0 when nothing was looked up yet.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }

        (self.hits as f64 / lookups as f64) * 100.0
    }
}
