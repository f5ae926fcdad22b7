//! LRU resource store with byte accounting.

use crate::cache::stats::CacheStats;
use crate::error::{PlaybackError, Result};
use bridge_traits::{AudioResource, Clock, SystemClock};
use chrono::{DateTime, Utc};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus, EvictionReason};
use core_runtime::logging::redact_url;
use lru::LruCache;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A cached resource and its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub resource: AudioResource,
    pub size_bytes: u64,
    /// Access tick, strictly increasing across the cache.
    pub last_accessed_at: u64,
    /// Wall-clock insertion time, diagnostics only.
    pub inserted_at: DateTime<Utc>,
}

/// Result of [`ResourceCache::put`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// The resource is cached; `evicted` lists keys removed to make room,
    /// least recently used first.
    Stored { evicted: Vec<String> },
    /// The resource alone exceeds the ceiling and was not cached.
    Rejected { size_bytes: u64, ceiling_bytes: u64 },
}

impl PutOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, PutOutcome::Stored { .. })
    }

    /// Evicted keys on success, [`PlaybackError::CacheRejected`] otherwise.
    pub fn into_result(self, key: &str) -> Result<Vec<String>> {
        match self {
            PutOutcome::Stored { evicted } => Ok(evicted),
            PutOutcome::Rejected {
                size_bytes,
                ceiling_bytes,
            } => Err(PlaybackError::CacheRejected {
                key: key.to_string(),
                size_bytes,
                ceiling_bytes,
            }),
        }
    }
}

struct CacheInner {
    // Iteration order is most to least recently used.
    entries: LruCache<String, CacheEntry>,
    total_bytes: u64,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    rejections: u64,
}

impl CacheInner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

/// Bounded key → resource store.
///
/// All operations are synchronous; the lock is never held across an
/// `.await`, so every mutation is atomic with respect to the scheduler.
/// Callers only ever receive cloned [`AudioResource`] handles.
pub struct ResourceCache {
    inner: Mutex<CacheInner>,
    ceiling_bytes: u64,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
}

impl ResourceCache {
    /// Create an empty cache holding at most `ceiling_bytes`.
    pub fn new(ceiling_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                // Capacity is enforced in bytes, not entries.
                entries: LruCache::unbounded(),
                total_bytes: 0,
                tick: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
                rejections: 0,
            }),
            ceiling_bytes,
            clock: Arc::new(SystemClock),
            event_bus: None,
        }
    }

    /// Use `clock` for `inserted_at` timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Publish eviction, rejection and clear events on `event_bus`.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn ceiling_bytes(&self) -> u64 {
        self.ceiling_bytes
    }

    /// Look up a resource and mark it most recently used.
    ///
    /// Never triggers a load.
    pub fn get(&self, key: &str) -> Option<AudioResource> {
        let mut inner = self.inner.lock();
        let tick = inner.next_tick();
        match inner.entries.get_mut(key) {
            Some(entry) => {
                entry.last_accessed_at = tick;
                let resource = entry.resource.clone();
                inner.hits += 1;
                debug!(key = %redact_url(key), "Cache hit");
                Some(resource)
            }
            None => {
                inner.misses += 1;
                debug!(key = %redact_url(key), "Cache miss");
                None
            }
        }
    }

    /// Whether `key` is cached. Does not affect recency or counters.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains(key)
    }

    /// Insert a resource, evicting least-recently-used entries until it fits.
    ///
    /// A resource larger than the ceiling is not cached and any existing
    /// entry for `key` is left untouched. Re-putting an existing key replaces
    /// the entry and makes it most recently used.
    pub fn put(&self, key: &str, resource: AudioResource, size_bytes: u64) -> PutOutcome {
        if size_bytes > self.ceiling_bytes {
            self.inner.lock().rejections += 1;
            warn!(
                key = %redact_url(key),
                size_bytes,
                ceiling_bytes = self.ceiling_bytes,
                "Resource exceeds cache ceiling, not cached"
            );
            self.emit(CacheEvent::Rejected {
                key: key.to_string(),
                size_bytes,
                ceiling_bytes: self.ceiling_bytes,
            });
            return PutOutcome::Rejected {
                size_bytes,
                ceiling_bytes: self.ceiling_bytes,
            };
        }

        let inserted_at = self.clock.now();
        let mut evicted = Vec::new();
        {
            let mut inner = self.inner.lock();

            if let Some(previous) = inner.entries.pop(key) {
                inner.total_bytes -= previous.size_bytes;
            }

            while inner.total_bytes + size_bytes > self.ceiling_bytes {
                let Some((victim_key, victim)) = inner.entries.pop_lru() else {
                    break;
                };
                inner.total_bytes -= victim.size_bytes;
                inner.evictions += 1;
                evicted.push((victim_key, victim.size_bytes));
            }

            let tick = inner.next_tick();
            inner.entries.push(
                key.to_string(),
                CacheEntry {
                    key: key.to_string(),
                    resource,
                    size_bytes,
                    last_accessed_at: tick,
                    inserted_at,
                },
            );
            inner.total_bytes += size_bytes;

            debug!(
                key = %redact_url(key),
                size_bytes,
                total_bytes = inner.total_bytes,
                evicted = evicted.len(),
                "Cached resource"
            );
        }

        for (victim_key, victim_size) in &evicted {
            debug!(key = %redact_url(victim_key), size_bytes = victim_size, "Evicted LRU entry");
            self.emit(CacheEvent::Evicted {
                key: victim_key.clone(),
                size_bytes: *victim_size,
                reason: EvictionReason::Capacity,
            });
        }

        PutOutcome::Stored {
            evicted: evicted.into_iter().map(|(k, _)| k).collect(),
        }
    }

    /// Remove `key`, dropping the cache's handle to it.
    ///
    /// Returns `true` if an entry was removed.
    pub fn evict(&self, key: &str) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            let removed = inner.entries.pop(key);
            if let Some(entry) = &removed {
                inner.total_bytes -= entry.size_bytes;
            }
            removed
        };

        match removed {
            Some(entry) => {
                debug!(key = %redact_url(key), "Evicted entry on request");
                self.emit(CacheEvent::Evicted {
                    key: entry.key,
                    size_bytes: entry.size_bytes,
                    reason: EvictionReason::Explicit,
                });
                true
            }
            None => false,
        }
    }

    /// Remove every entry. Returns the number of entries removed.
    pub fn clear(&self) -> usize {
        let (items, bytes) = {
            let mut inner = self.inner.lock();
            let items = inner.entries.len();
            let bytes = inner.total_bytes;
            inner.entries.clear();
            inner.total_bytes = 0;
            (items, bytes)
        };

        info!(items, bytes, "Cleared resource cache");
        self.emit(CacheEvent::Cleared { items, bytes });
        items
    }

    /// Current occupancy and counters. Side-effect free.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            item_count: inner.entries.len(),
            total_bytes: inner.total_bytes,
            ceiling_bytes: self.ceiling_bytes,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            rejections: inner.rejections,
        }
    }

    /// Snapshot of all entries in eviction order (next victim first).
    pub fn entries(&self) -> Vec<CacheEntry> {
        let inner = self.inner.lock();
        inner.entries.iter().rev().map(|(_, e)| e.clone()).collect()
    }

    fn emit(&self, event: CacheEvent) {
        if let Some(bus) = &self.event_bus {
            // No subscribers is fine.
            let _ = bus.emit(CoreEvent::Cache(event));
        }
    }
}

impl fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("ResourceCache")
            .field("item_count", &stats.item_count)
            .field("total_bytes", &stats.total_bytes)
            .field("ceiling_bytes", &self.ceiling_bytes)
            .finish()
    }
}
