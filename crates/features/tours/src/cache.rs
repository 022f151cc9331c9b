//! Bounded, TTL + LRU keyed store with per-entry access counters.
//!
//! Expiry is checked lazily on every read and eagerly by [`CacheStore::sweep_expired`].
//! On overflow the least-recently-accessed entry of the lowest priority tier is evicted;
//! a store whose writers all use the default priority is therefore plain LRU.

use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tourline_kernel::clock::SharedClock;
use tracing::trace;

/// Eviction tier hint. Lower tiers are evicted first.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum_macros::Display,
    strum_macros::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum CachePriority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: Duration,
    pub access_count: u64,
    pub last_accessed: Duration,
    pub priority: CachePriority,
}

impl<V> CacheEntry<V> {
    const fn new(value: V, now: Duration, priority: CachePriority) -> Self {
        Self { value, inserted_at: now, access_count: 0, last_accessed: now, priority }
    }

    fn is_expired(&self, now: Duration, ttl: Duration) -> bool {
        now.saturating_sub(self.inserted_at) >= ttl
    }
}

/// Snapshot of the store's lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheCounters {
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

#[derive(Debug)]
pub struct CacheStore<V> {
    entries: Mutex<FxHashMap<String, CacheEntry<V>>>,
    ttl: Duration,
    max_size: usize,
    clock: SharedClock,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<V: Clone> CacheStore<V> {
    /// Creates an empty store. A `max_size` of zero is treated as one.
    #[must_use]
    pub fn new(ttl: Duration, max_size: usize, clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
            ttl,
            max_size: max_size.max(1),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Returns the value and records the access, or `None` on a miss.
    ///
    /// An expired entry is removed here and counted as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let expired = match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now, self.ttl) => {
                entry.access_count += 1;
                entry.last_accessed = now;
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            },
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            trace!(key, "Cache entry expired on read");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Reads without touching access statistics.
    pub fn peek(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        self.entries
            .lock()
            .get(key)
            .filter(|entry| !entry.is_expired(now, self.ttl))
            .map(|entry| entry.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.entries.lock().get(key).is_some_and(|entry| !entry.is_expired(now, self.ttl))
    }

    /// Inserts with the default priority. Returns the evicted key, if any.
    pub fn insert(&self, key: impl Into<String>, value: V) -> Option<String> {
        self.insert_with_priority(key, value, CachePriority::default())
    }

    /// Inserts or refreshes an entry.
    ///
    /// Refreshing keeps the access history but restarts the TTL and adopts the new priority.
    /// A new key on a full store first drops expired entries, then evicts one victim.
    pub fn insert_with_priority(
        &self,
        key: impl Into<String>,
        value: V,
        priority: CachePriority,
    ) -> Option<String> {
        let key = key.into();
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get_mut(&key) {
            entry.value = value;
            entry.inserted_at = now;
            entry.priority = priority;
            return None;
        }

        let mut evicted = None;
        if entries.len() >= self.max_size {
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(now, self.ttl));
            self.expirations.fetch_add((before - entries.len()) as u64, Ordering::Relaxed);
        }
        if entries.len() >= self.max_size {
            let victim = entries
                .iter()
                .min_by(|(ka, a), (kb, b)| {
                    a.priority
                        .cmp(&b.priority)
                        .then(a.last_accessed.cmp(&b.last_accessed))
                        .then_with(|| ka.cmp(kb))
                })
                .map(|(k, _)| k.clone());
            if let Some(victim) = victim {
                entries.remove(&victim);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                trace!(key = %victim, "Cache entry evicted");
                evicted = Some(victim);
            }
        }

        entries.insert(key, CacheEntry::new(value, now, priority));
        evicted
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries.lock().remove(key).map(|entry| entry.value)
    }

    /// Removes every entry matching `predicate`; returns how many were removed.
    pub fn remove_where(&self, mut predicate: impl FnMut(&str, &V) -> bool) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, entry| !predicate(key, &entry.value));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Drops every expired entry; returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now, self.ttl));
        let removed = before - entries.len();
        self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn counters(&self) -> CacheCounters {
        CacheCounters {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    pub fn hit_rate(&self) -> f64 {
        self.counters().hit_rate()
    }

    pub fn reset_counters(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
    }

    /// Live keys ordered by access count (descending), ties by key.
    pub fn most_accessed(&self, limit: usize) -> Vec<(String, u64)> {
        let now = self.clock.now();
        let mut ranked: Vec<(String, u64)> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now, self.ttl))
            .map(|(key, entry)| (key.clone(), entry.access_count))
            .collect();
        ranked.sort_by(|(ka, a), (kb, b)| b.cmp(a).then_with(|| ka.cmp(kb)));
        ranked.truncate(limit);
        ranked
    }

    /// Live keys whose access count reached `threshold`.
    pub fn frequent(&self, threshold: u64) -> Vec<String> {
        let mut keys: Vec<String> = self
            .most_accessed(usize::MAX)
            .into_iter()
            .take_while(|(_, count)| *count >= threshold)
            .map(|(key, _)| key)
            .collect();
        keys.sort();
        keys
    }

    pub fn values(&self) -> Vec<V> {
        let now = self.clock.now();
        self.entries
            .lock()
            .values()
            .filter(|entry| !entry.is_expired(now, self.ttl))
            .map(|entry| entry.value.clone())
            .collect()
    }

    /// Copy of a live entry including its bookkeeping.
    pub fn entry(&self, key: &str) -> Option<CacheEntry<V>> {
        let now = self.clock.now();
        self.entries.lock().get(key).filter(|entry| !entry.is_expired(now, self.ttl)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tourline_kernel::clock::ManualClock;

    fn store(ttl_secs: u64, max: usize) -> (CacheStore<u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (CacheStore::new(Duration::from_secs(ttl_secs), max, clock.clone()), clock)
    }

    #[test]
    fn hit_updates_access_stats() {
        let (cache, clock) = store(60, 4);
        cache.insert("a", 1);
        clock.advance(Duration::from_secs(1));

        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("a"), Some(1));

        let entry = cache.entry("a").expect("entry present");
        assert_eq!(entry.access_count, 2);
        assert_eq!(entry.last_accessed, Duration::from_secs(1));
        assert_eq!(cache.counters().hits, 2);
    }

    #[test]
    fn expired_entry_is_a_miss_and_is_removed() {
        let (cache, clock) = store(10, 4);
        cache.insert("a", 1);

        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 0);

        let counters = cache.counters();
        assert_eq!(counters.misses, 1);
        assert_eq!(counters.expirations, 1);
    }

    #[test]
    fn overflow_evicts_least_recently_accessed() {
        let (cache, clock) = store(60, 3);
        for key in ["a", "b", "c"] {
            cache.insert(key, 0);
            clock.advance(Duration::from_millis(10));
        }
        // Touch "a" so "b" becomes the oldest access.
        cache.get("a");
        clock.advance(Duration::from_millis(10));

        let evicted = cache.insert("d", 0);
        assert_eq!(evicted.as_deref(), Some("b"));
        assert_eq!(cache.len(), 3);
        assert!(cache.contains("a") && cache.contains("c") && cache.contains("d"));
    }

    #[test]
    fn overflow_prefers_expired_entries() {
        let (cache, clock) = store(5, 2);
        cache.insert("old", 0);
        clock.advance(Duration::from_secs(3));
        cache.insert("fresh", 0);
        clock.advance(Duration::from_secs(3));

        assert_eq!(cache.insert("new", 0), None, "expired entry is dropped, not evicted");
        assert!(cache.contains("fresh"));
        assert_eq!(cache.counters().evictions, 0);
    }

    #[test]
    fn lower_priority_tier_is_evicted_first() {
        let (cache, clock) = store(60, 2);
        cache.insert_with_priority("bundle", 0, CachePriority::High);
        clock.advance(Duration::from_millis(5));
        cache.insert_with_priority("lazy", 0, CachePriority::Medium);
        clock.advance(Duration::from_millis(5));

        assert_eq!(cache.insert_with_priority("next", 0, CachePriority::Medium).as_deref(), Some("lazy"));
        assert!(cache.contains("bundle"));
    }

    #[test]
    fn sweep_removes_only_expired() {
        let (cache, clock) = store(10, 8);
        cache.insert("a", 1);
        clock.advance(Duration::from_secs(6));
        cache.insert("b", 2);
        clock.advance(Duration::from_secs(5));

        assert_eq!(cache.sweep_expired(), 1);
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
    }

    #[test]
    fn refresh_restarts_ttl_and_keeps_history() {
        let (cache, clock) = store(10, 4);
        cache.insert("a", 1);
        cache.get("a");
        clock.advance(Duration::from_secs(8));

        cache.insert_with_priority("a", 2, CachePriority::High);
        clock.advance(Duration::from_secs(8));

        let entry = cache.entry("a").expect("refreshed entry alive");
        assert_eq!(entry.value, 2);
        assert_eq!(entry.access_count, 1);
        assert_eq!(entry.priority, CachePriority::High);
    }

    #[test]
    fn most_accessed_and_frequent() {
        let (cache, _clock) = store(60, 8);
        cache.insert("a", 0);
        cache.insert("b", 0);
        cache.insert("c", 0);
        for _ in 0..3 {
            cache.get("b");
        }
        cache.get("a");

        assert_eq!(cache.most_accessed(2), vec![("b".to_owned(), 3), ("a".to_owned(), 1)]);
        assert_eq!(cache.frequent(3), vec!["b".to_owned()]);
    }
}
