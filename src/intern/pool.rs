//! Bounded string interning pool with a configurable eviction policy.

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// How the pool makes room once it holds `capacity` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Evict the least recently used value, one at a time.
    Lru,
    /// Drop the least recently used half of the pool in one sweep.
    PurgeHalf,
}

/// Statistics for pool effectiveness.
#[derive(Debug, Clone, Default)]
pub struct InternStats {
    /// Total number of intern calls
    pub lookups: u64,
    /// Calls answered with an already pooled value
    pub hits: u64,
    /// Calls that allocated a new value
    pub misses: u64,
    /// Values dropped from the pool
    pub evictions: u64,
}

impl InternStats {
    /// Calculate the hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

#[derive(Debug, Default)]
struct PoolInner {
    values: HashSet<Arc<str>>,
    /// Recency queue (most recently used at the back)
    recency: VecDeque<Arc<str>>,
    stats: InternStats,
}

/// Thread-safe interning pool.
///
/// # Examples
///
/// ```
/// use recordtape::intern::{EvictionPolicy, InternPool};
/// use std::sync::Arc;
///
/// let pool = InternPool::new(1024, EvictionPolicy::Lru);
/// let a = pool.intern("Prague");
/// let b = pool.intern("Prague");
/// assert!(Arc::ptr_eq(&a, &b));
/// ```
#[derive(Debug)]
pub struct InternPool {
    /// Maximum number of pooled values; 0 disables pooling
    capacity: usize,
    policy: EvictionPolicy,
    inner: Mutex<PoolInner>,
}

impl InternPool {
    /// Create a pool holding at most `capacity` distinct values.
    pub fn new(capacity: usize, policy: EvictionPolicy) -> Self {
        Self { capacity, policy, inner: Mutex::new(PoolInner::default()) }
    }

    /// Return the shared instance of `value`, pooling it if absent.
    pub fn intern(&self, value: &str) -> Arc<str> {
        if self.capacity == 0 {
            let mut inner = self.inner.lock();
            inner.stats.lookups += 1;
            inner.stats.misses += 1;
            return Arc::from(value);
        }

        let mut inner = self.inner.lock();
        inner.stats.lookups += 1;

        if let Some(existing) = inner.values.get(value).cloned() {
            inner.stats.hits += 1;
            // O(n) scan of the recency queue
            if let Some(pos) = inner.recency.iter().position(|v| Arc::ptr_eq(v, &existing)) {
                inner.recency.remove(pos);
            }
            inner.recency.push_back(existing.clone());
            return existing;
        }

        inner.stats.misses += 1;
        if inner.values.len() >= self.capacity {
            self.make_room(&mut inner);
        }

        let shared: Arc<str> = Arc::from(value);
        inner.values.insert(shared.clone());
        inner.recency.push_back(shared.clone());
        shared
    }

    fn make_room(&self, inner: &mut PoolInner) {
        let to_evict = match self.policy {
            EvictionPolicy::Lru => 1,
            EvictionPolicy::PurgeHalf => (inner.recency.len() / 2).max(1),
        };
        for _ in 0..to_evict {
            match inner.recency.pop_front() {
                Some(old) => {
                    inner.values.remove(&old);
                    inner.stats.evictions += 1;
                }
                None => break,
            }
        }
        log::trace!("intern pool evicted {} values ({:?})", to_evict, self.policy);
    }

    /// Returns true if `value` is currently pooled.
    pub fn contains(&self, value: &str) -> bool {
        self.inner.lock().values.contains(value)
    }

    /// Number of pooled values.
    pub fn len(&self) -> usize {
        self.inner.lock().values.len()
    }

    /// Check if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the pool capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the eviction policy.
    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Get current statistics.
    pub fn stats(&self) -> InternStats {
        self.inner.lock().stats.clone()
    }

    /// Drop every pooled value. Statistics are kept.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.values.clear();
        inner.recency.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_shares_instances() {
        let pool = InternPool::new(16, EvictionPolicy::Lru);
        let a = pool.intern("abc");
        let b = pool.intern("abc");
        let c = pool.intern("xyz");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));

        let stats = pool.stats();
        assert_eq!(stats.lookups, 3);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_lru_eviction() {
        let pool = InternPool::new(3, EvictionPolicy::Lru);
        pool.intern("a");
        pool.intern("b");
        pool.intern("c");

        // Touch "a" so "b" becomes the oldest
        pool.intern("a");
        pool.intern("d");

        assert!(pool.contains("a"));
        assert!(!pool.contains("b"));
        assert!(pool.contains("c"));
        assert!(pool.contains("d"));
        assert_eq!(pool.stats().evictions, 1);
    }

    #[test]
    fn test_purge_half_eviction() {
        let pool = InternPool::new(4, EvictionPolicy::PurgeHalf);
        for v in ["a", "b", "c", "d"] {
            pool.intern(v);
        }
        pool.intern("e");

        assert_eq!(pool.len(), 3);
        assert!(!pool.contains("a"));
        assert!(!pool.contains("b"));
        assert!(pool.contains("c"));
        assert!(pool.contains("e"));
        assert_eq!(pool.stats().evictions, 2);
    }

    #[test]
    fn test_disabled_pool() {
        let pool = InternPool::new(0, EvictionPolicy::Lru);
        let a = pool.intern("same");
        let b = pool.intern("same");
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(pool.is_empty());
        assert_eq!(pool.stats().hit_rate(), 0.0);
    }

    #[test]
    fn test_pools_are_isolated() {
        let first = InternPool::new(8, EvictionPolicy::Lru);
        let second = InternPool::new(8, EvictionPolicy::Lru);
        first.intern("value");
        assert!(!second.contains("value"));
    }

    #[test]
    fn test_concurrent_intern() {
        let pool = Arc::new(InternPool::new(64, EvictionPolicy::Lru));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        pool.intern(&format!("v{}", i % 10));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(pool.len(), 10);
        assert_eq!(pool.stats().lookups, 400);
    }
}
