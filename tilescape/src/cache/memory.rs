//! Bounded in-memory tile cache with write-behind spill.
//!
//! Entries are evicted oldest-fetch-first: the mapping and an explicit
//! recency queue are kept consistent under a single mutex, and a `get`
//! refreshes the entry's position in the queue. When the cache is full and
//! auto-clear is enabled, a configurable fraction of capacity (at least one
//! entry) is evicted in one pass; evicted entries are handed to an attached
//! [`DiskCache`] when spilling is enabled, otherwise dropped.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::tile::{Bitmap, TileKey};

use super::{CacheStats, DiskCache, DEFAULT_CLEAR_FACTOR};

/// Mapping and recency queue, mutated together under one lock.
struct Inner {
    map: HashMap<TileKey, Arc<Bitmap>>,
    order: VecDeque<TileKey>,
    capacity: usize,
    stats: CacheStats,
}

impl Inner {
    /// Remove the oldest entry, if any.
    fn pop_oldest(&mut self) -> Option<(TileKey, Arc<Bitmap>)> {
        let key = self.order.pop_front()?;
        let bitmap = self.map.remove(&key)?;
        self.stats.evictions += 1;
        Some((key, bitmap))
    }
}

/// Bounded memory tier of the tile cache.
pub struct MemoryCache {
    inner: Mutex<Inner>,
    auto_clear: bool,
    clear_factor: f64,
    use_disk: AtomicBool,
    disk: RwLock<Option<Arc<DiskCache>>>,
}

impl MemoryCache {
    /// Create a cache holding at most `capacity` tiles, with the default
    /// eviction policy (auto-clear enabled, 15% clear factor, spill
    /// enabled once a disk tier is attached).
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, true, DEFAULT_CLEAR_FACTOR, true)
    }

    /// Create a cache with an explicit eviction policy.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of cached tiles
    /// * `auto_clear` - Evict a batch (`clear_factor` of capacity) when
    ///   full instead of a single entry
    /// * `clear_factor` - Fraction of capacity removed per auto-clear pass
    /// * `use_disk` - Whether evicted entries spill to an attached disk tier
    pub fn with_policy(capacity: usize, auto_clear: bool, clear_factor: f64, use_disk: bool) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
                capacity,
                stats: CacheStats::default(),
            }),
            auto_clear,
            clear_factor,
            use_disk: AtomicBool::new(use_disk),
            disk: RwLock::new(None),
        }
    }

    /// Attach the persistent tier that receives spilled entries.
    pub fn attach_disk(&self, disk: Arc<DiskCache>) {
        *self.disk.write() = Some(disk);
    }

    /// Enable or disable spilling evictions to the attached disk tier.
    pub fn set_use_disk(&self, use_disk: bool) {
        self.use_disk.store(use_disk, Ordering::SeqCst);
    }

    /// Whether evictions spill to the attached disk tier.
    pub fn use_disk(&self) -> bool {
        self.use_disk.load(Ordering::SeqCst)
    }

    /// Look up a tile, refreshing its recency on a hit.
    ///
    /// A miss has no side effect beyond the miss counter.
    pub fn get(&self, key: &TileKey) -> Option<Arc<Bitmap>> {
        let mut inner = self.inner.lock();
        if let Some(bitmap) = inner.map.get(key).cloned() {
            // Move to the back of the recency queue.
            if let Some(pos) = inner.order.iter().position(|k| k == key) {
                let _ = inner.order.remove(pos);
            }
            inner.order.push_back(*key);
            inner.stats.hits += 1;
            Some(bitmap)
        } else {
            inner.stats.misses += 1;
            None
        }
    }

    /// Insert a tile unless the key is already present (first write wins).
    ///
    /// At capacity, at least one slot is freed before the insert; if the
    /// cache still exceeds capacity immediately after the insert (capacity
    /// zero), the surplus is evicted before the call returns, so the size
    /// bound holds whenever this method is not executing.
    pub fn put(&self, key: TileKey, bitmap: Arc<Bitmap>) {
        let evicted = {
            let mut inner = self.inner.lock();
            if inner.map.contains_key(&key) {
                return;
            }

            let mut evicted = Vec::new();
            let capacity = inner.capacity;
            // Free one slot up front.
            while inner.map.len() + 1 > capacity && !inner.map.is_empty() {
                self.evict_pass(&mut inner, &mut evicted);
            }

            inner.order.push_back(key);
            inner.map.insert(key, bitmap);

            // capacity == 0: the entry cannot stay.
            while inner.map.len() > capacity {
                self.evict_pass(&mut inner, &mut evicted);
            }
            evicted
        };
        self.spill(evicted);
    }

    /// Evict exactly `amount` of the oldest entries (or all, if fewer are
    /// cached), spilling them like any other eviction.
    pub fn remove(&self, amount: usize) {
        let evicted = {
            let mut inner = self.inner.lock();
            let mut evicted = Vec::new();
            for _ in 0..amount {
                match inner.pop_oldest() {
                    Some(entry) => evicted.push(entry),
                    None => break,
                }
            }
            evicted
        };
        self.spill(evicted);
    }

    /// Drop every entry without spilling.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.order.clear();
    }

    /// Change the capacity. Shrinking evicts down to the new limit before
    /// this call returns; growing takes effect on the next eviction check.
    pub fn set_capacity(&self, capacity: usize) {
        let evicted = {
            let mut inner = self.inner.lock();
            inner.capacity = capacity;
            let mut evicted = Vec::new();
            while inner.map.len() > capacity {
                self.evict_pass(&mut inner, &mut evicted);
            }
            evicted
        };
        self.spill(evicted);
    }

    /// Current number of cached tiles.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    /// Whether the cache holds no tiles.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Snapshot of the traffic counters.
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }

    /// One eviction pass: a batch of `clear_factor * capacity` entries
    /// (floor one) when auto-clear is on, a single entry otherwise. Stops
    /// early only when the cache empties.
    fn evict_pass(&self, inner: &mut Inner, evicted: &mut Vec<(TileKey, Arc<Bitmap>)>) {
        let batch = if self.auto_clear {
            ((inner.capacity as f64 * self.clear_factor) as usize).max(1)
        } else {
            1
        };

        for _ in 0..batch {
            match inner.pop_oldest() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
    }

    /// Hand evicted entries to the disk tier, outside the cache lock.
    fn spill(&self, evicted: Vec<(TileKey, Arc<Bitmap>)>) {
        if evicted.is_empty() {
            return;
        }
        if !self.use_disk() {
            return;
        }
        let disk = self.disk.read().clone();
        let Some(disk) = disk else { return };

        let mut inner = self.inner.lock();
        inner.stats.spills += evicted.len() as u64;
        drop(inner);

        for (key, bitmap) in evicted {
            debug!(tile_x = key.coord.x, tile_y = key.coord.y, zoom = key.coord.zoom, "spilling evicted tile");
            disk.put(&key, bitmap);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::TileCoord;
    use crate::tile::{RenderParams, SourceId};
    use proptest::prelude::*;

    fn key(x: u32) -> TileKey {
        TileKey::new(
            TileCoord::new(x, 0, 10),
            SourceId::new(1),
            RenderParams::default(),
        )
    }

    fn bitmap(tag: u8) -> Arc<Bitmap> {
        Arc::new(Bitmap::solid(1, 1, [tag, 0, 0, 255]))
    }

    #[test]
    fn test_put_then_get() {
        let cache = MemoryCache::new(4);
        let b = bitmap(7);

        cache.put(key(1), Arc::clone(&b));
        let got = cache.get(&key(1)).expect("tile should be cached");
        assert!(Arc::ptr_eq(&got, &b));
    }

    #[test]
    fn test_get_miss_has_no_side_effect() {
        let cache = MemoryCache::new(4);
        assert!(cache.get(&key(1)).is_none());
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_put_does_not_overwrite() {
        let cache = MemoryCache::new(4);
        let first = bitmap(1);

        cache.put(key(1), Arc::clone(&first));
        cache.put(key(1), bitmap(2));

        let got = cache.get(&key(1)).unwrap();
        assert!(Arc::ptr_eq(&got, &first));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_bound_with_batch_eviction() {
        // clear_factor 0.5 on capacity 4 evicts two entries per pass.
        let cache = MemoryCache::with_policy(4, true, 0.5, false);
        for x in 0..4 {
            cache.put(key(x), bitmap(x as u8));
        }
        assert_eq!(cache.len(), 4);

        cache.put(key(4), bitmap(4));
        // Two oldest evicted, one inserted.
        assert_eq!(cache.len(), 3);
        assert!(cache.get(&key(0)).is_none());
        assert!(cache.get(&key(1)).is_none());
        assert!(cache.get(&key(4)).is_some());
    }

    #[test]
    fn test_single_eviction_without_auto_clear() {
        let cache = MemoryCache::with_policy(3, false, DEFAULT_CLEAR_FACTOR, false);
        for x in 0..3 {
            cache.put(key(x), bitmap(x as u8));
        }

        cache.put(key(3), bitmap(3));
        assert_eq!(cache.len(), 3);
        assert!(cache.get(&key(0)).is_none());
        assert!(cache.get(&key(1)).is_some());
    }

    #[test]
    fn test_get_refreshes_recency() {
        let cache = MemoryCache::with_policy(3, false, DEFAULT_CLEAR_FACTOR, false);
        for x in 0..3 {
            cache.put(key(x), bitmap(x as u8));
        }

        // Touch the oldest entry; the next eviction must pick key(1).
        let _ = cache.get(&key(0));
        cache.put(key(3), bitmap(3));

        assert!(cache.get(&key(0)).is_some());
        assert!(cache.get(&key(1)).is_none());
    }

    #[test]
    fn test_set_capacity_shrink_evicts_immediately() {
        let cache = MemoryCache::new(10);
        for x in 0..10 {
            cache.put(key(x), bitmap(x as u8));
        }
        assert_eq!(cache.len(), 10);

        cache.set_capacity(2);
        assert!(cache.len() <= 2);
        assert_eq!(cache.capacity(), 2);
    }

    #[test]
    fn test_zero_capacity_never_retains() {
        let cache = MemoryCache::new(0);
        cache.put(key(1), bitmap(1));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_remove_evicts_exactly_n_oldest() {
        let cache = MemoryCache::new(8);
        for x in 0..5 {
            cache.put(key(x), bitmap(x as u8));
        }

        cache.remove(2);
        assert_eq!(cache.len(), 3);
        assert!(cache.get(&key(0)).is_none());
        assert!(cache.get(&key(1)).is_none());
        assert!(cache.get(&key(2)).is_some());
    }

    #[test]
    fn test_clear_empties() {
        let cache = MemoryCache::new(8);
        for x in 0..5 {
            cache.put(key(x), bitmap(x as u8));
        }
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stats_counters() {
        let cache = MemoryCache::with_policy(2, false, DEFAULT_CLEAR_FACTOR, false);
        cache.put(key(1), bitmap(1));
        let _ = cache.get(&key(1));
        let _ = cache.get(&key(9));
        cache.put(key(2), bitmap(2));
        cache.put(key(3), bitmap(3));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
    }

    proptest! {
        /// The size bound holds after every operation, for arbitrary
        /// put/get sequences and capacities.
        #[test]
        fn prop_capacity_never_exceeded(
            capacity in 0usize..8,
            ops in prop::collection::vec((0u8..2, 0u32..16), 1..64),
        ) {
            let cache = MemoryCache::new(capacity);
            for (op, x) in ops {
                match op {
                    0 => cache.put(key(x), bitmap(x as u8)),
                    _ => {
                        let _ = cache.get(&key(x));
                    }
                }
                prop_assert!(cache.len() <= capacity);
            }
        }
    }
}
