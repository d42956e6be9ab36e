//! Bounded cache of validated gate results.
//!
//! Eviction is by insertion order: once the cache is over capacity the
//! oldest inserted key is dropped, regardless of how often it was read.

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug)]
pub struct ValidationCache<V> {
    entries: Mutex<CacheState<V>>,
    capacity: usize,
}

#[derive(Debug)]
struct CacheState<V> {
    map: IndexMap<String, V>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl<V: Clone> ValidationCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(CacheState {
                map: IndexMap::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    /// Returns an independent copy of the cached value.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut state = self.entries.lock();
        match state.map.get(key).cloned() {
            Some(value) => {
                state.hits += 1;
                Some(value)
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    pub fn insert(&self, key: String, value: V) {
        let mut state = self.entries.lock();
        state.map.insert(key, value);
        while state.map.len() > self.capacity {
            state.map.shift_remove_index(0);
            state.evictions += 1;
        }
    }

    pub fn clear(&self) {
        let mut state = self.entries.lock();
        state.map.clear();
        state.hits = 0;
        state.misses = 0;
        state.evictions = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.entries.lock();
        CacheStats {
            entries: state.map.len(),
            capacity: self.capacity,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }
}
