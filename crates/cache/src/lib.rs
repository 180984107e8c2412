//! ringkv-cache: the coordinator's bounded result cache.
//!
//! A capacity-bounded `key -> value` map in most-recently-used order.
//! Reads count as uses; insertion beyond capacity evicts the
//! least-recently-used entry. The coordinator shares one instance behind
//! `Arc<Mutex<LruCache>>`, serializing all operations.

use std::collections::{HashMap, VecDeque};

/// A bounded most-recently-used cache.
///
/// The recency queue runs least-recent at the front to most-recent at the
/// back. With the small capacities this cache is built for, the linear
/// queue scan on touch is cheaper than a linked structure.
#[derive(Debug)]
pub struct LruCache {
    capacity: usize,
    map: HashMap<String, String>,
    recency: VecDeque<String>,
}

impl LruCache {
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be non-zero");
        Self {
            capacity,
            map: HashMap::with_capacity(capacity),
            recency: VecDeque::with_capacity(capacity),
        }
    }

    /// Read a value. A hit counts as a use and moves the key to
    /// most-recent.
    pub fn get(&mut self, key: &str) -> Option<String> {
        if !self.map.contains_key(key) {
            return None;
        }
        self.touch(key);
        self.map.get(key).cloned()
    }

    /// Whether the key is cached. Does not touch recency; an observed hit
    /// only counts as a use once the value is read.
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Install or overwrite a value, marking the key most-recent. When the
    /// insertion would exceed capacity, the least-recently-used entry is
    /// dropped.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if self.map.insert(key.clone(), value.into()).is_some() {
            self.touch(&key);
            return;
        }
        if self.map.len() > self.capacity {
            if let Some(victim) = self.recency.pop_front() {
                self.map.remove(&victim);
            }
        }
        self.recency.push_back(key);
    }

    /// Drop a key. Returns the removed value, if any.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let removed = self.map.remove(key)?;
        self.recency.retain(|k| k != key);
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached keys from least- to most-recently used.
    pub fn keys_by_recency(&self) -> Vec<String> {
        self.recency.iter().cloned().collect()
    }

    fn touch(&mut self, key: &str) {
        if let Some(idx) = self.recency.iter().position(|k| k == key) {
            self.recency.remove(idx);
        }
        self.recency.push_back(key.to_string());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
