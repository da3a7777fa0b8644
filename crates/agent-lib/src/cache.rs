//! Bounded least-recently-used cache
//!
//! A thin wrapper over [`hashlink::LruCache`] that reports the evicted key
//! on insert. Once full, inserting a new key drops the least recently used
//! entry.
//!
//! The cache takes `&mut self` for lookups and is owned by a single pipeline
//! stage. It is not meant to be shared between concurrent tick drivers;
//! wrap it in a lock if that ever becomes necessary.

use std::borrow::Borrow;
use std::hash::Hash;

/// Capacity of the task-definition and host caches, sized to the
/// orchestrator's per-cluster task ceiling
pub const DEFAULT_CACHE_CAPACITY: usize = 2000;

#[derive(Debug)]
pub struct LruCache<K: Eq + Hash, V> {
    inner: hashlink::LruCache<K, V>,
}

impl<K: Eq + Hash, V> LruCache<K, V> {
    /// Create a cache holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: hashlink::LruCache::new(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Look up a key, marking it most recently used
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.get(key)
    }

    /// Look up a key without changing its recency
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.peek(key)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.peek(key).is_some()
    }

    /// Insert or replace an entry, evicting the least recently used entry
    /// when the cache is full. Returns the evicted key, if any.
    pub fn put(&mut self, key: K, value: V) -> Option<K> {
        if self.inner.capacity() == 0 {
            return None;
        }

        let mut evicted = None;
        if !self.inner.contains_key(&key) && self.inner.len() >= self.inner.capacity() {
            evicted = self.inner.remove_lru().map(|(k, _)| k);
        }
        self.inner.insert(key, value);
        evicted
    }
}
