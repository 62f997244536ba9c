//! Fixed-Capacity LRU Cache
//!
//! A single-threaded LRU map with O(1) `get`, `put`, and eviction. Thread
//! safety is added one level up by [`CacheEngine`](super::CacheEngine).
//!
//! ## Layout
//!
//! ```text
//!   map: key ──> slot index
//!
//!   nodes (slab):   [0] [1] [2] [3]
//!                    │   │   │   │
//!   recency list:  head ⇄ ... ⇄ tail
//!                  (MRU)        (LRU)
//! ```
//!
//! Nodes live in a `Vec` and link to each other by index, so moving an entry
//! to the front is a handful of index writes. The slab never has holes:
//! entries are only removed by eviction, and the evicted slot is reused for
//! the incoming entry.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Sentinel for "no neighbour"
const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    prev: usize,
    next: usize,
}

/// A fixed-capacity map that evicts the least recently used entry.
///
/// # Example
///
/// ```
/// use lrucached::storage::LruCache;
///
/// let mut cache = LruCache::new(2);
/// cache.put("a", 1);
/// cache.put("b", 2);
/// cache.get(&"a");            // "a" is now most recently used
/// let evicted = cache.put("c", 3);
/// assert_eq!(evicted, Some(("b", 2)));
/// ```
pub struct LruCache<K, V> {
    map: HashMap<K, usize>,
    nodes: Vec<Node<K, V>>,
    head: usize,
    tail: usize,
    capacity: usize,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    /// Creates an empty cache holding at most `capacity` entries.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            map: HashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            head: NIL,
            tail: NIL,
            capacity,
        }
    }

    /// Returns the value for `key` and marks it most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.promote(idx);
        Some(&self.nodes[idx].value)
    }

    /// Returns true if `key` is present, without touching its recency.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Inserts or replaces `key`, making it the most recently used entry.
    ///
    /// If `key` is new and the cache is full, the least recently used entry
    /// is evicted first and returned.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&idx) = self.map.get(&key) {
            self.nodes[idx].value = value;
            self.promote(idx);
            return None;
        }

        let node = Node {
            key: key.clone(),
            value,
            prev: NIL,
            next: NIL,
        };

        if self.nodes.len() < self.capacity {
            let idx = self.nodes.len();
            self.nodes.push(node);
            self.map.insert(key, idx);
            self.push_front(idx);
            return None;
        }

        // Full: evict the tail and reuse its slot.
        let idx = self.tail;
        self.unlink(idx);
        let evicted = std::mem::replace(&mut self.nodes[idx], node);
        self.map.remove(&evicted.key);
        self.map.insert(key, idx);
        self.push_front(idx);

        Some((evicted.key, evicted.value))
    }

    /// Iterates from most to least recently used.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            nodes: &self.nodes,
            cursor: self.head,
            remaining: self.nodes.len(),
        }
    }

    /// Keys from most to least recently used.
    pub fn keys_mru(&self) -> Vec<K> {
        self.iter().map(|(key, _)| key.clone()).collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn promote(&mut self, idx: usize) {
        if self.head == idx {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);

        if prev == NIL {
            self.head = next;
        } else {
            self.nodes[prev].next = next;
        }

        if next == NIL {
            self.tail = prev;
        } else {
            self.nodes[next].prev = prev;
        }

        self.nodes[idx].prev = NIL;
        self.nodes[idx].next = NIL;
    }

    fn push_front(&mut self, idx: usize) {
        self.nodes[idx].prev = NIL;
        self.nodes[idx].next = self.head;

        if self.head != NIL {
            self.nodes[self.head].prev = idx;
        }
        self.head = idx;

        if self.tail == NIL {
            self.tail = idx;
        }
    }
}

impl<K, V> fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("len", &self.nodes.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Iterator over entries from most to least recently used.
pub struct Iter<'a, K, V> {
    nodes: &'a [Node<K, V>],
    cursor: usize,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == NIL {
            return None;
        }
        let node = &self.nodes[self.cursor];
        self.cursor = node.next;
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
