//! Shared Cache Engine
//!
//! This module wraps the single-threaded [`LruCache`] in a mutex so every
//! connection task can share one instance.
//!
//! ## Design Decisions
//!
//! 1. **One Lock**: The recency list and the key map must change together,
//!    so a single `Mutex` guards both. Sharding would split the LRU order.
//! 2. **Short Critical Sections**: The lock is held only for the in-memory
//!    update and never across an `.await`.
//! 3. **Owned Entries**: `set` copies the key and value into fresh
//!    allocations. An entry never shares memory with a connection's read
//!    buffer. A hit clones a reference count, not the payload.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │ connection 1 │  │ connection 2 │  │ connection N │
//! └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!        │ get/set         │                 │
//!        ▼                 ▼                 ▼
//! ┌─────────────────────────────────────────────────┐
//! │                  CacheEngine                    │
//! │   Mutex<LruCache<Bytes, Bytes>>  +  counters    │
//! └─────────────────────────────────────────────────┘
//! ```

use crate::storage::lru::LruCache;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Default number of entries the cache holds before evicting
pub const DEFAULT_CAPACITY: usize = 1024;

/// Snapshot of cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently resident
    pub entries: usize,
    /// Configured capacity
    pub capacity: usize,
    /// GET operations that found the key
    pub get_hits: u64,
    /// GET operations that missed
    pub get_misses: u64,
    /// SET operations
    pub sets: u64,
    /// Entries evicted to make room
    pub evictions: u64,
}

/// The cache shared by all connections.
///
/// # Example
///
/// ```
/// use lrucached::storage::CacheEngine;
/// use bytes::Bytes;
///
/// let engine = CacheEngine::with_capacity(2);
///
/// engine.set(Bytes::from("k1"), Bytes::from("v1"));
/// engine.set(Bytes::from("k2"), Bytes::from("v2"));
/// engine.set(Bytes::from("k3"), Bytes::from("v3"));
///
/// assert_eq!(engine.get(b"k1"), None);
/// assert_eq!(engine.get(b"k3"), Some(Bytes::from("v3")));
/// ```
pub struct CacheEngine {
    /// Recency list and key map, updated together
    lru: Mutex<LruCache<Bytes, Bytes>>,

    /// Fixed at construction
    capacity: usize,

    /// Statistics: GET hits
    get_hits: AtomicU64,

    /// Statistics: GET misses
    get_misses: AtomicU64,

    /// Statistics: SET operations
    set_count: AtomicU64,

    /// Statistics: evicted entries
    evictions: AtomicU64,
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("capacity", &self.capacity)
            .field("entries", &self.len())
            .field("evictions", &self.evictions.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for CacheEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheEngine {
    /// Creates an engine with [`DEFAULT_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an engine holding at most `capacity` entries (minimum one).
    pub fn with_capacity(capacity: usize) -> Self {
        let lru = LruCache::new(capacity);
        Self {
            capacity: lru.capacity(),
            lru: Mutex::new(lru),
            get_hits: AtomicU64::new(0),
            get_misses: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Looks up `key` and marks it most recently used.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        let value = self.lock().get(key).cloned();

        if value.is_some() {
            self.get_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.get_misses.fetch_add(1, Ordering::Relaxed);
        }

        value
    }

    /// Stores `value` under `key` as the most recently used entry.
    ///
    /// Both are copied before the lock is taken, so the entry never shares
    /// an allocation with the caller. If the key is new and the cache is
    /// full, the least recently used entry is evicted within the same
    /// critical section.
    pub fn set(&self, key: Bytes, value: Bytes) {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let key = Bytes::copy_from_slice(&key);
        let value = Bytes::copy_from_slice(&value);
        let evicted = self.lock().put(key, value);

        if let Some((evicted_key, _)) = evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            trace!(key = %String::from_utf8_lossy(&evicted_key), "Evicted key");
        }
    }

    /// Returns true if `key` is present, without changing its recency.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.lock().contains(key)
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no entries are resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.capacity,
            get_hits: self.get_hits.load(Ordering::Relaxed),
            get_misses: self.get_misses.load(Ordering::Relaxed),
            sets: self.set_count.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Locks the cache. `LruCache` never panics mid-update, so a poisoned
    /// lock still guards a consistent structure.
    fn lock(&self) -> MutexGuard<'_, LruCache<Bytes, Bytes>> {
        self.lru.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
