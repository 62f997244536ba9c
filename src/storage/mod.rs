//! Storage Module
//!
//! This module provides the in-memory store behind the server: a
//! fixed-capacity LRU cache shared by every connection.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      CacheEngine                            │
//! │        (Arc-shared, one Mutex, hit/miss/evict stats)        │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │                 LruCache<Bytes, Bytes>                │  │
//! │  │   HashMap<key, slot>  +  slab-backed recency list     │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **O(1)**: lookup-and-promote, insert, and evict are constant time
//! - **Bounded**: entry count never exceeds the configured capacity
//! - **Atomic**: each `get`/`set` is a single critical section
//!
//! ## Example
//!
//! ```
//! use lrucached::storage::CacheEngine;
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! let engine = Arc::new(CacheEngine::with_capacity(1024));
//!
//! engine.set(Bytes::from("name"), Bytes::from("Ariz"));
//! assert_eq!(engine.get(b"name"), Some(Bytes::from("Ariz")));
//! assert_eq!(engine.get(b"missing"), None);
//! ```

pub mod engine;
pub mod lru;

#[cfg(test)]
mod property_tests;

// Re-export commonly used types
pub use engine::{CacheEngine, CacheStats, DEFAULT_CAPACITY};
pub use lru::LruCache;
