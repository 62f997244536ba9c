//! Property-Based Tests for the LRU Cache
//!
//! Every operation is applied both to [`LruCache`] and to a naive model (a
//! `Vec` ordered MRU→LRU), and the two must agree after each step.

use proptest::prelude::*;

use crate::storage::LruCache;

// == Strategies ==
#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: u8, value: u32 },
    Get { key: u8 },
}

/// Small key space so hits, overwrites, and evictions all happen often.
fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (0u8..16, any::<u32>()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        (0u8..16).prop_map(|key| CacheOp::Get { key }),
    ]
}

// == Reference Model ==
/// Entries ordered most recently used first.
struct Model {
    entries: Vec<(u8, u32)>,
    capacity: usize,
}

impl Model {
    fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    fn get(&mut self, key: u8) -> Option<u32> {
        let pos = self.entries.iter().position(|(k, _)| *k == key)?;
        let entry = self.entries.remove(pos);
        self.entries.insert(0, entry);
        Some(entry.1)
    }

    fn set(&mut self, key: u8, value: u32) -> Option<(u8, u32)> {
        if let Some(pos) = self.entries.iter().position(|(k, _)| *k == key) {
            self.entries.remove(pos);
            self.entries.insert(0, (key, value));
            return None;
        }
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop()
        } else {
            None
        };
        self.entries.insert(0, (key, value));
        evicted
    }

    fn keys(&self) -> Vec<u8> {
        self.entries.iter().map(|(k, _)| *k).collect()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // The cache agrees with the model on every result, every eviction, and
    // the full recency order after each operation.
    #[test]
    fn prop_matches_reference_model(
        capacity in 1usize..8,
        ops in prop::collection::vec(cache_op_strategy(), 1..200),
    ) {
        let mut cache = LruCache::new(capacity);
        let mut model = Model::new(capacity);

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    prop_assert_eq!(cache.put(key, value), model.set(key, value));
                }
                CacheOp::Get { key } => {
                    prop_assert_eq!(cache.get(&key).copied(), model.get(key));
                }
            }
            prop_assert_eq!(cache.keys_mru(), model.keys());
        }
    }

    // Entry count never exceeds capacity.
    #[test]
    fn prop_capacity_bound(
        capacity in 1usize..8,
        ops in prop::collection::vec(cache_op_strategy(), 1..200),
    ) {
        let mut cache = LruCache::new(capacity);

        for op in ops {
            match op {
                CacheOp::Set { key, value } => { cache.put(key, value); }
                CacheOp::Get { key } => { cache.get(&key); }
            }
            prop_assert!(cache.len() <= capacity);
            prop_assert_eq!(cache.iter().count(), cache.len());
        }
    }

    // After a get, the key survives until every other resident entry has
    // been evicted by fresh insertions.
    #[test]
    fn prop_get_promotes(
        capacity in 2usize..8,
        keys in prop::collection::vec(0u8..32, 1..64),
    ) {
        let mut cache = LruCache::new(capacity);
        for key in &keys {
            cache.put(*key, 0u32);
        }

        let target = keys[keys.len() - 1];
        prop_assert!(cache.get(&target).is_some());

        // Insert keys guaranteed to be new; the target must be the last to go.
        let others = cache.len() - 1;
        for fresh in 0..others {
            cache.put(100 + fresh as u8, 1);
            prop_assert!(cache.contains(&target));
        }
        cache.put(200, 1);
        if cache.len() == capacity && others + 1 == capacity {
            prop_assert!(!cache.contains(&target));
        }
    }

    // A value read right after it was set is the value that was set.
    #[test]
    fn prop_round_trip(key in any::<u8>(), value in any::<u32>(), capacity in 1usize..8) {
        let mut cache = LruCache::new(capacity);
        cache.put(key, value);
        prop_assert_eq!(cache.get(&key), Some(&value));
    }
}
