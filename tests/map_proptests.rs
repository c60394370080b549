//! Property-based tests for `BranchMap`.
//!
//! These tests verify invariants and properties that should hold for all inputs.
//! Uses differential testing against `std::collections::HashMap` as an oracle.

#![expect(clippy::unwrap_used, reason = "fail fast in tests")]

use branchmap::{BranchMap, MapError};
use proptest::prelude::*;
use std::collections::HashMap;

// ============================================================================
//  Strategies
// ============================================================================

/// Keys from a small domain, so sequences revisit and collide.
fn small_key() -> impl Strategy<Value = u64> {
    0u64..64
}

/// Operations for random testing.
#[derive(Debug, Clone)]
enum Op {
    Insert(u64, u64),
    Remove(u64),
    Get(u64),
    Branch,
}

/// Strategy for generating random operations.
fn operations(max_ops: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            4 => (small_key(), any::<u64>()).prop_map(|(k, v)| Op::Insert(k, v)),
            2 => small_key().prop_map(Op::Remove),
            2 => small_key().prop_map(Op::Get),
            1 => Just(Op::Branch),
        ],
        0..=max_ops,
    )
}

// ============================================================================
//  Basic Insert/Get/Remove Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Every inserted key should be retrievable.
    #[test]
    fn insert_then_get_returns_value(key: u64, value: u64) {
        let mut map: BranchMap<u64, u64> = BranchMap::new();
        map.insert(key, value).unwrap();

        prop_assert_eq!(map.get(&key), Some(&value));
        prop_assert!(map.contains_key(&key));
        prop_assert!(map.contains_pair(&key, &value));
        prop_assert_eq!(map.len(), 1);
    }

    /// Inserting a duplicate key returns the old value and keeps the
    /// population unchanged, even when the values compare equal.
    #[test]
    fn duplicate_insert_is_size_neutral(key: u64, v1: u64, v2: u64) {
        let mut map: BranchMap<u64, u64> = BranchMap::new();
        prop_assert_eq!(map.insert(key, v1).unwrap(), None);
        prop_assert_eq!(map.insert(key, v2).unwrap(), Some(v1));
        prop_assert_eq!(map.insert(key, v2).unwrap(), Some(v2));

        prop_assert_eq!(map.len(), 1);
        prop_assert_eq!(map.get(&key), Some(&v2));
    }

    /// The population always equals the number of distinct live keys.
    #[test]
    fn len_counts_distinct_keys(keys in prop::collection::vec(any::<u64>(), 0..200)) {
        let mut map: BranchMap<u64, u64> = BranchMap::new();
        let mut oracle = HashMap::new();

        for (i, k) in keys.iter().enumerate() {
            map.insert(*k, i as u64).unwrap();
            oracle.insert(*k, i as u64);
            prop_assert_eq!(map.len(), oracle.len());
        }

        map.check_invariants().unwrap();
    }

    /// A removed key is gone: lookups miss and checked access fails.
    #[test]
    fn remove_kills_the_key(keys in prop::collection::vec(small_key(), 1..100)) {
        let mut map: BranchMap<u64, u64> = BranchMap::new();
        for k in &keys {
            map.insert(*k, k * 317).unwrap();
        }

        let victim = keys[0];
        prop_assert_eq!(map.remove(&victim).unwrap(), Some(victim * 317));
        prop_assert_eq!(map.get(&victim), None);
        prop_assert_eq!(map.get_checked(&victim), Err(MapError::MissingKey));
        prop_assert!(!map.contains_pair(&victim, &(victim * 317)));
        prop_assert_eq!(map.remove(&victim).unwrap(), None);

        map.check_invariants().unwrap();
    }
}

// ============================================================================
//  Differential Testing Against HashMap
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Random operation sequences agree with the oracle; `Branch`
    /// replaces the working map with a fresh branch mid-sequence.
    #[test]
    fn random_ops_match_oracle(ops in operations(400)) {
        let mut map: BranchMap<u64, u64> = BranchMap::new();
        let mut oracle: HashMap<u64, u64> = HashMap::new();

        for op in ops {
            match op {
                Op::Insert(k, v) => {
                    prop_assert_eq!(map.insert(k, v).unwrap(), oracle.insert(k, v));
                }

                Op::Remove(k) => {
                    prop_assert_eq!(map.remove(&k).unwrap(), oracle.remove(&k));
                }

                Op::Get(k) => {
                    prop_assert_eq!(map.get(&k), oracle.get(&k));
                }

                Op::Branch => {
                    map = map.branch();
                }
            }
            prop_assert_eq!(map.len(), oracle.len());
        }

        map.check_invariants().unwrap();

        // Iteration yields exactly the oracle's pairs, each once.
        let mut seen: HashMap<u64, u64> = HashMap::new();
        for (k, v) in &map {
            prop_assert!(seen.insert(*k, *v).is_none(), "duplicate key {}", k);
        }
        prop_assert_eq!(seen, oracle);
    }

    /// Branching isolates the snapshot: edits to the branch never show
    /// through the frozen original.
    #[test]
    fn branch_isolation(base in operations(150), extra in operations(150)) {
        let mut map: BranchMap<u64, u64> = BranchMap::new();
        let mut oracle: HashMap<u64, u64> = HashMap::new();

        for op in base {
            match op {
                Op::Insert(k, v) => { map.insert(k, v).unwrap(); oracle.insert(k, v); }
                Op::Remove(k) => { map.remove(&k).unwrap(); oracle.remove(&k); }
                Op::Get(_) | Op::Branch => {}
            }
        }

        let mut fork = map.branch();
        prop_assert!(!map.is_mutable());
        prop_assert!(fork.is_mutable());

        // Initially the two agree on every key either holds.
        for (k, v) in &map {
            prop_assert_eq!(fork.get(k), Some(v));
        }

        for op in extra {
            match op {
                Op::Insert(k, v) => { fork.insert(k, v).unwrap(); }
                Op::Remove(k) => { fork.remove(&k).unwrap(); }
                Op::Get(_) | Op::Branch => {}
            }
        }

        // The frozen original still matches the oracle snapshot.
        prop_assert_eq!(map.len(), oracle.len());
        for (k, v) in &oracle {
            prop_assert_eq!(map.get(k), Some(v), "key {}", k);
        }
        map.check_invariants().unwrap();
        fork.check_invariants().unwrap();
    }

    /// `setdiff` against an empty map is the whole content; against
    /// itself it is empty; and membership round-trips through it.
    #[test]
    fn setdiff_round_trips(keys in prop::collection::vec(any::<u64>(), 0..300)) {
        let mut map: BranchMap<u64, u64> = BranchMap::new();
        let mut oracle = HashMap::new();
        for k in keys {
            map.insert(k, k ^ 0xabcd).unwrap();
            oracle.insert(k, k ^ 0xabcd);
        }

        let empty: BranchMap<u64, u64> = BranchMap::new();

        prop_assert!(map.setdiff(&map).is_empty());
        prop_assert!(empty.setdiff(&map).is_empty());

        let all: HashMap<u64, u64> = map.setdiff(&empty).into_iter().collect();
        prop_assert_eq!(all.len(), map.len());
        prop_assert_eq!(all, oracle);
    }

    /// Maps built from the same pairs in different orders are equal;
    /// disturbing one value breaks equality.
    #[test]
    fn equality_is_content_based(keys in prop::collection::hash_set(any::<u64>(), 1..120)) {
        let keys: Vec<u64> = keys.into_iter().collect();

        let mut a: BranchMap<u64, u64> = BranchMap::new();
        for k in &keys {
            a.insert(*k, k.wrapping_mul(3)).unwrap();
        }

        let mut b: BranchMap<u64, u64> = BranchMap::new();
        for k in keys.iter().rev() {
            b.insert(*k, k.wrapping_mul(3)).unwrap();
        }

        prop_assert!(a == b);

        b.insert(keys[0], keys[0].wrapping_mul(3).wrapping_add(1)).unwrap();
        prop_assert!(a != b);
    }
}
