//! # branchmap
//!
//! A persistent, versioned hash-trie map: mutable until shared.
//!
//! `BranchMap` is an associative container built for real-time and
//! low-latency work where a classical hash table's Θ(n) rehash is
//! unacceptable, and for lock-free sharing across threads by the
//! mutate-privately-then-publish discipline.
//!
//! ## Design
//!
//! - The tree has at most seven levels: up to six interior levels of
//!   power-of-two fanout over a bottom level of small open-addressed
//!   leaves probed by `(hash ^ i) % capacity`.
//! - A shape schedule maps the population to the tree shape; interior
//!   nodes adopt a raised fanout lazily, by aliasing their child array
//!   onto itself, so no single insert ever pays a full-tree rebuild.
//! - Every node carries a monotone mutable-to-immutable flag.
//!   `branch()` freezes a map in O(still-mutable nodes) and returns a
//!   mutable sibling sharing the whole tree; writes then specialize the
//!   shared paths by path-restricted copy-on-write.
//! - `setdiff` prunes subtrees shared by identity, so diffing a branch
//!   against its origin costs Θ(edits · n^(1/7)), not Θ(n).
//!
//! ## Performance
//!
//! - Insert/remove/lookup: Θ(1) amortized on an unshared map,
//!   Θ(n^(1/7)) worst case on a freshly branched one
//! - Branch and freeze: O(1) amortized
//! - Reads of a frozen map: wait-free, from any number of threads
//!
//! ## Assertion level
//!
//! The `BRANCHMAP_ASSERT_LEVEL` environment variable (read once, at
//! first use) selects the invariant-checking level: `0` disables all
//! checks, `1` (default) enables cheap debug-build checks, `2` or more
//! runs the whole-tree verifier after every mutation.

pub mod check;
pub mod config;
mod internode;
mod leaf;
pub mod map;
mod mutbit;
mod ordering;
mod path;
mod tracing_helpers;

pub use config::{config_for, Config};
pub use map::{BranchMap, Iter, MapError};
