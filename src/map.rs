//! Filepath: src/map.rs
//!
//! `BranchMap` - a persistent, versioned hash-trie map.
//!
//! A map is *mutable until shared*: it is created mutable, edited in
//! place, and frozen the moment it is branched or published. Branching
//! a frozen map hands back a new mutable map that shares the whole tree
//! and specializes it piecewise, by path-restricted copy-on-write, as
//! it diverges.

use std::borrow::Borrow;
use std::fmt as StdFmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use ahash::RandomState;

use crate::check::invariant;
use crate::config::{config_for, Config};
use crate::internode::{Children, Internode};
use crate::leaf::{Entry, LeafNode};
use crate::path::{level_shift, slot_of, Path};
use crate::tracing_helpers::debug_log;

mod iter;
mod setops;

pub use iter::Iter;

// ============================================================================
//  MapError
// ============================================================================

/// Errors surfaced by map operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// Checked lookup on an absent key.
    MissingKey,

    /// Insert or remove on a frozen map.
    ImmutableMutation,

    /// Generic copy requested; two mutable handles over one tree would
    /// silently diverge their population counters. Use `branch`.
    MisuseCopy,

    /// A structural invariant does not hold: a bug in this crate.
    /// Surfaces only from the invariant checker.
    InvariantViolation(&'static str),
}

impl StdFmt::Display for MapError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::MissingKey => write!(f, "key not found"),

            Self::ImmutableMutation => {
                write!(f, "cannot mutate a frozen map; branch() it first")
            }

            Self::MisuseCopy => {
                write!(f, "copying a map aliases its tree; use branch() instead")
            }

            Self::InvariantViolation(what) => {
                write!(f, "internal invariant violated: {what}")
            }
        }
    }
}

impl std::error::Error for MapError {}

// ============================================================================
//  RootNode
// ============================================================================

/// The root of a map's tree: a bare leaf while the map is tiny, an
/// internode from the first shape change on.
pub(crate) enum RootNode<K, V> {
    /// Up to the first shape threshold the whole map is one leaf.
    Leaf(Arc<LeafNode<K, V>>),

    /// Deeper maps route through interior levels.
    Inner(Arc<Internode<K, V>>),
}

// ============================================================================
//  BranchMap
// ============================================================================

/// Persistent, versioned hash-trie map.
///
/// # Versioning discipline
///
/// - A map starts **mutable**; [`insert`](Self::insert) and
///   [`remove`](Self::remove) edit it in place.
/// - [`freeze`](Self::freeze) makes it immutable, once and for all.
/// - [`branch`](Self::branch) freezes the map and returns a new mutable
///   map sharing the entire tree; subsequent edits copy only the nodes
///   on the written path.
/// - Mutating a frozen map fails with [`MapError::ImmutableMutation`].
///
/// A frozen map may be read from any number of threads without
/// synchronization; publish it with a release store of the pointer and
/// read it with an acquiring load.
///
/// # Example
///
/// ```
/// use branchmap::BranchMap;
///
/// let mut m: BranchMap<u32, u32> = BranchMap::new();
/// m.insert(1, 10)?;
///
/// let mut fork = m.branch();
/// fork.insert(2, 20)?;
///
/// assert_eq!(m.get(&1), Some(&10));
/// assert_eq!(m.get(&2), None);
/// assert_eq!(fork.get(&2), Some(&20));
/// assert!(m.insert(3, 30).is_err()); // m was frozen by branch()
/// # Ok::<(), branchmap::MapError>(())
/// ```
pub struct BranchMap<K, V, S = RandomState> {
    root: RootNode<K, V>,
    len: usize,
    config: Config,
    hash_builder: S,
}

impl<K, V, S> StdFmt::Debug for BranchMap<K, V, S> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("BranchMap")
            .field("len", &self.len)
            .field("depth", &self.config.depth())
            .field("mutable", &self.is_mutable())
            .finish_non_exhaustive()
    }
}

impl<K, V> BranchMap<K, V, RandomState> {
    /// Create an empty mutable map.
    #[must_use]
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }
}

impl<K, V> Default for BranchMap<K, V, RandomState> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> BranchMap<K, V, S> {
    /// Create an empty mutable map using `hash_builder` for hashing.
    #[must_use]
    pub fn with_hasher(hash_builder: S) -> Self {
        Self {
            root: RootNode::Leaf(Arc::new(LeafNode::new(1))),
            len: 0,
            config: config_for(0),
            hash_builder,
        }
    }

    /// Number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Does the map hold no entries?
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The map's hasher.
    #[inline]
    #[must_use]
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// May this map still be mutated?
    #[must_use]
    pub fn is_mutable(&self) -> bool {
        match &self.root {
            RootNode::Leaf(leaf) => leaf.is_mutable(),

            RootNode::Inner(node) => node.is_mutable(),
        }
    }

    /// Freeze this map: no further mutation, safe to share.
    ///
    /// Recursive over the still-mutable part of the tree only; frozen
    /// subtrees terminate the walk. Idempotent.
    pub fn freeze(&self) {
        match &self.root {
            RootNode::Leaf(leaf) => leaf.freeze(),

            RootNode::Inner(node) => node.freeze(),
        }
    }

    /// Generic copy is refused by design.
    ///
    /// Two mutable maps over one tree would each keep their own
    /// population counter and silently disagree. [`branch`](Self::branch)
    /// is the supported way to obtain an independent mutable version.
    pub fn try_clone(&self) -> Result<Self, MapError> {
        Err(MapError::MisuseCopy)
    }
}

// ============================================================================
//  Reads
// ============================================================================

impl<K, V, S: BuildHasher> BranchMap<K, V, S> {
    /// Look up `key`.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);

        match &self.root {
            RootNode::Leaf(leaf) => leaf.get(hash, key),

            RootNode::Inner(root) => {
                let depth = self.config.depth();
                let mut node = root;
                let mut level = 0;
                loop {
                    let idx = slot_of(hash, level_shift(depth, level), node.fanout());
                    match &node.children {
                        Children::Nodes(v) => {
                            node = &v[idx];
                            level += 1;
                        }

                        Children::Leaves(v) => return v[idx].get(hash, key),
                    }
                }
            }
        }
    }

    /// Look up `key`, failing with [`MapError::MissingKey`] when absent.
    pub fn get_checked<Q>(&self, key: &Q) -> Result<&V, MapError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).ok_or(MapError::MissingKey)
    }

    /// Look up `key`, returning `default` when absent.
    #[must_use]
    pub fn get_or<Q>(&self, key: &Q, default: V) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.get(key).cloned().unwrap_or(default)
    }

    /// Is `key` present?
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Is the pair `(key, value)` present?
    #[must_use]
    pub fn contains_pair<Q>(&self, key: &Q, value: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        self.get(key).is_some_and(|v| v == value)
    }
}

// ============================================================================
//  Mutation
// ============================================================================

impl<K, V, S> BranchMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher,
{
    /// Insert `key -> value`.
    ///
    /// Returns the previous value when `key` was already present (the
    /// value is always replaced, even if it compares equal). The
    /// population grows only for a new key.
    ///
    /// # Errors
    /// [`MapError::ImmutableMutation`] when the map is frozen.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>, MapError> {
        if !self.is_mutable() {
            return Err(MapError::ImmutableMutation);
        }

        let hash = self.hash_builder.hash_one(&key);
        let entry = Entry { hash, key, value };
        let config = self.config;

        let replaced = match &mut self.root {
            RootNode::Leaf(slot) => LeafNode::insert_at(slot, Path::EMPTY, entry),

            RootNode::Inner(slot) => insert_rec(slot, &config, 0, Path::EMPTY, entry),
        };

        if replaced.is_none() {
            self.len += 1;
            if self.len as u64 == self.config.next_threshold() {
                self.adopt_config(config_for(self.len as u64));
            }
        }

        self.verify_after("insert");
        Ok(replaced)
    }

    /// Remove `key`, returning its value when present.
    ///
    /// Removal never shrinks the tree shape: once adopted, a shape is
    /// kept until the population crosses the next upper threshold.
    ///
    /// # Errors
    /// [`MapError::ImmutableMutation`] when the map is frozen.
    pub fn remove<Q>(&mut self, key: &Q) -> Result<Option<V>, MapError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if !self.is_mutable() {
            return Err(MapError::ImmutableMutation);
        }

        let hash = self.hash_builder.hash_one(key);
        let config = self.config;

        let removed = match &mut self.root {
            RootNode::Leaf(slot) => LeafNode::remove_at(slot, Path::EMPTY, hash, key),

            RootNode::Inner(slot) => remove_rec(slot, &config, 0, Path::EMPTY, hash, key),
        };

        if removed.is_some() {
            self.len -= 1;
        }

        self.verify_after("remove");
        Ok(removed)
    }

    /// Switch to the shape the schedule prescribes for the current
    /// population.
    ///
    /// A deeper shape wraps the frozen old root in a fresh internode
    /// whose slots all alias it; a wider root grows in place. Raised
    /// fanouts further down are adopted lazily by later writes.
    fn adopt_config(&mut self, next: Config) {
        let old = self.config;
        debug_log!(
            n = self.len,
            old_depth = old.depth(),
            new_depth = next.depth(),
            "shape change"
        );

        if next.depth() > old.depth() {
            invariant!(
                next.depth() == old.depth() + 1,
                "depth grows one level at a time"
            );

            let fanout = next.fanout(0);
            let new_root = match &self.root {
                RootNode::Leaf(leaf) => {
                    leaf.freeze();
                    RootNode::Inner(Arc::new(Internode::over_leaf(leaf, fanout)))
                }

                RootNode::Inner(node) => {
                    node.freeze();
                    RootNode::Inner(Arc::new(Internode::over_node(node, fanout)))
                }
            };
            self.root = new_root;
        } else if next.depth() > 0 && next.fanout(0) > old.fanout(0) {
            if let RootNode::Inner(slot) = &mut self.root {
                Internode::make_mut(slot).grow_to(next.fanout(0));
            }
        }

        self.config = next;
    }

    /// Run the whole-tree verifier after a mutation at assertion
    /// level >= 2. Failures are fatal.
    #[expect(clippy::panic, reason = "invariant failures are fatal by contract")]
    fn verify_after(&self, op: &str) {
        if crate::check::assert_level() >= 2 {
            if let Err(e) = self.check_invariants() {
                panic!("{op}: {e}");
            }
        }
    }
}

/// Mutable descent for insert: clone-on-write each internode, adopt a
/// raised fanout, then recurse into the selected child.
fn insert_rec<K, V>(
    slot: &mut Arc<Internode<K, V>>,
    config: &Config,
    level: usize,
    path: Path,
    entry: Entry<K, V>,
) -> Option<V>
where
    K: Clone + Eq,
    V: Clone,
{
    let node = Internode::make_mut(slot);

    let required = config.fanout(level);
    if node.fanout() < required {
        node.grow_to(required);
    }

    let len = node.fanout();
    let shift = level_shift(config.depth(), level);
    let idx = slot_of(entry.hash, shift, len);
    let path = path.child(shift, (len - 1) as u64, idx as u64);

    match &mut node.children {
        Children::Nodes(v) => insert_rec(&mut v[idx], config, level + 1, path, entry),

        Children::Leaves(v) => LeafNode::insert_at(&mut v[idx], path, entry),
    }
}

/// Mutable descent for remove. Unlike insert this never grows a node:
/// a lagging array just consumes fewer selector bits.
fn remove_rec<K, V, Q>(
    slot: &mut Arc<Internode<K, V>>,
    config: &Config,
    level: usize,
    path: Path,
    hash: u64,
    key: &Q,
) -> Option<V>
where
    K: Borrow<Q> + Clone + Eq,
    Q: Eq + ?Sized,
    V: Clone,
{
    let node = Internode::make_mut(slot);

    let len = node.fanout();
    let shift = level_shift(config.depth(), level);
    let idx = slot_of(hash, shift, len);
    let path = path.child(shift, (len - 1) as u64, idx as u64);

    match &mut node.children {
        Children::Nodes(v) => remove_rec(&mut v[idx], config, level + 1, path, hash, key),

        Children::Leaves(v) => LeafNode::remove_at(&mut v[idx], path, hash, key),
    }
}

// ============================================================================
//  Versioning
// ============================================================================

impl<K, V, S> BranchMap<K, V, S>
where
    K: Clone + Eq,
    V: Clone,
    S: Clone,
{
    /// Freeze this map and return a new mutable map sharing its tree.
    ///
    /// The new map starts as a shallow clone of the root — a leaf root
    /// is copied outright, an internode root copies only its child
    /// array — and diverges by copy-on-write as it is written.
    #[must_use]
    pub fn branch(&self) -> Self {
        self.freeze();
        debug_log!(n = self.len, "branch");

        let root = match &self.root {
            RootNode::Leaf(leaf) => RootNode::Leaf(Arc::new(leaf.rebuild_under(Path::EMPTY))),

            RootNode::Inner(node) => RootNode::Inner(Arc::new(node.clone_for_write())),
        };

        Self {
            root,
            len: self.len,
            config: self.config,
            hash_builder: self.hash_builder.clone(),
        }
    }

    /// Two independent mutable branches of this map.
    #[must_use]
    pub fn double_branch(&self) -> (Self, Self) {
        (self.branch(), self.branch())
    }

    /// This map if it is still mutable, a fresh branch otherwise.
    #[must_use]
    pub fn into_mutable(self) -> Self {
        if self.is_mutable() {
            self
        } else {
            self.branch()
        }
    }
}

// ============================================================================
//  Invariant checker
// ============================================================================

impl<K: Eq, V, S> BranchMap<K, V, S> {
    /// Verify every structural invariant of the tree.
    ///
    /// Runs automatically after each mutation at assertion level >= 2;
    /// available directly for tests.
    ///
    /// # Errors
    /// [`MapError::InvariantViolation`] naming the first broken
    /// invariant found.
    pub fn check_invariants(&self) -> Result<(), MapError> {
        let counted = match &self.root {
            RootNode::Leaf(leaf) => {
                if self.config.depth() != 0 {
                    return Err(MapError::InvariantViolation("leaf root in a deep shape"));
                }
                check_leaf(leaf, Path::EMPTY, false)?
            }

            RootNode::Inner(node) => {
                if self.config.depth() == 0 {
                    return Err(MapError::InvariantViolation("interior root in a flat shape"));
                }
                check_inode(node, &self.config, 0, Path::EMPTY, false)?
            }
        };

        if counted != self.len {
            return Err(MapError::InvariantViolation("population count drift"));
        }
        Ok(())
    }
}

fn check_inode<K: Eq, V>(
    node: &Internode<K, V>,
    config: &Config,
    level: usize,
    path: Path,
    frozen_ancestor: bool,
) -> Result<usize, MapError> {
    if level >= config.depth() {
        return Err(MapError::InvariantViolation("tree deeper than its shape"));
    }

    let len = node.fanout();
    if !len.is_power_of_two() {
        return Err(MapError::InvariantViolation("fanout not a power of two"));
    }
    if len > config.fanout(level) {
        return Err(MapError::InvariantViolation("fanout beyond the shape"));
    }
    if frozen_ancestor && node.is_mutable() {
        return Err(MapError::InvariantViolation("mutable node in frozen subtree"));
    }

    let frozen = frozen_ancestor || !node.is_mutable();
    let shift = level_shift(config.depth(), level);
    let mask = (len - 1) as u64;
    let mut total = 0;

    match &node.children {
        Children::Nodes(v) => {
            if level + 1 == config.depth() {
                return Err(MapError::InvariantViolation("interior node at leaf level"));
            }
            for (i, child) in v.iter().enumerate() {
                total += check_inode(
                    child,
                    config,
                    level + 1,
                    path.child(shift, mask, i as u64),
                    frozen,
                )?;
            }
        }

        Children::Leaves(v) => {
            if level + 1 != config.depth() {
                return Err(MapError::InvariantViolation("leaves above the bottom level"));
            }
            for (i, leaf) in v.iter().enumerate() {
                total += check_leaf(leaf, path.child(shift, mask, i as u64), frozen)?;
            }
        }
    }

    Ok(total)
}

fn check_leaf<K: Eq, V>(
    leaf: &LeafNode<K, V>,
    path: Path,
    frozen_ancestor: bool,
) -> Result<usize, MapError> {
    if frozen_ancestor && leaf.is_mutable() {
        return Err(MapError::InvariantViolation("mutable leaf in frozen subtree"));
    }

    let mut count = 0;
    for e in leaf.entries() {
        if path.matches(e.hash) {
            if leaf.get(e.hash, &e.key).is_none() {
                return Err(MapError::InvariantViolation(
                    "entry unreachable by its own probe sequence",
                ));
            }
            count += 1;
        }
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_remedy() {
        assert!(MapError::ImmutableMutation.to_string().contains("branch"));
        assert!(MapError::MisuseCopy.to_string().contains("branch"));
        let err = MapError::InvariantViolation("population count drift");
        assert!(err.to_string().contains("population count drift"));
    }

    #[test]
    fn fresh_map_is_mutable_and_empty() {
        let m: BranchMap<u64, u64> = BranchMap::new();
        assert!(m.is_mutable());
        assert!(m.is_empty());
        assert_eq!(m.len(), 0);
        m.check_invariants().unwrap();
    }

    #[test]
    fn shape_changes_keep_every_entry_reachable() {
        // Cross the 16, 64, 256 and 1024 thresholds.
        let mut m: BranchMap<u64, u64> = BranchMap::new();
        for i in 0..2000 {
            assert_eq!(m.insert(i, i * 2).unwrap(), None);
            m.check_invariants().unwrap();
        }
        assert_eq!(m.len(), 2000);
        for i in 0..2000 {
            assert_eq!(m.get(&i), Some(&(i * 2)), "key {i}");
        }
    }

    #[test]
    fn try_clone_is_refused() {
        let m: BranchMap<u64, u64> = BranchMap::new();
        assert_eq!(m.try_clone().err(), Some(MapError::MisuseCopy));
    }
}
